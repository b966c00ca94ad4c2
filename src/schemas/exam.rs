use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question};
use crate::db::types::ExamStatus;
use crate::services::scoring::{DEFAULT_MARKS, DEFAULT_NEGATIVE_MARKS};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreateRequest {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    #[validate(range(min = 1, max = 600, message = "duration_minutes must be 1-600"))]
    pub(crate) duration_minutes: i32,
    #[validate(length(min = 1, message = "at least one question is required"), nested)]
    pub(crate) questions: Vec<QuestionCreateRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub(crate) struct QuestionCreateRequest {
    #[validate(length(min = 1, message = "prompt is required"))]
    pub(crate) prompt: String,
    #[validate(length(min = 2, max = 6, message = "a question needs 2-6 options"))]
    pub(crate) options: Vec<String>,
    pub(crate) correct_index: i32,
    pub(crate) explanation: Option<String>,
    #[validate(range(min = 0, message = "marks must be non-negative"))]
    pub(crate) marks: Option<i32>,
    #[validate(range(min = 0, message = "negative_marks must be non-negative"))]
    pub(crate) negative_marks: Option<i32>,
}

impl QuestionCreateRequest {
    pub(crate) fn effective_marks(&self) -> i32 {
        self.marks.unwrap_or(DEFAULT_MARKS)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: i32,
    pub(crate) status: ExamStatus,
    pub(crate) question_count: i64,
    pub(crate) created_at: String,
    pub(crate) published_at: Option<String>,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, question_count: i64) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            status: exam.status,
            question_count,
            created_at: format_primitive(exam.created_at),
            published_at: exam.published_at.map(format_primitive),
        }
    }
}

/// Question as shown while taking the exam: the correct option and the
/// explanation never leave the server before submission.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionTakingView {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) marks: i32,
    pub(crate) negative_marks: i32,
    pub(crate) order_index: i32,
}

impl QuestionTakingView {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            prompt: question.prompt,
            options: question.options.0,
            marks: question.marks.unwrap_or(DEFAULT_MARKS),
            negative_marks: question.negative_marks.unwrap_or(DEFAULT_NEGATIVE_MARKS),
            order_index: question.order_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamTakingResponse {
    #[serde(flatten)]
    pub(crate) exam: ExamResponse,
    pub(crate) questions: Vec<QuestionTakingView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamListResponse {
    pub(crate) items: Vec<ExamResponse>,
}
