use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::db::types::{ExamStatus, UserRole};
use crate::repositories;
use crate::schemas::exam::{
    ExamCreateRequest, ExamListResponse, ExamResponse, ExamTakingResponse, QuestionTakingView,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:exam_id", get(get_exam))
        .route("/:exam_id/publish", post(publish_exam))
}

async fn create_exam(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<ExamCreateRequest>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_payload(&payload)?;

    for (position, question) in payload.questions.iter().enumerate() {
        let option_count = question.options.len() as i32;
        if question.correct_index < 0 || question.correct_index >= option_count {
            return Err(ApiError::BadRequest(format!(
                "Question {position}: correct_index {} is out of range for {option_count} options",
                question.correct_index
            )));
        }
    }

    let total_marks: i32 = payload.questions.iter().map(|q| q.effective_marks()).sum();
    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &payload.title,
            description: payload.description.as_deref(),
            duration_minutes: payload.duration_minutes,
            total_marks,
            status: ExamStatus::Draft,
            created_by: &admin.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    for (position, question) in payload.questions.iter().enumerate() {
        repositories::questions::create(
            &mut *tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam_id,
                prompt: &question.prompt,
                options: serde_json::json!(question.options),
                correct_index: question.correct_index,
                explanation: question.explanation.as_deref(),
                marks: question.marks,
                negative_marks: question.negative_marks,
                order_index: position as i32,
                created_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let question_count = payload.questions.len() as i64;
    Ok((StatusCode::CREATED, Json(ExamResponse::from_db(exam, question_count))))
}

async fn publish_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if exam.status != ExamStatus::Draft {
        return Err(ApiError::BadRequest("Only draft exams can be published".to_string()));
    }

    repositories::exams::publish(state.db(), &exam_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to publish exam"))?;

    let exam = fetch_exam(&state, &exam_id).await?;
    let question_count = repositories::questions::count_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    Ok(Json(ExamResponse::from_db(exam, question_count)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_exams(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ExamListResponse>, ApiError> {
    let exams =
        repositories::exams::list_by_status(state.db(), ExamStatus::Published, query.skip, query.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let mut items = Vec::with_capacity(exams.len());
    for exam in exams {
        let question_count = repositories::questions::count_by_exam(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
        items.push(ExamResponse::from_db(exam, question_count));
    }

    Ok(Json(ExamListResponse { items }))
}

/// The taking view: full question bank with the correct options and
/// explanations stripped. This is the one content fetch a session makes.
async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ExamTakingResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if exam.status != ExamStatus::Published && user.role != UserRole::Admin {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let question_count = questions.len() as i64;
    let questions = questions.into_iter().map(QuestionTakingView::from_db).collect();

    Ok(Json(ExamTakingResponse {
        exam: ExamResponse::from_db(exam, question_count),
        questions,
    }))
}

pub(crate) async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}
