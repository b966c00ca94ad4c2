use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::types::QuestionStatus;
use crate::services::integrity::{IntegrityEvent, IntegrityGuardConfig};
use crate::services::snapshot::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionPhase {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptView {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) started_at: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) current_index: i32,
    pub(crate) answers: BTreeMap<String, i32>,
    pub(crate) question_status: BTreeMap<String, QuestionStatus>,
    pub(crate) tab_switches: i32,
    pub(crate) clipboard_blocked: i32,
}

impl AttemptView {
    pub(crate) fn from_snapshot(snapshot: &SessionSnapshot, remaining_seconds: i64) -> Self {
        Self {
            id: snapshot.attempt_id.clone(),
            exam_id: snapshot.exam_id.clone(),
            started_at: snapshot.started_at.clone(),
            remaining_seconds,
            current_index: snapshot.current_index,
            answers: snapshot.answers.clone(),
            question_status: snapshot.question_status.clone(),
            tab_switches: snapshot.tab_switches,
            clipboard_blocked: snapshot.clipboard_blocked,
        }
    }
}

/// What the presentation layer consumes: the phase decides the screen
/// (instructions / exam / results), `attempt` is present while in progress,
/// `result` once completed, and `integrity` carries the listener config to
/// install for the duration of the in-progress phase.
#[derive(Debug, Serialize)]
pub(crate) struct AttemptStateResponse {
    pub(crate) phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) attempt: Option<AttemptView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) integrity: Option<IntegrityGuardConfig>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigateRequest {
    pub(crate) index: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    pub(crate) option_index: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IntegrityEventRequest {
    pub(crate) event: IntegrityEvent,
}

#[derive(Debug, Serialize)]
pub(crate) struct IntegrityEventResponse {
    pub(crate) recorded: bool,
    pub(crate) show_warning: bool,
    pub(crate) tab_switches: i32,
    pub(crate) clipboard_blocked: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionReview {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_index: i32,
    pub(crate) selected_index: Option<i32>,
    pub(crate) status: QuestionStatus,
    pub(crate) explanation: Option<String>,
    pub(crate) marks: i32,
    pub(crate) negative_marks: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResultResponse {
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) result: serde_json::Value,
    pub(crate) review: Vec<QuestionReview>,
}
