use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;

use crate::api::errors::ApiError;
use crate::api::exams::fetch_exam;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question};
use crate::db::types::{ExamStatus, QuestionStatus};
use crate::repositories;
use crate::schemas::attempt::{
    AnswerRequest, AttemptResultResponse, AttemptStateResponse, AttemptView,
    IntegrityEventRequest, IntegrityEventResponse, NavigateRequest, QuestionReview, SessionPhase,
};
use crate::services::attempt_finalize::{self, FinalizeMode};
use crate::services::integrity::{self, IntegrityGuardConfig, IntegrityPolicy};
use crate::services::scoring::{DEFAULT_MARKS, DEFAULT_NEGATIVE_MARKS};
use crate::services::session_clock::SessionClock;
use crate::services::session_engine::{self, LoadedSession, SessionAction, SessionLoadError};
use crate::services::snapshot::{SessionSnapshot, SnapshotStore};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/state", get(state_of_session))
        .route("/navigate", post(navigate))
        .route("/next", post(next_question))
        .route("/prev", post(previous_question))
        .route("/answer", post(select_option))
        .route("/mark-review", post(mark_for_review))
        .route("/clear-answer", post(clear_answer))
        .route("/integrity", post(record_integrity_event))
        .route("/submit", post(submit))
        .route("/result", get(result))
}

/// Explicit start action (after the instructions screen). Resumes an
/// existing in-progress attempt per the one-attempt invariant; an expired
/// leftover session is submitted with whatever state it had before a new
/// attempt can be started.
async fn start(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    let (exam, questions) = load_content(&state, &exam_id).await?;
    let now = OffsetDateTime::now_utc();

    match session_engine::load_session(&state, &exam.id, &user.id, now)
        .await
        .map_err(map_load_error)?
    {
        LoadedSession::InProgress { snapshot, remaining_seconds } => {
            SnapshotStore::new(state.redis()).store(&snapshot).await;
            Ok(Json(in_progress_response(&state, &snapshot, remaining_seconds)))
        }
        LoadedSession::Expired { mut snapshot } => {
            let outcome = finalize(&state, &exam, &questions, &mut snapshot, FinalizeMode::AutoDeadline, now).await?;
            Ok(Json(completed_response(outcome)?))
        }
        LoadedSession::NotStarted | LoadedSession::Completed { .. } => {
            let snapshot = session_engine::create_attempt(&state, &exam, &questions, &user.id, now)
                .await
                .map_err(map_load_error)?;
            let clock = arm_clock(&snapshot)?;
            let remaining_seconds = clock.remaining_seconds(now);
            Ok(Json(in_progress_response(&state, &snapshot, remaining_seconds)))
        }
    }
}

/// Resume check on page load. Never re-enters a submitted session: the
/// terminal phase in the response is the redirect signal.
async fn state_of_session(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    let (exam, questions) = load_content(&state, &exam_id).await?;
    let now = OffsetDateTime::now_utc();

    match session_engine::load_session(&state, &exam.id, &user.id, now)
        .await
        .map_err(map_load_error)?
    {
        LoadedSession::NotStarted => Ok(Json(AttemptStateResponse {
            phase: SessionPhase::NotStarted,
            attempt: None,
            result: None,
            integrity: None,
        })),
        LoadedSession::InProgress { snapshot, remaining_seconds } => {
            SnapshotStore::new(state.redis()).store(&snapshot).await;
            Ok(Json(in_progress_response(&state, &snapshot, remaining_seconds)))
        }
        LoadedSession::Expired { mut snapshot } => {
            let outcome = finalize(&state, &exam, &questions, &mut snapshot, FinalizeMode::AutoDeadline, now).await?;
            Ok(Json(completed_response(outcome)?))
        }
        LoadedSession::Completed { attempt_id } => {
            let stored = stored_result(&state, &attempt_id).await?;
            Ok(Json(AttemptStateResponse {
                phase: SessionPhase::Completed,
                attempt: None,
                result: Some(stored),
                integrity: None,
            }))
        }
    }
}

async fn navigate(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::Navigate { index: payload.index }).await
}

async fn next_question(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::NextQuestion).await
}

async fn previous_question(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::PreviousQuestion).await
}

async fn select_option(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::SelectOption {
        option_index: payload.option_index,
    })
    .await
}

async fn mark_for_review(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::MarkForReview).await
}

async fn clear_answer(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    apply(&state, &exam_id, &user.id, SessionAction::ClearAnswer).await
}

async fn record_integrity_event(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<IntegrityEventRequest>,
) -> Result<Json<IntegrityEventResponse>, ApiError> {
    let (exam, questions) = load_content(&state, &exam_id).await?;
    let now = OffsetDateTime::now_utc();
    let (mut snapshot, _remaining) =
        require_in_progress(&state, &exam, &questions, &user.id, now).await?;

    let policy = integrity_policy(&state);
    let outcome = integrity::record_event(&mut snapshot, payload.event, policy);

    if outcome.recorded {
        SnapshotStore::new(state.redis()).store(&snapshot).await;
    }

    Ok(Json(IntegrityEventResponse {
        recorded: outcome.recorded,
        show_warning: outcome.show_warning,
        tab_switches: snapshot.tab_switches,
        clipboard_blocked: snapshot.clipboard_blocked,
    }))
}

/// Manual submission. Shares the finalize latch with the deadline path, so a
/// concurrent expiry and click still produce exactly one sealed result;
/// submitting an already-completed attempt is an idempotent no-op returning
/// the stored result.
async fn submit(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    let (exam, questions) = load_content(&state, &exam_id).await?;
    let now = OffsetDateTime::now_utc();

    match session_engine::load_session(&state, &exam.id, &user.id, now)
        .await
        .map_err(map_load_error)?
    {
        LoadedSession::InProgress { mut snapshot, .. } => {
            let outcome = finalize(&state, &exam, &questions, &mut snapshot, FinalizeMode::ManualSubmit, now).await?;
            Ok(Json(completed_response(outcome)?))
        }
        LoadedSession::Expired { mut snapshot } => {
            let outcome = finalize(&state, &exam, &questions, &mut snapshot, FinalizeMode::AutoDeadline, now).await?;
            Ok(Json(completed_response(outcome)?))
        }
        LoadedSession::Completed { attempt_id } => {
            let stored = stored_result(&state, &attempt_id).await?;
            Ok(Json(AttemptStateResponse {
                phase: SessionPhase::Completed,
                attempt: None,
                result: Some(stored),
                integrity: None,
            }))
        }
        LoadedSession::NotStarted => {
            Err(ApiError::BadRequest("No attempt in progress".to_string()))
        }
    }
}

/// Post-test analysis data: the sealed result plus a per-question review.
async fn result(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResultResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let attempt = repositories::attempts::find_last_completed(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("No completed attempt for this exam".to_string()))?;

    let stored =
        attempt.result.clone().map(|value| value.0).ok_or_else(|| {
            ApiError::Internal("Completed attempt has no stored result".to_string())
        })?;

    let questions = repositories::questions::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let review = questions
        .into_iter()
        .map(|question| QuestionReview {
            selected_index: attempt.answers.0.get(&question.id).copied(),
            status: attempt
                .question_status
                .0
                .get(&question.id)
                .copied()
                .unwrap_or(QuestionStatus::NotVisited),
            id: question.id,
            prompt: question.prompt,
            options: question.options.0,
            correct_index: question.correct_index,
            explanation: question.explanation,
            marks: question.marks.unwrap_or(DEFAULT_MARKS),
            negative_marks: question.negative_marks.unwrap_or(DEFAULT_NEGATIVE_MARKS),
        })
        .collect();

    Ok(Json(AttemptResultResponse {
        attempt_id: attempt.id,
        exam_id: attempt.exam_id,
        completed_at: attempt.completed_at.map(format_primitive),
        result: stored,
        review,
    }))
}

async fn apply(
    state: &AppState,
    exam_id: &str,
    user_id: &str,
    action: SessionAction,
) -> Result<Json<AttemptStateResponse>, ApiError> {
    let (exam, questions) = load_content(state, exam_id).await?;
    let now = OffsetDateTime::now_utc();
    let (mut snapshot, remaining_seconds) =
        require_in_progress(state, &exam, &questions, user_id, now).await?;

    // Invalid actions are defensively ignored; the snapshot is rewritten
    // either way so the local copy always reflects the latest state.
    session_engine::apply_action(&mut snapshot, &questions, action);
    SnapshotStore::new(state.redis()).store(&snapshot).await;

    Ok(Json(in_progress_response(state, &snapshot, remaining_seconds)))
}

/// Loads the read-only session inputs and gates on the publish lifecycle.
async fn load_content(
    state: &AppState,
    exam_id: &str,
) -> Result<(Exam, Vec<Question>), ApiError> {
    let exam = fetch_exam(state, exam_id).await?;

    if exam.status != ExamStatus::Published {
        return Err(ApiError::BadRequest("Exam is not available".to_string()));
    }

    let questions = repositories::questions::list_by_exam(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    if questions.is_empty() {
        return Err(ApiError::Internal("Exam has no questions".to_string()));
    }

    Ok((exam, questions))
}

/// Gate for mutating actions. A session past its deadline is pushed through
/// the same submission path the timer uses, then the action is rejected.
async fn require_in_progress(
    state: &AppState,
    exam: &Exam,
    questions: &[Question],
    user_id: &str,
    now: OffsetDateTime,
) -> Result<(SessionSnapshot, i64), ApiError> {
    match session_engine::load_session(state, &exam.id, user_id, now)
        .await
        .map_err(map_load_error)?
    {
        LoadedSession::InProgress { snapshot, remaining_seconds } => {
            Ok((snapshot, remaining_seconds))
        }
        LoadedSession::Expired { mut snapshot } => {
            finalize(state, exam, questions, &mut snapshot, FinalizeMode::AutoDeadline, now).await?;
            Err(ApiError::Conflict("Time is up; the attempt was submitted".to_string()))
        }
        LoadedSession::Completed { .. } => {
            Err(ApiError::Conflict("Attempt already submitted".to_string()))
        }
        LoadedSession::NotStarted => {
            Err(ApiError::BadRequest("No attempt in progress".to_string()))
        }
    }
}

async fn finalize(
    state: &AppState,
    exam: &Exam,
    questions: &[Question],
    snapshot: &mut SessionSnapshot,
    mode: FinalizeMode,
    now: OffsetDateTime,
) -> Result<attempt_finalize::FinalizeOutcome, ApiError> {
    attempt_finalize::finalize_attempt(state, exam, questions, snapshot, mode, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to submit attempt; please retry"))
}

fn map_load_error(err: SessionLoadError) -> ApiError {
    match err {
        SessionLoadError::Clock(err) => {
            ApiError::internal(err, "Attempt timer state is corrupt; cannot resume safely")
        }
        SessionLoadError::Store(err) => ApiError::internal(err, "Failed to load attempt"),
    }
}

fn arm_clock(snapshot: &SessionSnapshot) -> Result<SessionClock, ApiError> {
    SessionClock::arm(&snapshot.started_at, i64::from(snapshot.duration_minutes))
        .map_err(|e| ApiError::internal(e, "Attempt timer state is corrupt; cannot resume safely"))
}

fn integrity_policy(state: &AppState) -> IntegrityPolicy {
    IntegrityPolicy { allow_paste: state.settings().exam().allow_paste }
}

fn in_progress_response(
    state: &AppState,
    snapshot: &SessionSnapshot,
    remaining_seconds: i64,
) -> AttemptStateResponse {
    AttemptStateResponse {
        phase: SessionPhase::InProgress,
        attempt: Some(AttemptView::from_snapshot(snapshot, remaining_seconds)),
        result: None,
        integrity: Some(IntegrityGuardConfig::from_policy(integrity_policy(state))),
    }
}

fn completed_response(
    outcome: attempt_finalize::FinalizeOutcome,
) -> Result<AttemptStateResponse, ApiError> {
    let result = serde_json::to_value(&outcome.result)
        .map_err(|e| ApiError::internal(e, "Failed to encode result"))?;

    Ok(AttemptStateResponse {
        phase: SessionPhase::Completed,
        attempt: None,
        result: Some(result),
        integrity: None,
    })
}

async fn stored_result(state: &AppState, attempt_id: &str) -> Result<serde_json::Value, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    attempt
        .result
        .map(|value| value.0)
        .ok_or_else(|| ApiError::Internal("Completed attempt has no stored result".to_string()))
}
