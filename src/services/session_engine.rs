use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{format_primitive, to_primitive_utc};
use crate::db::models::{Attempt, Exam, Question};
use crate::db::types::{AttemptStatus, QuestionStatus};
use crate::repositories;
use crate::services::question_status;
use crate::services::session_clock::{ClockError, SessionClock};
use crate::services::snapshot::{SessionSnapshot, SnapshotStatus, SnapshotStore};

#[derive(Debug, Error)]
pub(crate) enum SessionLoadError {
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Outcome of reconciling the fast-store snapshot with the attempt row.
#[derive(Debug)]
pub(crate) enum LoadedSession {
    /// No resumable state; the session waits for an explicit start action.
    NotStarted,
    InProgress { snapshot: SessionSnapshot, remaining_seconds: i64 },
    /// The stored start instant puts the deadline in the past; whatever state
    /// was snapshotted must go through the submission path now.
    Expired { snapshot: SessionSnapshot },
    /// Terminal: the caller must redirect to results, never re-enter the exam.
    Completed { attempt_id: String },
}

/// Deterministic resume decision. The local snapshot wins (it is at least as
/// fresh as the last periodic sync) except when the attempt row proves the
/// attempt was already sealed elsewhere — a completed attempt accepts no
/// further writes. A corrupt start instant is fatal: guessing one would
/// silently grant a fresh full duration.
pub(crate) fn reconcile(
    remote: Option<&Attempt>,
    local: Option<SessionSnapshot>,
    now: OffsetDateTime,
) -> Result<LoadedSession, SessionLoadError> {
    if let Some(snapshot) = local {
        if snapshot.status == SnapshotStatus::Submitted {
            return Ok(LoadedSession::Completed { attempt_id: snapshot.attempt_id });
        }

        if let Some(attempt) = remote {
            if attempt.id == snapshot.attempt_id && attempt.status == AttemptStatus::Completed {
                return Ok(LoadedSession::Completed { attempt_id: snapshot.attempt_id });
            }
        }

        let clock = SessionClock::arm(&snapshot.started_at, i64::from(snapshot.duration_minutes))?;
        if clock.expired(now) {
            return Ok(LoadedSession::Expired { snapshot });
        }
        let remaining_seconds = clock.remaining_seconds(now);
        return Ok(LoadedSession::InProgress { snapshot, remaining_seconds });
    }

    match remote {
        Some(attempt) if attempt.status == AttemptStatus::InProgress => {
            let snapshot = SessionSnapshot::from_attempt(attempt);
            let clock =
                SessionClock::arm(&snapshot.started_at, i64::from(snapshot.duration_minutes))?;
            if clock.expired(now) {
                Ok(LoadedSession::Expired { snapshot })
            } else {
                let remaining_seconds = clock.remaining_seconds(now);
                Ok(LoadedSession::InProgress { snapshot, remaining_seconds })
            }
        }
        _ => Ok(LoadedSession::NotStarted),
    }
}

/// Resume check at load time: read the snapshot Redis-first, then the
/// attempt row it points at (or any in-progress row when the fast store has
/// nothing), and reconcile the two.
pub(crate) async fn load_session(
    state: &AppState,
    exam_id: &str,
    user_id: &str,
    now: OffsetDateTime,
) -> Result<LoadedSession, SessionLoadError> {
    let store = SnapshotStore::new(state.redis());
    let local = store.load(exam_id, user_id).await;

    let remote = match &local {
        Some(snapshot) => {
            repositories::attempts::find_by_id(state.db(), &snapshot.attempt_id).await?
        }
        None => repositories::attempts::find_in_progress(state.db(), exam_id, user_id).await?,
    };

    reconcile(remote.as_ref(), local, now)
}

/// Create a fresh attempt, or resume the existing in-progress one when the
/// store-level uniqueness guard reports a conflict. The caller has already
/// ruled out a resumable session via `load_session`.
pub(crate) async fn create_attempt(
    state: &AppState,
    exam: &Exam,
    questions: &[Question],
    user_id: &str,
    now: OffsetDateTime,
) -> Result<SessionSnapshot, SessionLoadError> {
    let statuses = initial_statuses(questions);
    let attempt_id = Uuid::new_v4().to_string();
    let started_at = to_primitive_utc(now);

    let inserted = repositories::attempts::create(
        state.db(),
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            exam_id: &exam.id,
            user_id,
            started_at,
            duration_minutes: exam.duration_minutes,
            question_status: sqlx::types::Json(statuses.clone()),
            created_at: started_at,
            updated_at: started_at,
        },
    )
    .await?;

    if !inserted {
        let existing = repositories::attempts::find_in_progress(state.db(), &exam.id, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        return Ok(SessionSnapshot::from_attempt(&existing));
    }

    let mut snapshot = SessionSnapshot {
        attempt_id,
        exam_id: exam.id.clone(),
        user_id: user_id.to_string(),
        started_at: format_primitive(started_at),
        duration_minutes: exam.duration_minutes,
        current_index: 0,
        answers: BTreeMap::new(),
        question_status: statuses,
        tab_switches: 0,
        clipboard_blocked: 0,
        status: SnapshotStatus::InProgress,
    };

    // The first question is current from the first render; run it through
    // the same visit transition navigation uses.
    apply_action(&mut snapshot, questions, SessionAction::Navigate { index: 0 });

    SnapshotStore::new(state.redis()).store(&snapshot).await;
    metrics::counter!("attempts_started_total").increment(1);

    Ok(snapshot)
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SessionAction {
    Navigate { index: i32 },
    NextQuestion,
    PreviousQuestion,
    SelectOption { option_index: i32 },
    MarkForReview,
    ClearAnswer,
}

pub(crate) fn initial_statuses(questions: &[Question]) -> BTreeMap<String, QuestionStatus> {
    questions.iter().map(|q| (q.id.clone(), QuestionStatus::NotVisited)).collect()
}

fn status_of(snapshot: &SessionSnapshot, question_id: &str) -> QuestionStatus {
    snapshot.question_status.get(question_id).copied().unwrap_or(QuestionStatus::NotVisited)
}

/// Apply one user action to the session state. Returns `true` when state
/// changed. Out-of-range indices and transitions the status machine refuses
/// are ignored without touching the answer or status maps.
pub(crate) fn apply_action(
    snapshot: &mut SessionSnapshot,
    questions: &[Question],
    action: SessionAction,
) -> bool {
    match action {
        SessionAction::Navigate { index } => {
            let Some(question) = usize::try_from(index).ok().and_then(|i| questions.get(i)) else {
                tracing::debug!(index, "Ignoring navigation to out-of-range question");
                return false;
            };

            snapshot.current_index = index;
            let next = question_status::on_visit(status_of(snapshot, &question.id));
            snapshot.question_status.insert(question.id.clone(), next);
            true
        }
        // Stepping off either end of the paper is ignored like any other
        // out-of-range navigation.
        SessionAction::NextQuestion => apply_action(
            snapshot,
            questions,
            SessionAction::Navigate { index: snapshot.current_index + 1 },
        ),
        SessionAction::PreviousQuestion => apply_action(
            snapshot,
            questions,
            SessionAction::Navigate { index: snapshot.current_index - 1 },
        ),
        SessionAction::SelectOption { option_index } => {
            let Some(question) =
                usize::try_from(snapshot.current_index).ok().and_then(|i| questions.get(i))
            else {
                return false;
            };

            let option_count = question.options.0.len();
            if option_index < 0 || option_index as usize >= option_count {
                tracing::debug!(option_index, option_count, "Ignoring out-of-range option");
                return false;
            }

            snapshot.answers.insert(question.id.clone(), option_index);
            let next = question_status::on_select(status_of(snapshot, &question.id));
            snapshot.question_status.insert(question.id.clone(), next);
            true
        }
        SessionAction::MarkForReview => {
            let Some(question) =
                usize::try_from(snapshot.current_index).ok().and_then(|i| questions.get(i))
            else {
                return false;
            };

            let has_answer = snapshot.answers.contains_key(&question.id);
            let next = question_status::on_mark_for_review(status_of(snapshot, &question.id), has_answer);
            snapshot.question_status.insert(question.id.clone(), next);
            true
        }
        SessionAction::ClearAnswer => {
            let Some(question) =
                usize::try_from(snapshot.current_index).ok().and_then(|i| questions.get(i))
            else {
                return false;
            };

            match question_status::on_clear(status_of(snapshot, &question.id)) {
                Some(next) => {
                    snapshot.answers.remove(&question.id);
                    snapshot.question_status.insert(question.id.clone(), next);
                    true
                }
                None => {
                    tracing::debug!(question_id = %question.id, "Ignoring clear on unanswered question");
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::{format_primitive, primitive_now_utc};
    use crate::db::models::Question;
    use sqlx::types::Json;
    use std::collections::BTreeMap;
    use time::Duration;

    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question {
                id: format!("q{i}"),
                exam_id: "exam-1".to_string(),
                prompt: format!("prompt {i}"),
                options: Json(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
                correct_index: 0,
                explanation: None,
                marks: None,
                negative_marks: None,
                order_index: i as i32,
                created_at: primitive_now_utc(),
            })
            .collect()
    }

    fn snapshot_at(started_at: &str, duration_minutes: i32) -> SessionSnapshot {
        let bank = questions(3);
        SessionSnapshot {
            attempt_id: "attempt-1".to_string(),
            exam_id: "exam-1".to_string(),
            user_id: "user-1".to_string(),
            started_at: started_at.to_string(),
            duration_minutes,
            current_index: 0,
            answers: BTreeMap::new(),
            question_status: initial_statuses(&bank),
            tab_switches: 0,
            clipboard_blocked: 0,
            status: SnapshotStatus::InProgress,
        }
    }

    fn attempt_row(id: &str, status: AttemptStatus) -> Attempt {
        let now = primitive_now_utc();
        Attempt {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            user_id: "user-1".to_string(),
            status,
            started_at: now,
            completed_at: None,
            duration_minutes: 30,
            current_index: 1,
            answers: Json(BTreeMap::from([("q0".to_string(), 2)])),
            question_status: Json(BTreeMap::from([
                ("q0".to_string(), QuestionStatus::Answered),
                ("q1".to_string(), QuestionStatus::NotAnswered),
            ])),
            tab_switches: 3,
            clipboard_blocked: 0,
            result: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn reconcile_without_state_awaits_start() {
        let loaded = reconcile(None, None, now()).expect("reconcile");
        assert!(matches!(loaded, LoadedSession::NotStarted));
    }

    #[test]
    fn reconcile_resumes_live_snapshot() {
        let started = format_primitive(crate::core::time::to_primitive_utc(
            now() - Duration::minutes(10),
        ));
        let snapshot = snapshot_at(&started, 30);

        let loaded = reconcile(None, Some(snapshot), now()).expect("reconcile");
        match loaded {
            LoadedSession::InProgress { remaining_seconds, .. } => {
                assert_eq!(remaining_seconds, 20 * 60);
            }
            other => panic!("expected in-progress, got {other:?}"),
        }
    }

    #[test]
    fn reconcile_expired_snapshot_forces_submission_path() {
        let started = format_primitive(crate::core::time::to_primitive_utc(
            now() - Duration::minutes(45),
        ));
        let snapshot = snapshot_at(&started, 30);

        let loaded = reconcile(None, Some(snapshot), now()).expect("reconcile");
        assert!(matches!(loaded, LoadedSession::Expired { .. }));
    }

    #[test]
    fn reconcile_submitted_snapshot_redirects() {
        let started = format_primitive(crate::core::time::to_primitive_utc(
            now() - Duration::minutes(5),
        ));
        let mut snapshot = snapshot_at(&started, 30);
        snapshot.status = SnapshotStatus::Submitted;

        let loaded = reconcile(None, Some(snapshot), now()).expect("reconcile");
        match loaded {
            LoadedSession::Completed { attempt_id } => assert_eq!(attempt_id, "attempt-1"),
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn reconcile_prefers_sealed_attempt_row_over_stale_snapshot() {
        let started = format_primitive(crate::core::time::to_primitive_utc(
            now() - Duration::minutes(5),
        ));
        let snapshot = snapshot_at(&started, 30);
        let sealed = attempt_row("attempt-1", AttemptStatus::Completed);

        let loaded = reconcile(Some(&sealed), Some(snapshot), now()).expect("reconcile");
        assert!(matches!(loaded, LoadedSession::Completed { .. }));
    }

    #[test]
    fn reconcile_rebuilds_snapshot_from_attempt_row() {
        let mut attempt = attempt_row("attempt-2", AttemptStatus::InProgress);
        attempt.started_at = crate::core::time::to_primitive_utc(now() - Duration::minutes(10));

        let loaded = reconcile(Some(&attempt), None, now()).expect("reconcile");
        match loaded {
            LoadedSession::InProgress { snapshot, .. } => {
                assert_eq!(snapshot.attempt_id, "attempt-2");
                assert_eq!(snapshot.current_index, 1);
                assert_eq!(snapshot.answers.get("q0"), Some(&2));
                assert_eq!(snapshot.tab_switches, 3);
            }
            other => panic!("expected in-progress, got {other:?}"),
        }
    }

    #[test]
    fn reconcile_rejects_corrupt_start_instant() {
        let snapshot = snapshot_at("definitely-not-a-timestamp", 30);
        let result = reconcile(None, Some(snapshot), now());
        assert!(matches!(result, Err(SessionLoadError::Clock(_))));
    }

    #[test]
    fn navigation_visits_fresh_questions() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);

        assert!(apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 2 }));
        assert_eq!(snapshot.current_index, 2);
        assert_eq!(snapshot.question_status["q2"], QuestionStatus::NotAnswered);

        // Revisiting an answered question leaves its status alone.
        snapshot.question_status.insert("q2".to_string(), QuestionStatus::Answered);
        assert!(apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 2 }));
        assert_eq!(snapshot.question_status["q2"], QuestionStatus::Answered);
    }

    #[test]
    fn stepping_walks_the_paper_and_stops_at_the_ends() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);

        assert!(!apply_action(&mut snapshot, &bank, SessionAction::PreviousQuestion));
        assert_eq!(snapshot.current_index, 0);

        assert!(apply_action(&mut snapshot, &bank, SessionAction::NextQuestion));
        assert!(apply_action(&mut snapshot, &bank, SessionAction::NextQuestion));
        assert_eq!(snapshot.current_index, 2);
        assert_eq!(snapshot.question_status["q1"], QuestionStatus::NotAnswered);

        assert!(!apply_action(&mut snapshot, &bank, SessionAction::NextQuestion));
        assert_eq!(snapshot.current_index, 2);

        assert!(apply_action(&mut snapshot, &bank, SessionAction::PreviousQuestion));
        assert_eq!(snapshot.current_index, 1);
    }

    #[test]
    fn navigation_out_of_range_is_ignored() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);

        assert!(!apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 3 }));
        assert!(!apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: -1 }));
        assert_eq!(snapshot.current_index, 0);
    }

    #[test]
    fn selecting_records_answer_and_status() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);
        apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 1 });

        assert!(apply_action(&mut snapshot, &bank, SessionAction::SelectOption { option_index: 2 }));
        assert_eq!(snapshot.answers.get("q1"), Some(&2));
        assert_eq!(snapshot.question_status["q1"], QuestionStatus::Answered);
    }

    #[test]
    fn selecting_out_of_range_option_is_ignored() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);

        assert!(!apply_action(&mut snapshot, &bank, SessionAction::SelectOption { option_index: 4 }));
        assert!(!apply_action(&mut snapshot, &bank, SessionAction::SelectOption { option_index: -1 }));
        assert!(snapshot.answers.is_empty());
    }

    #[test]
    fn mark_for_review_tracks_answer_presence() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);
        apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 0 });

        assert!(apply_action(&mut snapshot, &bank, SessionAction::MarkForReview));
        assert_eq!(snapshot.question_status["q0"], QuestionStatus::MarkedForReview);

        apply_action(&mut snapshot, &bank, SessionAction::SelectOption { option_index: 2 });
        assert!(apply_action(&mut snapshot, &bank, SessionAction::MarkForReview));
        assert_eq!(snapshot.question_status["q0"], QuestionStatus::AnsweredMarkedForReview);
    }

    #[test]
    fn clearing_removes_answer_and_review_mark() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);
        apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 0 });
        apply_action(&mut snapshot, &bank, SessionAction::SelectOption { option_index: 2 });
        apply_action(&mut snapshot, &bank, SessionAction::MarkForReview);
        assert_eq!(snapshot.question_status["q0"], QuestionStatus::AnsweredMarkedForReview);

        assert!(apply_action(&mut snapshot, &bank, SessionAction::ClearAnswer));
        assert!(!snapshot.answers.contains_key("q0"));
        assert_eq!(snapshot.question_status["q0"], QuestionStatus::NotAnswered);
    }

    #[test]
    fn clearing_an_unanswered_question_is_refused() {
        let bank = questions(3);
        let started = format_primitive(primitive_now_utc());
        let mut snapshot = snapshot_at(&started, 30);
        apply_action(&mut snapshot, &bank, SessionAction::Navigate { index: 0 });

        assert!(!apply_action(&mut snapshot, &bank, SessionAction::ClearAnswer));
        assert_eq!(snapshot.question_status["q0"], QuestionStatus::NotAnswered);
    }
}
