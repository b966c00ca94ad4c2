use anyhow::Result;
use time::{Duration, OffsetDateTime};

use crate::core::state::AppState;
use crate::core::time::{format_primitive, to_primitive_utc};
use crate::repositories;
use crate::services::attempt_finalize::{self, FinalizeMode};
use crate::services::session_clock::SessionClock;
use crate::services::snapshot::{SessionSnapshot, SnapshotStatus, SnapshotStore};

const BATCH_LIMIT: i64 = 1000;

/// Periodic remote sync: mirror every live snapshot's mutable fields into its
/// attempt row. A failed patch is logged and dropped; the next interval
/// carries the latest state and self-heals.
pub(crate) async fn sync_active_attempts(state: &AppState) -> Result<()> {
    let attempts = repositories::attempts::list_in_progress(state.db(), BATCH_LIMIT).await?;
    let store = SnapshotStore::new(state.redis());
    let now = to_primitive_utc(OffsetDateTime::now_utc());

    for attempt in attempts {
        let Some(snapshot) = store.load(&attempt.exam_id, &attempt.user_id).await else {
            continue;
        };
        if snapshot.attempt_id != attempt.id || snapshot.status != SnapshotStatus::InProgress {
            continue;
        }

        let answers = match serde_json::to_value(&snapshot.answers) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, attempt_id = %attempt.id, "Failed to encode answers");
                continue;
            }
        };
        let question_status = match serde_json::to_value(&snapshot.question_status) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, attempt_id = %attempt.id, "Failed to encode statuses");
                continue;
            }
        };

        let patch = repositories::attempts::PatchProgress {
            current_index: snapshot.current_index,
            answers: &answers,
            question_status: &question_status,
            tab_switches: snapshot.tab_switches,
            clipboard_blocked: snapshot.clipboard_blocked,
            synced_at: now,
        };

        match repositories::attempts::patch_progress(state.db(), &attempt.id, patch).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(attempt_id = %attempt.id, "Attempt sealed mid-sync; patch skipped");
            }
            Err(err) => {
                tracing::warn!(error = %err, attempt_id = %attempt.id, "Periodic sync patch failed");
            }
        }
    }

    Ok(())
}

/// Deadline sweeper: force-submit attempts whose wall-clock deadline (plus
/// the submit grace window) has passed. This is the timer-expiry submission
/// path for sessions whose client went away; it uses the freshest state
/// available, snapshot first, row otherwise.
pub(crate) async fn close_expired_attempts(state: &AppState) -> Result<()> {
    let grace = Duration::seconds(state.settings().exam().submit_grace_seconds as i64);
    let now = OffsetDateTime::now_utc();
    let attempts = repositories::attempts::list_in_progress(state.db(), BATCH_LIMIT).await?;
    let store = SnapshotStore::new(state.redis());

    for attempt in attempts {
        let started_at = format_primitive(attempt.started_at);
        let clock = match SessionClock::arm(&started_at, i64::from(attempt.duration_minutes)) {
            Ok(clock) => clock,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    attempt_id = %attempt.id,
                    "Attempt has unusable timer state; leaving it for manual review"
                );
                continue;
            }
        };

        if now < clock.deadline() + grace {
            continue;
        }

        let mut snapshot = match store.load(&attempt.exam_id, &attempt.user_id).await {
            Some(snapshot)
                if snapshot.attempt_id == attempt.id
                    && snapshot.status == SnapshotStatus::InProgress =>
            {
                snapshot
            }
            _ => SessionSnapshot::from_attempt(&attempt),
        };

        let exam = match repositories::exams::find_by_id(state.db(), &attempt.exam_id).await {
            Ok(Some(exam)) => exam,
            Ok(None) => {
                tracing::error!(attempt_id = %attempt.id, "Exam missing for expired attempt");
                continue;
            }
            Err(err) => {
                tracing::warn!(error = %err, attempt_id = %attempt.id, "Failed to fetch exam");
                continue;
            }
        };
        let questions = match repositories::questions::list_by_exam(state.db(), &exam.id).await {
            Ok(questions) => questions,
            Err(err) => {
                tracing::warn!(error = %err, attempt_id = %attempt.id, "Failed to fetch questions");
                continue;
            }
        };

        match attempt_finalize::finalize_attempt(
            state,
            &exam,
            &questions,
            &mut snapshot,
            FinalizeMode::AutoDeadline,
            now,
        )
        .await
        {
            Ok(outcome) if !outcome.already_sealed => {
                metrics::counter!("attempts_expired_total").increment(1);
                tracing::info!(attempt_id = %attempt.id, "Expired attempt auto-submitted");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    error = %err,
                    attempt_id = %attempt.id,
                    "Failed to auto-submit expired attempt"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::AppState;
    use crate::core::time::primitive_now_utc;
    use crate::db::models::{Exam, Question, User};
    use crate::db::types::{AttemptStatus, ExamStatus};
    use crate::services::session_engine::{self, SessionAction};
    use crate::test_support;
    use uuid::Uuid;

    async fn seed_published_exam(state: &AppState, tag: &str) -> (Exam, Vec<Question>, User) {
        let admin = test_support::insert_admin(
            state.db(),
            &format!("sync-admin-{tag}"),
            "Sync Admin",
            "admin-pass",
        )
        .await;
        let student = test_support::insert_user(
            state.db(),
            &format!("sync-student-{tag}"),
            "Sync Student",
            "student-pass",
        )
        .await;

        let now = primitive_now_utc();
        let exam_id = Uuid::new_v4().to_string();
        let exam = repositories::exams::create(
            state.db(),
            repositories::exams::CreateExam {
                id: &exam_id,
                title: "Sync fixture exam",
                description: None,
                duration_minutes: 30,
                total_marks: 10,
                status: ExamStatus::Published,
                created_by: &admin.id,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("create exam");

        for (position, correct_index) in [1, 0].into_iter().enumerate() {
            repositories::questions::create(
                state.db(),
                repositories::questions::CreateQuestion {
                    id: &Uuid::new_v4().to_string(),
                    exam_id: &exam_id,
                    prompt: "fixture question",
                    options: serde_json::json!(["a", "b", "c"]),
                    correct_index,
                    explanation: None,
                    marks: None,
                    negative_marks: None,
                    order_index: position as i32,
                    created_at: now,
                },
            )
            .await
            .expect("create question");
        }

        let questions =
            repositories::questions::list_by_exam(state.db(), &exam_id).await.expect("questions");

        (exam, questions, student)
    }

    #[tokio::test]
    async fn periodic_sync_mirrors_the_snapshot_into_the_row() {
        let ctx = test_support::setup_test_context().await;
        let (exam, questions, student) = seed_published_exam(&ctx.state, "patch").await;
        let now = time::OffsetDateTime::now_utc();

        let mut snapshot =
            session_engine::create_attempt(&ctx.state, &exam, &questions, &student.id, now)
                .await
                .expect("create attempt");
        session_engine::apply_action(
            &mut snapshot,
            &questions,
            SessionAction::SelectOption { option_index: 1 },
        );
        SnapshotStore::new(ctx.state.redis()).store(&snapshot).await;

        sync_active_attempts(&ctx.state).await.expect("sync");

        let row = repositories::attempts::find_by_id(ctx.state.db(), &snapshot.attempt_id)
            .await
            .expect("fetch attempt")
            .expect("attempt row");
        assert_eq!(row.answers.0.get(&questions[0].id), Some(&1));
        assert!(row.last_synced_at.is_some());
        assert_eq!(row.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn sweeper_auto_submits_attempts_past_the_grace_window() {
        let ctx = test_support::setup_test_context().await;
        let (exam, questions, student) = seed_published_exam(&ctx.state, "sweep").await;
        let now = time::OffsetDateTime::now_utc();

        let mut snapshot =
            session_engine::create_attempt(&ctx.state, &exam, &questions, &student.id, now)
                .await
                .expect("create attempt");
        session_engine::apply_action(
            &mut snapshot,
            &questions,
            SessionAction::SelectOption { option_index: 1 },
        );
        SnapshotStore::new(ctx.state.redis()).store(&snapshot).await;

        test_support::backdate_attempt(&ctx.state, &exam.id, &student.id, 1900).await;
        close_expired_attempts(&ctx.state).await.expect("sweep");

        let row = repositories::attempts::find_by_id(ctx.state.db(), &snapshot.attempt_id)
            .await
            .expect("fetch attempt")
            .expect("attempt row");
        assert_eq!(row.status, AttemptStatus::Completed);
        assert!(row.completed_at.is_some());

        let result = row.result.expect("stored result").0;
        assert_eq!(result["score"], 5);
        assert_eq!(result["time_taken_seconds"], 1800);
    }

    #[tokio::test]
    async fn sweeper_leaves_attempts_inside_the_grace_window_alone() {
        let ctx = test_support::setup_test_context().await;
        let (exam, questions, student) = seed_published_exam(&ctx.state, "grace").await;
        let now = time::OffsetDateTime::now_utc();

        let snapshot =
            session_engine::create_attempt(&ctx.state, &exam, &questions, &student.id, now)
                .await
                .expect("create attempt");

        // Just past the deadline, still within the 30-second grace window.
        test_support::backdate_attempt(&ctx.state, &exam.id, &student.id, 1810).await;
        close_expired_attempts(&ctx.state).await.expect("sweep");

        let row = repositories::attempts::find_by_id(ctx.state.db(), &snapshot.attempt_id)
            .await
            .expect("fetch attempt")
            .expect("attempt row");
        assert_eq!(row.status, AttemptStatus::InProgress);
    }
}
