use anyhow::{anyhow, Context, Result};
use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::core::time::to_primitive_utc;
use crate::db::models::{Exam, Question};
use crate::repositories;
use crate::services::scoring::{self, AttemptResult};
use crate::services::session_clock::SessionClock;
use crate::services::snapshot::{SessionSnapshot, SnapshotStore};

#[derive(Debug, Clone, Copy)]
pub(crate) enum FinalizeMode {
    ManualSubmit,
    AutoDeadline,
}

impl FinalizeMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::ManualSubmit => "manual",
            Self::AutoDeadline => "deadline",
        }
    }
}

#[derive(Debug)]
pub(crate) struct FinalizeOutcome {
    pub(crate) result: AttemptResult,
    /// True when another caller had already sealed the attempt and the
    /// stored result was returned instead of a freshly persisted one.
    pub(crate) already_sealed: bool,
}

/// Score the attempt and seal it with exactly one finalize write. The
/// conditional update in `repositories::attempts::finalize` is the one-way
/// submission latch: whichever of a manual submit, a per-request deadline
/// check, or the sweeper gets there first wins; everyone else reads the
/// stored result. Scoring is pure and deterministic, so a losing racer's
/// computation is identical and simply discarded.
///
/// On a failed finalize write the attempt stays in progress and the snapshot
/// is left unsealed; the caller surfaces a retryable error and a retry
/// re-issues the same write.
pub(crate) async fn finalize_attempt(
    state: &AppState,
    exam: &Exam,
    questions: &[Question],
    snapshot: &mut SessionSnapshot,
    mode: FinalizeMode,
    now: OffsetDateTime,
) -> Result<FinalizeOutcome> {
    let clock = SessionClock::arm(&snapshot.started_at, i64::from(snapshot.duration_minutes))
        .context("Cannot score attempt with corrupt timer state")?;

    let time_taken_seconds = match mode {
        FinalizeMode::ManualSubmit => clock.time_taken_seconds(now),
        FinalizeMode::AutoDeadline => clock.total_seconds(),
    };

    let summary = scoring::score_attempt(questions, &snapshot.answers, time_taken_seconds);

    let improvement =
        repositories::attempts::find_last_completed(state.db(), &exam.id, &snapshot.user_id)
            .await
            .context("Failed to fetch previous attempt")?
            .and_then(|attempt| attempt.result)
            .and_then(|stored| serde_json::from_value::<AttemptResult>(stored.0).ok())
            .map(|previous| scoring::improvement_between(&previous.summary, &summary));

    let result = AttemptResult { summary, improvement };

    let answers = serde_json::to_value(&snapshot.answers).context("serialize answers")?;
    let question_status =
        serde_json::to_value(&snapshot.question_status).context("serialize question status")?;
    let result_value = serde_json::to_value(&result).context("serialize result")?;

    let sealed = repositories::attempts::finalize(
        state.db(),
        &snapshot.attempt_id,
        repositories::attempts::FinalizeAttempt {
            answers: &answers,
            question_status: &question_status,
            tab_switches: snapshot.tab_switches,
            clipboard_blocked: snapshot.clipboard_blocked,
            result: &result_value,
            completed_at: to_primitive_utc(now),
        },
    )
    .await
    .context("Failed to finalize attempt")?;

    let store = SnapshotStore::new(state.redis());

    if sealed {
        store.mark_submitted(snapshot).await;
        metrics::counter!("attempts_submitted_total", "mode" => mode.as_str()).increment(1);
        tracing::info!(
            attempt_id = %snapshot.attempt_id,
            exam_id = %exam.id,
            mode = mode.as_str(),
            score = result.summary.score,
            "Attempt finalized"
        );
        return Ok(FinalizeOutcome { result, already_sealed: false });
    }

    // Lost the submission race: the attempt was sealed by the other path.
    let attempt = repositories::attempts::find_by_id(state.db(), &snapshot.attempt_id)
        .await
        .context("Failed to fetch sealed attempt")?
        .ok_or_else(|| anyhow!("Attempt missing after finalize"))?;
    let stored = attempt.result.ok_or_else(|| anyhow!("Sealed attempt has no result"))?;
    let result: AttemptResult =
        serde_json::from_value(stored.0).context("decode stored result")?;

    store.mark_submitted(snapshot).await;
    Ok(FinalizeOutcome { result, already_sealed: true })
}
