use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::redis::RedisHandle;
use crate::core::time::format_primitive;
use crate::db::models::Attempt;
use crate::db::types::{AttemptStatus, QuestionStatus};

/// The full session state of one attempt, written to the fast store on every
/// state change. `started_at` is the RFC 3339 instant the timer derives from.
/// A submitted snapshot is kept in place (never deleted) and acts as the
/// resume guard against re-entering a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionSnapshot {
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: String,
    pub(crate) duration_minutes: i32,
    pub(crate) current_index: i32,
    pub(crate) answers: BTreeMap<String, i32>,
    pub(crate) question_status: BTreeMap<String, QuestionStatus>,
    pub(crate) tab_switches: i32,
    pub(crate) clipboard_blocked: i32,
    pub(crate) status: SnapshotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SnapshotStatus {
    InProgress,
    Submitted,
}

impl SessionSnapshot {
    /// Reconstruct the snapshot from the attempt row, e.g. after the fast
    /// store lost its copy. At worst this rewinds to the last periodic sync;
    /// the start instant is exact either way.
    pub(crate) fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            exam_id: attempt.exam_id.clone(),
            user_id: attempt.user_id.clone(),
            started_at: format_primitive(attempt.started_at),
            duration_minutes: attempt.duration_minutes,
            current_index: attempt.current_index,
            answers: attempt.answers.0.clone(),
            question_status: attempt.question_status.0.clone(),
            tab_switches: attempt.tab_switches,
            clipboard_blocked: attempt.clipboard_blocked,
            status: match attempt.status {
                AttemptStatus::InProgress => SnapshotStatus::InProgress,
                AttemptStatus::Completed => SnapshotStatus::Submitted,
            },
        }
    }
}

/// Sole writer of the fast session store. Every access goes through here so
/// the key scheme and the best-effort write policy stay in one place.
pub(crate) struct SnapshotStore<'a> {
    redis: &'a RedisHandle,
}

impl<'a> SnapshotStore<'a> {
    pub(crate) fn new(redis: &'a RedisHandle) -> Self {
        Self { redis }
    }

    fn key(exam_id: &str, user_id: &str) -> String {
        format!("session:{exam_id}:{user_id}")
    }

    /// A missing, unreadable, or undecodable snapshot reads as `None`; the
    /// caller falls back to the attempt row.
    pub(crate) async fn load(&self, exam_id: &str, user_id: &str) -> Option<SessionSnapshot> {
        let key = Self::key(exam_id, user_id);
        let raw = match self.redis.get(&key).await {
            Ok(value) => value?,
            Err(err) => {
                tracing::warn!(error = %err, key, "Failed to read session snapshot");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, key, "Discarding undecodable session snapshot");
                None
            }
        }
    }

    /// Best-effort synchronous write. Must never fail the user action that
    /// triggered it; a lost write costs at most the delta since the last
    /// periodic sync.
    pub(crate) async fn store(&self, snapshot: &SessionSnapshot) {
        let key = Self::key(&snapshot.exam_id, &snapshot.user_id);
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, key, "Failed to serialize session snapshot");
                return;
            }
        };

        if let Err(err) = self.redis.set(&key, &payload).await {
            tracing::warn!(error = %err, key, "Failed to write session snapshot");
        }
    }

    /// Seal the local copy in place after a successful finalize.
    pub(crate) async fn mark_submitted(&self, snapshot: &mut SessionSnapshot) {
        snapshot.status = SnapshotStatus::Submitted;
        self.store(snapshot).await;
    }
}
