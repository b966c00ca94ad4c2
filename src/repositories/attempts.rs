use std::collections::BTreeMap;

use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::Attempt;
use crate::db::types::{AttemptStatus, QuestionStatus};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, user_id, status, started_at, completed_at, duration_minutes, \
    current_index, answers, question_status, tab_switches, clipboard_blocked, \
    result, last_synced_at, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) started_at: time::PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) question_status: Json<BTreeMap<String, QuestionStatus>>,
    pub(crate) created_at: time::PrimitiveDateTime,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

/// Insert a fresh in-progress attempt. Returns false when the partial unique
/// index on (exam_id, user_id, in_progress) already holds a row, in which
/// case the caller resumes the existing attempt instead.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, exam_id, user_id, status, started_at, duration_minutes,
            question_status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        ON CONFLICT (exam_id, user_id) WHERE status = 'in_progress' DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.exam_id)
    .bind(attempt.user_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.duration_minutes)
    .bind(attempt.question_status)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE exam_id = $1 AND user_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(user_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_last_completed(
    pool: &PgPool,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE exam_id = $1 AND user_id = $2 AND status = $3 \
         ORDER BY completed_at DESC LIMIT 1"
    ))
    .bind(exam_id)
    .bind(user_id)
    .bind(AttemptStatus::Completed)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_in_progress(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE status = $1 ORDER BY started_at LIMIT $2"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
}

pub(crate) struct PatchProgress<'a> {
    pub(crate) current_index: i32,
    pub(crate) answers: &'a serde_json::Value,
    pub(crate) question_status: &'a serde_json::Value,
    pub(crate) tab_switches: i32,
    pub(crate) clipboard_blocked: i32,
    pub(crate) synced_at: time::PrimitiveDateTime,
}

/// Periodic-sync write: mirrors the snapshot's mutable fields into the
/// attempt row. Guarded so a patch racing a finalize never resurrects a
/// sealed attempt.
pub(crate) async fn patch_progress(
    pool: &PgPool,
    id: &str,
    patch: PatchProgress<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET
            current_index = $1,
            answers = $2,
            question_status = $3,
            tab_switches = $4,
            clipboard_blocked = $5,
            last_synced_at = $6,
            updated_at = $6
         WHERE id = $7 AND status = $8",
    )
    .bind(patch.current_index)
    .bind(patch.answers)
    .bind(patch.question_status)
    .bind(patch.tab_switches)
    .bind(patch.clipboard_blocked)
    .bind(patch.synced_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) struct FinalizeAttempt<'a> {
    pub(crate) answers: &'a serde_json::Value,
    pub(crate) question_status: &'a serde_json::Value,
    pub(crate) tab_switches: i32,
    pub(crate) clipboard_blocked: i32,
    pub(crate) result: &'a serde_json::Value,
    pub(crate) completed_at: time::PrimitiveDateTime,
}

/// The submission latch. The `status = 'in_progress'` predicate makes this a
/// one-way transition: the first caller seals the attempt and wins; any
/// racing caller sees zero rows affected and must read the stored result.
pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    seal: FinalizeAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET
            status = $1,
            answers = $2,
            question_status = $3,
            tab_switches = $4,
            clipboard_blocked = $5,
            result = $6,
            completed_at = $7,
            updated_at = $7
         WHERE id = $8 AND status = $9",
    )
    .bind(AttemptStatus::Completed)
    .bind(seal.answers)
    .bind(seal.question_status)
    .bind(seal.tab_switches)
    .bind(seal.clipboard_blocked)
    .bind(seal.result)
    .bind(seal.completed_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
