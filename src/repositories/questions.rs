use sqlx::PgPool;

use crate::db::models::Question;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, prompt, options, correct_index, explanation, \
    marks, negative_marks, order_index, created_at";

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) options: serde_json::Value,
    pub(crate) correct_index: i32,
    pub(crate) explanation: Option<&'a str>,
    pub(crate) marks: Option<i32>,
    pub(crate) negative_marks: Option<i32>,
    pub(crate) order_index: i32,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    question: CreateQuestion<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO questions (
            id, exam_id, prompt, options, correct_index, explanation,
            marks, negative_marks, order_index, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(question.id)
    .bind(question.exam_id)
    .bind(question.prompt)
    .bind(question.options)
    .bind(question.correct_index)
    .bind(question.explanation)
    .bind(question.marks)
    .bind(question.negative_marks)
    .bind(question.order_index)
    .bind(question.created_at)
    .execute(executor)
    .await?;
    Ok(())
}
