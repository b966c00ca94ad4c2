use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::models::Question;

/// Marks applied when a question carries no per-question override.
pub(crate) const DEFAULT_MARKS: i32 = 5;
pub(crate) const DEFAULT_NEGATIVE_MARKS: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExamResult {
    pub(crate) score: i32,
    pub(crate) correct: u32,
    pub(crate) incorrect: u32,
    pub(crate) unanswered: u32,
    pub(crate) accuracy: f64,
    pub(crate) time_taken_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ImprovementDelta {
    pub(crate) score_diff: i32,
    pub(crate) accuracy_diff: f64,
    /// Previous time minus current time; positive means faster.
    pub(crate) time_diff_seconds: i64,
}

/// The sealed result persisted on the attempt: the summary plus an optional
/// delta against the user's most recent completed attempt at the same exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AttemptResult {
    #[serde(flatten)]
    pub(crate) summary: ExamResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) improvement: Option<ImprovementDelta>,
}

/// Pure scoring pass over the question bank. A question absent from the
/// answer map counts as unanswered and contributes nothing; extraneous keys
/// in the map (not matching any question) are ignored.
pub(crate) fn score_attempt(
    questions: &[Question],
    answers: &BTreeMap<String, i32>,
    time_taken_seconds: i64,
) -> ExamResult {
    let mut score = 0i32;
    let mut correct = 0u32;
    let mut incorrect = 0u32;
    let mut unanswered = 0u32;

    for question in questions {
        match answers.get(&question.id) {
            None => unanswered += 1,
            Some(selected) if *selected == question.correct_index => {
                correct += 1;
                score += question.marks.unwrap_or(DEFAULT_MARKS);
            }
            Some(_) => {
                incorrect += 1;
                score -= question.negative_marks.unwrap_or(DEFAULT_NEGATIVE_MARKS);
            }
        }
    }

    let attempted = correct + incorrect;
    let accuracy =
        if attempted == 0 { 0.0 } else { f64::from(correct) / f64::from(attempted) * 100.0 };

    ExamResult { score, correct, incorrect, unanswered, accuracy, time_taken_seconds }
}

pub(crate) fn improvement_between(previous: &ExamResult, current: &ExamResult) -> ImprovementDelta {
    ImprovementDelta {
        score_diff: current.score - previous.score,
        accuracy_diff: current.accuracy - previous.accuracy,
        time_diff_seconds: previous.time_taken_seconds - current.time_taken_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use sqlx::types::Json;

    fn question(id: &str, correct_index: i32) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            prompt: format!("prompt for {id}"),
            options: Json(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            correct_index,
            explanation: None,
            marks: None,
            negative_marks: None,
            order_index: 0,
            created_at: primitive_now_utc(),
        }
    }

    #[test]
    fn one_correct_one_incorrect() {
        let questions = vec![question("q1", 1), question("q2", 0)];
        let answers = BTreeMap::from([("q1".to_string(), 1), ("q2".to_string(), 1)]);

        let result = score_attempt(&questions, &answers, 120);

        assert_eq!(result.score, 4);
        assert_eq!(result.correct, 1);
        assert_eq!(result.incorrect, 1);
        assert_eq!(result.unanswered, 0);
        assert_eq!(result.accuracy, 50.0);
        assert_eq!(result.time_taken_seconds, 120);
    }

    #[test]
    fn unanswered_questions_contribute_nothing() {
        let questions = vec![question("q1", 1), question("q2", 0)];
        let answers = BTreeMap::from([("q1".to_string(), 1)]);

        let result = score_attempt(&questions, &answers, 60);

        assert_eq!(result.score, 5);
        assert_eq!(result.unanswered, 1);
        assert_eq!(result.accuracy, 100.0);
    }

    #[test]
    fn zero_attempted_yields_zero_accuracy() {
        let questions = vec![question("q1", 1), question("q2", 0)];
        let result = score_attempt(&questions, &BTreeMap::new(), 10);

        assert_eq!(result.accuracy, 0.0);
        assert_eq!(result.unanswered, 2);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn per_question_overrides_take_precedence() {
        let mut expensive = question("q1", 0);
        expensive.marks = Some(10);
        expensive.negative_marks = Some(3);
        let questions = vec![expensive, question("q2", 0)];

        let correct = BTreeMap::from([("q1".to_string(), 0)]);
        assert_eq!(score_attempt(&questions, &correct, 0).score, 10);

        let wrong = BTreeMap::from([("q1".to_string(), 2)]);
        assert_eq!(score_attempt(&questions, &wrong, 0).score, -3);
    }

    #[test]
    fn scoring_is_idempotent() {
        let questions = vec![question("q1", 1), question("q2", 0), question("q3", 3)];
        let answers = BTreeMap::from([("q1".to_string(), 1), ("q3".to_string(), 2)]);

        let first = score_attempt(&questions, &answers, 300);
        let second = score_attempt(&questions, &answers, 300);
        assert_eq!(first, second);
    }

    #[test]
    fn extraneous_answer_keys_are_ignored() {
        let questions = vec![question("q1", 1)];
        let answers = BTreeMap::from([("q1".to_string(), 1), ("ghost".to_string(), 0)]);

        let result = score_attempt(&questions, &answers, 0);
        assert_eq!(result.correct, 1);
        assert_eq!(result.incorrect, 0);
    }

    #[test]
    fn improvement_delta_signs() {
        let previous = ExamResult {
            score: 10,
            correct: 2,
            incorrect: 0,
            unanswered: 0,
            accuracy: 100.0,
            time_taken_seconds: 500,
        };
        let current = ExamResult {
            score: 14,
            correct: 3,
            incorrect: 1,
            unanswered: 0,
            accuracy: 75.0,
            time_taken_seconds: 400,
        };

        let delta = improvement_between(&previous, &current);
        assert_eq!(delta.score_diff, 4);
        assert_eq!(delta.accuracy_diff, -25.0);
        assert_eq!(delta.time_diff_seconds, 100);
    }
}
