use crate::db::types::QuestionStatus;

/// Navigation lands on a question: a never-seen question becomes
/// `NotAnswered`; every other state is left alone.
pub(crate) fn on_visit(status: QuestionStatus) -> QuestionStatus {
    match status {
        QuestionStatus::NotVisited => QuestionStatus::NotAnswered,
        other => other,
    }
}

/// Selecting an option. A question already answered-and-marked keeps its
/// review mark (only the recorded answer changes); everything else lands on
/// `Answered`.
pub(crate) fn on_select(status: QuestionStatus) -> QuestionStatus {
    match status {
        QuestionStatus::AnsweredMarkedForReview => QuestionStatus::AnsweredMarkedForReview,
        _ => QuestionStatus::Answered,
    }
}

/// Marking for review picks the variant from the presence of a recorded
/// answer, not from the current status alone.
pub(crate) fn on_mark_for_review(_status: QuestionStatus, has_answer: bool) -> QuestionStatus {
    if has_answer {
        QuestionStatus::AnsweredMarkedForReview
    } else {
        QuestionStatus::MarkedForReview
    }
}

/// Clearing a response always lands on `NotAnswered`, discarding any review
/// mark. States without a recorded answer have nothing to clear; the
/// transition is refused with `None`.
pub(crate) fn on_clear(status: QuestionStatus) -> Option<QuestionStatus> {
    match status {
        QuestionStatus::Answered | QuestionStatus::AnsweredMarkedForReview => {
            Some(QuestionStatus::NotAnswered)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use QuestionStatus::*;

    #[test]
    fn visiting_a_fresh_question_marks_it_not_answered() {
        assert_eq!(on_visit(NotVisited), NotAnswered);
    }

    #[test]
    fn visiting_leaves_every_other_state_unchanged() {
        for status in [NotAnswered, Answered, MarkedForReview, AnsweredMarkedForReview] {
            assert_eq!(on_visit(status), status);
        }
    }

    #[test]
    fn selecting_moves_to_answered() {
        assert_eq!(on_select(NotAnswered), Answered);
        assert_eq!(on_select(MarkedForReview), Answered);
        assert_eq!(on_select(NotVisited), Answered);
        assert_eq!(on_select(Answered), Answered);
    }

    #[test]
    fn selecting_keeps_answered_review_mark() {
        assert_eq!(on_select(AnsweredMarkedForReview), AnsweredMarkedForReview);
    }

    #[test]
    fn marking_inspects_answer_presence() {
        assert_eq!(on_mark_for_review(NotAnswered, false), MarkedForReview);
        assert_eq!(on_mark_for_review(Answered, true), AnsweredMarkedForReview);
        // Re-marking is idempotent either way.
        assert_eq!(on_mark_for_review(MarkedForReview, false), MarkedForReview);
        assert_eq!(on_mark_for_review(AnsweredMarkedForReview, true), AnsweredMarkedForReview);
    }

    #[test]
    fn clearing_discards_the_review_mark() {
        assert_eq!(on_clear(Answered), Some(NotAnswered));
        assert_eq!(on_clear(AnsweredMarkedForReview), Some(NotAnswered));
    }

    #[test]
    fn clearing_without_an_answer_is_refused() {
        assert_eq!(on_clear(NotVisited), None);
        assert_eq!(on_clear(NotAnswered), None);
        assert_eq!(on_clear(MarkedForReview), None);
    }
}
