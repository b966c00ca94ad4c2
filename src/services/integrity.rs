use serde::{Deserialize, Serialize};

use crate::services::snapshot::{SessionSnapshot, SnapshotStatus};

/// A client-observed anomaly reported to the engine. These are signals for
/// graders and analytics, never grounds for terminating the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum IntegrityEvent {
    TabHidden,
    Copy,
    Cut,
    Paste,
    ContextMenu,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IntegrityPolicy {
    pub(crate) allow_paste: bool,
}

/// Listener configuration handed to the client at start/resume. The client
/// installs these guards when the attempt enters `in_progress` and removes
/// them on any exit from that state.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct IntegrityGuardConfig {
    pub(crate) suppress_context_menu: bool,
    pub(crate) suppress_copy: bool,
    pub(crate) suppress_cut: bool,
    pub(crate) allow_paste: bool,
    pub(crate) confirm_leave: bool,
}

impl IntegrityGuardConfig {
    pub(crate) fn from_policy(policy: IntegrityPolicy) -> Self {
        Self {
            suppress_context_menu: true,
            suppress_copy: true,
            suppress_cut: true,
            allow_paste: policy.allow_paste,
            confirm_leave: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct IntegrityOutcome {
    pub(crate) recorded: bool,
    pub(crate) show_warning: bool,
}

/// Accumulate an integrity event into the snapshot's counters. Events are
/// only accepted while the attempt is in progress; everything after
/// submission (or before start) is dropped.
pub(crate) fn record_event(
    snapshot: &mut SessionSnapshot,
    event: IntegrityEvent,
    policy: IntegrityPolicy,
) -> IntegrityOutcome {
    if snapshot.status != SnapshotStatus::InProgress {
        return IntegrityOutcome { recorded: false, show_warning: false };
    }

    match event {
        IntegrityEvent::TabHidden => {
            snapshot.tab_switches += 1;
            IntegrityOutcome { recorded: true, show_warning: true }
        }
        IntegrityEvent::Copy | IntegrityEvent::Cut | IntegrityEvent::ContextMenu => {
            snapshot.clipboard_blocked += 1;
            IntegrityOutcome { recorded: true, show_warning: false }
        }
        IntegrityEvent::Paste => {
            if policy.allow_paste {
                IntegrityOutcome { recorded: false, show_warning: false }
            } else {
                snapshot.clipboard_blocked += 1;
                IntegrityOutcome { recorded: true, show_warning: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            attempt_id: "attempt-1".to_string(),
            exam_id: "exam-1".to_string(),
            user_id: "user-1".to_string(),
            started_at: "2025-01-02T10:00:00Z".to_string(),
            duration_minutes: 30,
            current_index: 0,
            answers: BTreeMap::new(),
            question_status: BTreeMap::new(),
            tab_switches: 0,
            clipboard_blocked: 0,
            status: SnapshotStatus::InProgress,
        }
    }

    const DENY_PASTE: IntegrityPolicy = IntegrityPolicy { allow_paste: false };

    #[test]
    fn tab_hidden_increments_and_warns_every_time() {
        let mut snapshot = snapshot();

        let first = record_event(&mut snapshot, IntegrityEvent::TabHidden, DENY_PASTE);
        let second = record_event(&mut snapshot, IntegrityEvent::TabHidden, DENY_PASTE);

        assert_eq!(snapshot.tab_switches, 2);
        assert!(first.show_warning);
        assert!(second.show_warning);
    }

    #[test]
    fn clipboard_events_count_without_warning() {
        let mut snapshot = snapshot();

        for event in [IntegrityEvent::Copy, IntegrityEvent::Cut, IntegrityEvent::ContextMenu] {
            let outcome = record_event(&mut snapshot, event, DENY_PASTE);
            assert!(outcome.recorded);
            assert!(!outcome.show_warning);
        }

        assert_eq!(snapshot.clipboard_blocked, 3);
        assert_eq!(snapshot.tab_switches, 0);
    }

    #[test]
    fn paste_follows_policy() {
        let mut snapshot = snapshot();

        let blocked = record_event(&mut snapshot, IntegrityEvent::Paste, DENY_PASTE);
        assert!(blocked.recorded);
        assert_eq!(snapshot.clipboard_blocked, 1);

        let allowed =
            record_event(&mut snapshot, IntegrityEvent::Paste, IntegrityPolicy { allow_paste: true });
        assert!(!allowed.recorded);
        assert_eq!(snapshot.clipboard_blocked, 1);
    }

    #[test]
    fn events_after_submission_are_dropped() {
        let mut snapshot = snapshot();
        snapshot.status = SnapshotStatus::Submitted;

        let outcome = record_event(&mut snapshot, IntegrityEvent::TabHidden, DENY_PASTE);

        assert!(!outcome.recorded);
        assert!(!outcome.show_warning);
        assert_eq!(snapshot.tab_switches, 0);
    }

    #[test]
    fn guard_config_reflects_paste_policy() {
        let config = IntegrityGuardConfig::from_policy(IntegrityPolicy { allow_paste: true });
        assert!(config.allow_paste);
        assert!(config.suppress_copy && config.suppress_cut && config.suppress_context_menu);
        assert!(config.confirm_leave);
    }
}
