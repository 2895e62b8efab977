// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan model and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a plan.
///
/// Transitions are monotonic and one-directional; `completed` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Proposed,
    Confirmed,
    Completed,
    Cancelled,
}

impl PlanStatus {
    /// Whether a transition from `self` to `target` is legal.
    ///
    /// Legal transitions: proposed→confirmed, proposed→cancelled,
    /// confirmed→cancelled, confirmed→completed. Everything else is not.
    pub fn can_transition(self, target: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, target),
            (Proposed, Confirmed) | (Proposed, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Proposed => "proposed",
            PlanStatus::Confirmed => "confirmed",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of requesting a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied,
    /// The plan was already in the requested state; treated as success so
    /// that racing callers stay idempotent.
    AlreadyInTarget,
    /// The transition is illegal from the current state.
    Rejected(PlanStatus),
}

/// Stored plan record in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID (also used as document ID)
    pub id: String,
    /// Event from the external catalog this meetup is tied to
    pub event_id: String,
    /// Group proposing the meetup
    pub group_id: String,
    /// User who proposed the plan
    pub created_by: String,
    /// Lifecycle status
    pub status: PlanStatus,
    /// When the meetup is planned to happen
    pub planned_date: DateTime<Utc>,
    /// Yes-votes needed for auto-confirmation (fixed at creation)
    pub min_attendees: u32,
    /// Stamped on proposed→confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Stamped on confirmed→completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Stamped on →cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the plan was proposed
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Evaluate a requested transition against the state machine and, if
    /// legal, apply it in memory stamping the corresponding timestamp.
    ///
    /// This is the single place the transition table lives; the store's
    /// transactional update calls this against a freshly-read plan so the
    /// decision is always made on current state.
    pub fn request_transition(
        &mut self,
        target: PlanStatus,
        now: DateTime<Utc>,
    ) -> TransitionOutcome {
        if self.status == target {
            return TransitionOutcome::AlreadyInTarget;
        }
        if !self.status.can_transition(target) {
            return TransitionOutcome::Rejected(self.status);
        }

        self.status = target;
        match target {
            PlanStatus::Confirmed => self.confirmed_at = Some(now),
            PlanStatus::Completed => self.completed_at = Some(now),
            PlanStatus::Cancelled => self.cancelled_at = Some(now),
            PlanStatus::Proposed => {}
        }
        TransitionOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_plan(status: PlanStatus) -> Plan {
        Plan {
            id: "plan-1".to_string(),
            event_id: "event-1".to_string(),
            group_id: "group-1".to_string(),
            created_by: "user-1".to_string(),
            status,
            planned_date: "2026-03-01T19:00:00Z".parse().unwrap(),
            min_attendees: 3,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: "2026-02-01T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_legal_transitions() {
        use PlanStatus::*;
        assert!(Proposed.can_transition(Confirmed));
        assert!(Proposed.can_transition(Cancelled));
        assert!(Confirmed.can_transition(Cancelled));
        assert!(Confirmed.can_transition(Completed));
    }

    #[test]
    fn test_illegal_transitions() {
        use PlanStatus::*;
        assert!(!Proposed.can_transition(Completed));
        assert!(!Confirmed.can_transition(Proposed));
        assert!(!Completed.can_transition(Confirmed));
        assert!(!Completed.can_transition(Cancelled));
        assert!(!Cancelled.can_transition(Proposed));
        assert!(!Cancelled.can_transition(Completed));
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let now: chrono::DateTime<Utc> = "2026-02-10T18:00:00Z".parse().unwrap();

        let mut plan = make_plan(PlanStatus::Proposed);
        assert_eq!(
            plan.request_transition(PlanStatus::Confirmed, now),
            TransitionOutcome::Applied
        );
        assert_eq!(plan.status, PlanStatus::Confirmed);
        assert_eq!(plan.confirmed_at, Some(now));
        assert!(plan.completed_at.is_none());

        let later: chrono::DateTime<Utc> = "2026-03-01T22:00:00Z".parse().unwrap();
        assert_eq!(
            plan.request_transition(PlanStatus::Completed, later),
            TransitionOutcome::Applied
        );
        assert_eq!(plan.completed_at, Some(later));
        // Confirmation timestamp survives completion
        assert_eq!(plan.confirmed_at, Some(now));
    }

    #[test]
    fn test_repeated_transition_is_noop() {
        let now = Utc::now();
        let mut plan = make_plan(PlanStatus::Confirmed);

        assert_eq!(
            plan.request_transition(PlanStatus::Confirmed, now),
            TransitionOutcome::AlreadyInTarget
        );
        // No timestamp stamped by the no-op
        assert!(plan.confirmed_at.is_none());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let now = Utc::now();
        for terminal in [PlanStatus::Completed, PlanStatus::Cancelled] {
            let mut plan = make_plan(terminal);
            for target in [PlanStatus::Proposed, PlanStatus::Confirmed] {
                assert_eq!(
                    plan.request_transition(target, now),
                    TransitionOutcome::Rejected(terminal)
                );
                assert_eq!(plan.status, terminal, "status must not move");
            }
        }
    }

    #[test]
    fn test_cancel_from_both_live_states() {
        let now = Utc::now();

        let mut proposed = make_plan(PlanStatus::Proposed);
        assert_eq!(
            proposed.request_transition(PlanStatus::Cancelled, now),
            TransitionOutcome::Applied
        );
        assert_eq!(proposed.cancelled_at, Some(now));

        let mut confirmed = make_plan(PlanStatus::Confirmed);
        assert_eq!(
            confirmed.request_transition(PlanStatus::Cancelled, now),
            TransitionOutcome::Applied
        );
        assert_eq!(confirmed.cancelled_at, Some(now));
    }
}
