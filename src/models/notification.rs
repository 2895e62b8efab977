// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification kinds and message composition.
//!
//! Notification records are ephemeral delivery units, never authoritative
//! state; composing one has no effect on any plan or profile.

use serde::{Deserialize, Serialize};

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PlanInvite,
    PlanConfirmed,
    PlanReminder,
    CheckInOpen,
    PlanCompleted,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::PlanInvite => "plan_invite",
            NotificationKind::PlanConfirmed => "plan_confirmed",
            NotificationKind::PlanReminder => "plan_reminder",
            NotificationKind::CheckInOpen => "check_in_open",
            NotificationKind::PlanCompleted => "plan_completed",
        }
    }
}

/// Composed push message body, shared by every recipient of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// Compose the kind-specific message for a plan.
///
/// `group_name` gives the title some context; the client deep-links via the
/// `{kind, plan_id}` data payload attached at delivery time.
pub fn compose(kind: NotificationKind, group_name: &str) -> PushMessage {
    let (title, body) = match kind {
        NotificationKind::PlanInvite => (
            format!("New plan in {}", group_name),
            "A meetup was proposed. Cast your vote!".to_string(),
        ),
        NotificationKind::PlanConfirmed => (
            "It's on! 🎉".to_string(),
            format!("Your meetup with {} is confirmed.", group_name),
        ),
        NotificationKind::PlanReminder => (
            format!("{} is waiting on you", group_name),
            "Votes are still open for an upcoming meetup.".to_string(),
        ),
        NotificationKind::CheckInOpen => (
            "Check in when you arrive".to_string(),
            format!("Today's meetup with {} is happening.", group_name),
        ),
        NotificationKind::PlanCompleted => (
            "How was it?".to_string(),
            format!("Your meetup with {} wrapped up.", group_name),
        ),
    };
    PushMessage { title, body }
}
