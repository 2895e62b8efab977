// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod group;
pub mod leaderboard;
pub mod notification;
pub mod participant;
pub mod plan;
pub mod profile;

pub use group::{Group, GroupMember};
pub use leaderboard::{LeaderboardEntry, Medal};
pub use notification::{NotificationKind, PushMessage};
pub use participant::{Participant, ParticipantStatus, Vote, VoteCounts};
pub use plan::{Plan, PlanStatus, TransitionOutcome};
pub use profile::{AppliedOutcome, Outcome, Profile};
