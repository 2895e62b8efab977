// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod plans;
pub mod push;
pub mod realtime;

pub use plans::{CompletionSummary, CreatePlanRequest, PlanService, VoteOutcome};
pub use push::{DispatchSummary, PushRecipient, PushService};
pub use realtime::{ChangeEvent, ChangeFeed, ChangeOp, EntityKind};
