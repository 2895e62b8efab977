// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rally: propose group meetups, vote, auto-confirm, and show up.
//!
//! This crate provides the backend API for the plan lifecycle and the
//! commitment scoring engine: plans move proposed→confirmed→completed (or
//! →cancelled), votes drive auto-confirmation, attendance outcomes adjust
//! each member's 0–100 commitment score, and group leaderboards rank the
//! results.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{ChangeFeed, PlanService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub plans: PlanService,
    pub changes: Arc<ChangeFeed>,
}
