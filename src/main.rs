// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rally API Server
//!
//! Backend for proposing group meetups tied to discovered events, voting
//! them into confirmed plans, and tracking who actually shows up.

use rally_api::{
    config::Config,
    db::FirestoreDb,
    services::{ChangeFeed, PlanService, PushService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Rally API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize push gateway client
    let push = Arc::new(PushService::new(&config.push_gateway_url));
    if config.push_gateway_url.is_empty() {
        tracing::warn!("PUSH_GATEWAY_URL not set; push delivery disabled");
    } else {
        tracing::info!(gateway = %config.push_gateway_url, "Push gateway configured");
    }

    // In-process change feed for connected clients
    let changes = Arc::new(ChangeFeed::new());

    let plans = PlanService::new(db.clone(), Arc::clone(&push), Arc::clone(&changes));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        plans,
        changes,
    });

    // Build router
    let app = rally_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rally_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
