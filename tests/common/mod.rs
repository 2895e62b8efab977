// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use rally_api::config::Config;
use rally_api::db::FirestoreDb;
use rally_api::models::{Group, GroupMember, Profile};
use rally_api::routes::create_router;
use rally_api::services::{ChangeFeed, PlanService, PushService};
use rally_api::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a plan service wired to the given database, with push delivery
/// disabled and a fresh change feed.
#[allow(dead_code)]
pub fn plan_service(db: &FirestoreDb) -> PlanService {
    PlanService::new(
        db.clone(),
        Arc::new(PushService::new("")),
        Arc::new(ChangeFeed::new()),
    )
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();
    let changes = Arc::new(ChangeFeed::new());
    let push = Arc::new(PushService::new(&config.push_gateway_url));
    let plans = PlanService::new(db.clone(), push, Arc::clone(&changes));

    let state = Arc::new(AppState {
        config,
        db,
        plans,
        changes,
    });

    (create_router(state.clone()), state)
}

/// Create a test JWT token for a user.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    rally_api::middleware::auth::create_jwt(user_id, signing_key).unwrap()
}

/// Generate a unique ID for test isolation.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

/// Parse an RFC3339 timestamp for fixtures.
#[allow(dead_code)]
pub fn parse_time(raw: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .unwrap()
        .with_timezone(&chrono::Utc)
}

/// Seed a group with its roster and default member profiles.
#[allow(dead_code)]
pub async fn seed_group(db: &FirestoreDb, group_id: &str, user_ids: &[&str]) {
    db.upsert_group(&Group {
        id: group_id.to_string(),
        name: format!("Test Group {}", group_id),
        created_by: user_ids[0].to_string(),
    })
    .await
    .expect("Failed to seed group");

    for user_id in user_ids {
        db.upsert_group_member(&GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role: "member".to_string(),
        })
        .await
        .expect("Failed to seed group member");

        db.upsert_profile(&Profile::new(user_id, user_id))
            .await
            .expect("Failed to seed profile");
    }
}
