// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Leaderboard integration tests.
//!
//! These tests require the Firestore emulator to be running.

use rally_api::error::AppError;
use rally_api::models::{Medal, Profile};

mod common;
use common::{plan_service, seed_group, test_db, unique_id};

async fn set_score(db: &rally_api::db::FirestoreDb, user_id: &str, score: i32) {
    let mut profile = db.get_profile(user_id).await.unwrap().unwrap();
    profile.commitment_score = score;
    db.upsert_profile(&profile).await.unwrap();
}

#[tokio::test]
async fn test_leaderboard_ranks_group_members() {
    require_emulator!();

    let db = test_db().await;
    let service = plan_service(&db);

    let group_id = unique_id("group");
    // Roster reads back ordered by user_id; fix the order with prefixes
    let ann = format!("a-{}", unique_id("ann"));
    let ben = format!("b-{}", unique_id("ben"));
    let cat = format!("c-{}", unique_id("cat"));
    seed_group(&db, &group_id, &[&ann, &ben, &cat]).await;

    // Scores [90, 90, 70]: the tied pair must keep roster order with
    // distinct ranks, never a shared rank
    set_score(&db, &ann, 90).await;
    set_score(&db, &ben, 90).await;
    set_score(&db, &cat, 70).await;

    let board = service.leaderboard(&group_id).await.unwrap();

    assert_eq!(board.len(), 3);
    assert_eq!(board[0].user_id, ann);
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[0].medal, Some(Medal::Gold));
    assert_eq!(board[1].user_id, ben);
    assert_eq!(board[1].rank, 2);
    assert_eq!(board[1].medal, Some(Medal::Silver));
    assert_eq!(board[2].user_id, cat);
    assert_eq!(board[2].rank, 3);
    assert_eq!(board[2].medal, Some(Medal::Bronze));
}

#[tokio::test]
async fn test_leaderboard_includes_members_without_history() {
    require_emulator!();

    let db = test_db().await;
    let service = plan_service(&db);

    let group_id = unique_id("group");
    let ann = unique_id("ann");
    seed_group(&db, &group_id, &[&ann]).await;

    // Flake history for the only member
    let mut profile = Profile::new(&ann, &ann);
    profile.commitment_score = 80;
    profile.total_attended = 1;
    profile.total_flaked = 3;
    db.upsert_profile(&profile).await.unwrap();

    let board = service.leaderboard(&group_id).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].attendance_rate, 25);
    assert_eq!(board[0].attended, 1);
    assert_eq!(board[0].flaked, 3);
}

#[tokio::test]
async fn test_leaderboard_unknown_group_is_not_found() {
    require_emulator!();

    let db = test_db().await;
    let service = plan_service(&db);

    let err = service.leaderboard(&unique_id("ghost")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
