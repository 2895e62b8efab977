// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Profiles (commitment scores and attendance counters)
//! - Plans (lifecycle state, transactional transitions)
//! - Plan participants (votes, check-ins)
//! - Groups (read-only roster dependency)
//! - Outcome ledger (applied-outcome records for idempotent scoring)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    AppliedOutcome, Group, GroupMember, Outcome, Participant, Plan, PlanStatus, Profile,
    TransitionOutcome,
};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Cursor for paginated plan listing (keyset on planned date).
#[derive(Debug, Clone, Copy)]
pub struct PlanQueryCursor {
    pub planned_date: DateTime<Utc>,
}

/// Document ID for a participant row: one row per (plan, user) pair.
pub fn participant_doc_id(plan_id: &str, user_id: &str) -> String {
    format!("{}_{}", plan_id, user_id)
}

/// Document ID for a membership row.
fn member_doc_id(group_id: &str, user_id: &str) -> String {
    format!("{}_{}", group_id, user_id)
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by user ID.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a profile.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&profile.id)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch profiles for a list of users, preserving input order.
    ///
    /// Users without a stored profile get a fresh default one; the
    /// leaderboard ranker depends on the input order for stable ties.
    pub async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>, AppError> {
        stream::iter(user_ids.to_vec())
            .map(|user_id| async move {
                let profile = self
                    .get_profile(&user_id)
                    .await?
                    .unwrap_or_else(|| Profile::new(&user_id, &user_id));
                Ok::<_, AppError>(profile)
            })
            .buffered(MAX_CONCURRENT_DB_OPS)
            .try_collect()
            .await
    }

    // ─── Group Operations ────────────────────────────────────────

    /// Get a group by ID.
    pub async fn get_group(&self, group_id: &str) -> Result<Option<Group>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::GROUPS)
            .obj()
            .one(group_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the membership roster of a group, ordered by user ID.
    pub async fn get_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, AppError> {
        let group_id = group_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::GROUP_MEMBERS)
            .filter(move |q| q.for_all([q.field("group_id").eq(group_id.clone())]))
            .order_by([("user_id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a membership row (roster seeding for tests and tooling; the
    /// group directory owns this data in production).
    pub async fn upsert_group_member(&self, member: &GroupMember) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::GROUP_MEMBERS)
            .document_id(member_doc_id(&member.group_id, &member.user_id))
            .object(member)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Store a group record (test/tooling counterpart of the roster seed).
    pub async fn upsert_group(&self, group: &Group) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::GROUPS)
            .document_id(&group.id)
            .object(group)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Plan Operations ─────────────────────────────────────────

    /// Get a plan by ID.
    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PLANS)
            .obj()
            .one(plan_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a plan document.
    pub async fn set_plan(&self, plan: &Plan) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PLANS)
            .document_id(&plan.id)
            .object(plan)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get a group's plans with keyset pagination, newest planned date first.
    pub async fn get_plans_for_group(
        &self,
        group_id: &str,
        cursor: Option<PlanQueryCursor>,
        limit: u32,
    ) -> Result<Vec<Plan>, AppError> {
        let query = self.get_client()?.fluent().select().from(collections::PLANS);

        let group_id = group_id.to_string();
        let query = if let Some(cursor) = cursor {
            let before = cursor.planned_date;
            query.filter(move |q| {
                q.for_all([
                    q.field("group_id").eq(group_id.clone()),
                    q.field("planned_date").less_than(before),
                ])
            })
        } else {
            query.filter(move |q| q.for_all([q.field("group_id").eq(group_id.clone())]))
        };

        query
            .order_by([(
                "planned_date",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Participant Operations ──────────────────────────────────

    /// Get one participant row.
    pub async fn get_participant(
        &self,
        plan_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PLAN_PARTICIPANTS)
            .obj()
            .one(&participant_doc_id(plan_id, user_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store one participant row (last write wins; only the voting user
    /// mutates their own row, so no version check is needed).
    pub async fn set_participant(&self, participant: &Participant) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PLAN_PARTICIPANTS)
            .document_id(participant_doc_id(
                &participant.plan_id,
                &participant.user_id,
            ))
            .object(participant)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get all participants of a plan, ordered by user ID.
    pub async fn get_participants_for_plan(
        &self,
        plan_id: &str,
    ) -> Result<Vec<Participant>, AppError> {
        let plan_id = plan_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PLAN_PARTICIPANTS)
            .filter(move |q| q.for_all([q.field("plan_id").eq(plan_id.clone())]))
            .order_by([("user_id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a user's most recent confirmed-status participations, newest
    /// vote first. Feeds the consistency-bonus streak check.
    pub async fn get_recent_confirmed_participations(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Participant>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PLAN_PARTICIPANTS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("status").eq("confirmed"),
                ])
            })
            .order_by([("voted_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store the participant rows seeded at plan creation.
    ///
    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    pub async fn seed_participants(&self, participants: &[Participant]) -> Result<(), AppError> {
        stream::iter(participants.to_vec())
            .map(|participant| async move { self.set_participant(&participant).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    // ─── Atomic Plan Transitions ─────────────────────────────────

    /// Atomically request a plan status transition.
    ///
    /// The transition decision is made against the plan read inside the
    /// transaction, so "confirm only if still proposed" holds even when
    /// several voters cross the threshold at once: Firestore retries the
    /// transaction on conflict and only one caller observes `Applied`.
    ///
    /// Returns `AlreadyInTarget` (not an error) when the requested
    /// end-state already holds, and `Rejected` for an illegal transition;
    /// callers decide which of those to surface as a conflict.
    pub async fn transition_plan(
        &self,
        plan_id: &str,
        target: PlanStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read current plan state within the transaction so the write is
        // conditioned on fresh data, not on a prior read.
        let plan: Option<Plan> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PLANS)
            .obj()
            .one(plan_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read plan in transaction: {}", e))
            })?;

        let Some(mut plan) = plan else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("Plan {} not found", plan_id)));
        };

        let outcome = plan.request_transition(target, now);

        match outcome {
            TransitionOutcome::Applied => {
                self.get_client()?
                    .fluent()
                    .update()
                    .in_col(collections::PLANS)
                    .document_id(&plan.id)
                    .object(&plan)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add plan to transaction: {}", e))
                    })?;

                transaction
                    .commit()
                    .await
                    .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

                tracing::info!(plan_id, target = %target, "Plan transition applied");
            }
            TransitionOutcome::AlreadyInTarget => {
                let _ = transaction.rollback().await;
                tracing::debug!(plan_id, target = %target, "Plan already in target state");
            }
            TransitionOutcome::Rejected(from) => {
                let _ = transaction.rollback().await;
                tracing::debug!(plan_id, from = %from, target = %target, "Plan transition rejected");
            }
        }

        Ok(outcome)
    }

    // ─── Outcome Ledger ──────────────────────────────────────────

    /// Atomically apply one attendance outcome to one profile.
    ///
    /// The transaction checks the `outcome_ledger` record for this
    /// (plan, user) pair first and writes the ledger record together with
    /// the profile delta, so a retried completion is a no-op per pair.
    ///
    /// Returns `true` if the outcome was newly applied, `false` if it was
    /// already recorded (idempotent duplicate).
    pub async fn apply_outcome_atomic(
        &self,
        plan_id: &str,
        user_id: &str,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let doc_id = participant_doc_id(plan_id, user_id);

        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // 1. Idempotency check - if this pair was already scored, skip all writes
        let existing: Option<AppliedOutcome> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::OUTCOME_LEDGER)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read ledger in transaction: {}", e))
            })?;

        if existing.is_some() {
            tracing::debug!(
                plan_id,
                user_id,
                "Outcome already applied (idempotent skip)"
            );
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        // 2. Read the profile and apply the delta in memory
        let current: Option<Profile> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read profile in transaction: {}", e))
            })?;

        let mut profile = current.unwrap_or_else(|| Profile::new(user_id, user_id));
        profile.apply_outcome(outcome, now);

        let record = AppliedOutcome {
            plan_id: plan_id.to_string(),
            user_id: user_id.to_string(),
            outcome,
            score_delta: outcome.score_delta(),
            applied_at: now,
        };

        // 3. Write ledger record and profile together
        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::OUTCOME_LEDGER)
            .document_id(&doc_id)
            .object(&record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add ledger record to transaction: {}", e))
            })?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(user_id)
            .object(&profile)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add profile to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            plan_id,
            user_id,
            outcome = outcome.as_str(),
            score = profile.commitment_score,
            "Outcome applied"
        );

        Ok(true)
    }

    /// Check the user's recent check-in streak and award the consistency
    /// bonus when it qualifies.
    ///
    /// Returns the points actually awarded (0 without a full streak or at
    /// the score ceiling).
    pub async fn award_consistency_bonus(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, AppError> {
        let recent = self
            .get_recent_confirmed_participations(
                user_id,
                crate::models::profile::CONSISTENCY_WINDOW as u32,
            )
            .await?;

        let mut profile = self
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| Profile::new(user_id, user_id));

        let awarded = profile.award_consistency_bonus(&recent, now);
        if awarded == 0 {
            return Ok(0);
        }

        self.upsert_profile(&profile).await?;

        tracing::info!(
            user_id,
            awarded,
            score = profile.commitment_score,
            "Consistency bonus awarded"
        );

        Ok(awarded)
    }
}
