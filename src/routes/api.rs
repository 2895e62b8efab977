// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::firestore::PlanQueryCursor;
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{LeaderboardEntry, Participant, Plan, Profile, Vote, VoteCounts};
use crate::services::{CreatePlanRequest, EntityKind};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::{stream, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/push-token", put(put_push_token))
        .route("/api/plans", post(create_plan))
        .route("/api/plans/{plan_id}", get(get_plan))
        .route("/api/plans/{plan_id}/vote", post(cast_vote))
        .route("/api/plans/{plan_id}/checkin", post(check_in))
        .route("/api/plans/{plan_id}/complete", post(complete_plan))
        .route("/api/plans/{plan_id}/cancel", post(cancel_plan))
        .route("/api/plans/{plan_id}/remind", post(remind))
        .route("/api/groups/{group_id}/plans", get(get_group_plans))
        .route("/api/groups/{group_id}/leaderboard", get(get_leaderboard))
        .route("/api/changes/{entity}/{id}", get(change_stream))
}

// ─── Shared Response Shapes ──────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PlanResponse {
    pub id: String,
    pub event_id: String,
    pub group_id: String,
    pub created_by: String,
    pub status: String,
    pub planned_date: String,
    pub min_attendees: u32,
    pub confirmed_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.clone(),
            event_id: plan.event_id.clone(),
            group_id: plan.group_id.clone(),
            created_by: plan.created_by.clone(),
            status: plan.status.to_string(),
            planned_date: format_utc_rfc3339(plan.planned_date),
            min_attendees: plan.min_attendees,
            confirmed_at: plan.confirmed_at.map(format_utc_rfc3339),
            completed_at: plan.completed_at.map(format_utc_rfc3339),
            cancelled_at: plan.cancelled_at.map(format_utc_rfc3339),
            created_at: format_utc_rfc3339(plan.created_at),
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub vote: Option<String>,
    pub status: String,
    pub checked_in: bool,
    pub voted_at: Option<String>,
    pub checked_in_at: Option<String>,
}

impl From<&Participant> for ParticipantResponse {
    fn from(p: &Participant) -> Self {
        Self {
            user_id: p.user_id.clone(),
            vote: p.vote.map(|v| {
                match v {
                    Vote::Yes => "yes",
                    Vote::Maybe => "maybe",
                    Vote::No => "no",
                }
                .to_string()
            }),
            status: p.status.as_str().to_string(),
            checked_in: p.checked_in,
            voted_at: p.voted_at.map(format_utc_rfc3339),
            checked_in_at: p.checked_in_at.map(format_utc_rfc3339),
        }
    }
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    pub user_id: String,
    pub display_name: String,
    pub commitment_score: i32,
    pub total_attended: u32,
    pub total_flaked: u32,
    pub attendance_rate: u32,
    pub has_push_token: bool,
}

impl From<&Profile> for ProfileResponse {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            commitment_score: profile.commitment_score,
            total_attended: profile.total_attended,
            total_flaked: profile.total_flaked,
            attendance_rate: profile.attendance_rate(),
            has_push_token: profile.push_token.is_some(),
        }
    }
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>> {
    let profile = state.db.get_profile(&user.user_id).await?.ok_or_else(|| {
        crate::error::AppError::NotFound(format!("Profile {} not found", user.user_id))
    })?;

    Ok(Json(ProfileResponse::from(&profile)))
}

#[derive(Deserialize)]
struct PushTokenBody {
    /// Device token from the push gateway; null unregisters the device
    push_token: Option<String>,
}

/// Register (or clear) the caller's device push token.
///
/// The push token is the one profile field not owned by the scoring
/// ledger, so a plain read-modify-write is fine here.
async fn put_push_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PushTokenBody>,
) -> Result<Json<ProfileResponse>> {
    let mut profile = state
        .db
        .get_profile(&user.user_id)
        .await?
        .unwrap_or_else(|| Profile::new(&user.user_id, &user.user_id));

    profile.push_token = body.push_token;
    state.db.upsert_profile(&profile).await?;

    tracing::debug!(user_id = %user.user_id, registered = profile.push_token.is_some(), "Push token updated");

    Ok(Json(ProfileResponse::from(&profile)))
}

// ─── Plans ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct CreatePlanBody {
    #[validate(length(min = 1, max = 128))]
    event_id: String,
    #[validate(length(min = 1, max = 128))]
    group_id: String,
    /// Yes-votes needed before the plan auto-confirms
    #[validate(range(min = 2, max = 6))]
    min_attendees: u32,
    /// RFC3339 datetime of the meetup
    planned_date: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PlanDetailResponse {
    pub plan: PlanResponse,
    pub participants: Vec<ParticipantResponse>,
    pub counts: VoteCounts,
}

fn parse_planned_date(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|_| {
            crate::error::AppError::BadRequest(
                "Invalid 'planned_date': must be RFC3339 datetime".to_string(),
            )
        })
}

/// Propose a plan for a group.
async fn create_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreatePlanBody>,
) -> Result<Json<PlanDetailResponse>> {
    body.validate()
        .map_err(|e| crate::error::AppError::BadRequest(e.to_string()))?;

    let planned_date = parse_planned_date(&body.planned_date)?;

    let (plan, participants) = state
        .plans
        .create_plan(CreatePlanRequest {
            event_id: body.event_id,
            group_id: body.group_id,
            created_by: user.user_id,
            min_attendees: body.min_attendees,
            planned_date,
        })
        .await?;

    let counts = VoteCounts::tally(&participants);

    Ok(Json(PlanDetailResponse {
        plan: PlanResponse::from(&plan),
        participants: participants.iter().map(ParticipantResponse::from).collect(),
        counts,
    }))
}

/// Get a plan with its participants and live vote counts.
async fn get_plan(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanDetailResponse>> {
    let plan = state
        .db
        .get_plan(&plan_id)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("Plan {} not found", plan_id)))?;

    let participants = state.db.get_participants_for_plan(&plan_id).await?;
    let counts = VoteCounts::tally(&participants);

    Ok(Json(PlanDetailResponse {
        plan: PlanResponse::from(&plan),
        participants: participants.iter().map(ParticipantResponse::from).collect(),
        counts,
    }))
}

// ─── Voting ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct VoteBody {
    /// "yes", "maybe" or "no"
    vote: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct VoteResponse {
    pub plan: PlanResponse,
    pub participants: Vec<ParticipantResponse>,
    pub counts: VoteCounts,
    pub auto_confirmed: bool,
}

/// Cast or change the caller's vote on a plan.
async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
    Json(body): Json<VoteBody>,
) -> Result<Json<VoteResponse>> {
    let vote: Vote = body.vote.parse().map_err(|_| {
        crate::error::AppError::BadRequest(format!(
            "Invalid vote '{}': must be yes, maybe or no",
            body.vote
        ))
    })?;

    let outcome = state.plans.cast_vote(&plan_id, &user.user_id, vote).await?;

    Ok(Json(VoteResponse {
        plan: PlanResponse::from(&outcome.plan),
        participants: outcome
            .participants
            .iter()
            .map(ParticipantResponse::from)
            .collect(),
        counts: outcome.counts,
        auto_confirmed: outcome.auto_confirmed,
    }))
}

// ─── Check-in / Completion / Cancellation ────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CheckInResponse {
    pub checked_in: bool,
}

/// Mark the caller present at a confirmed plan's venue.
async fn check_in(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
) -> Result<Json<CheckInResponse>> {
    let checked_in = state.plans.check_in(&plan_id, &user.user_id).await?;
    Ok(Json(CheckInResponse { checked_in }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CompletionResponse {
    pub total_attended: u32,
    pub total_no_shows: u32,
}

/// Finalize a confirmed plan and score attendance. Retry-safe.
async fn complete_plan(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
) -> Result<Json<CompletionResponse>> {
    let summary = state.plans.complete_plan(&plan_id).await?;

    Ok(Json(CompletionResponse {
        total_attended: summary.total_attended,
        total_no_shows: summary.total_no_shows,
    }))
}

/// Cancel a plan (creator only; no scoring effect).
async fn cancel_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanResponse>> {
    let plan = state.plans.cancel_plan(&plan_id, &user.user_id).await?;
    Ok(Json(PlanResponse::from(&plan)))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RemindResponse {
    pub sent: u32,
    pub failed: u32,
}

/// Nudge undecided (proposed) or not-yet-arrived (confirmed) participants.
async fn remind(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(plan_id): Path<String>,
) -> Result<Json<RemindResponse>> {
    let summary = state.plans.remind(&plan_id, &user.user_id).await?;
    Ok(Json(RemindResponse {
        sent: summary.sent,
        failed: summary.failed,
    }))
}

// ─── Group Plan Listing ──────────────────────────────────────

#[derive(Deserialize)]
struct GroupPlansQuery {
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    20
}

const MAX_PER_PAGE: u32 = 100;
const CURSOR_PARTS: usize = 2;

fn parse_cursor(cursor: Option<&str>) -> Result<Option<PlanQueryCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor =
                || crate::error::AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let parts: Vec<&str> = decoded_str.split(':').collect();
            if parts.len() != CURSOR_PARTS {
                return Err(invalid_cursor());
            }

            let seconds = parts[0].parse::<i64>().map_err(|_| invalid_cursor())?;
            let nanos = parts[1].parse::<u32>().map_err(|_| invalid_cursor())?;
            let planned_date =
                chrono::DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid_cursor)?;

            Ok(PlanQueryCursor { planned_date })
        })
        .transpose()
}

fn encode_cursor(cursor: PlanQueryCursor) -> String {
    let payload = format!(
        "{}:{}",
        cursor.planned_date.timestamp(),
        cursor.planned_date.timestamp_subsec_nanos()
    );
    URL_SAFE_NO_PAD.encode(payload)
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GroupPlansResponse {
    pub plans: Vec<PlanResponse>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

/// List a group's plans, newest planned date first.
async fn get_group_plans(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
    Query(params): Query<GroupPlansQuery>,
) -> Result<Json<GroupPlansResponse>> {
    tracing::debug!(
        user_id = %user.user_id,
        group_id = %group_id,
        cursor = ?params.cursor,
        "Fetching group plans"
    );

    let limit = params.per_page.min(MAX_PER_PAGE);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    // Fetch one extra item to determine if another page is available.
    let fetch_limit = limit.saturating_add(1);
    let mut plans = state
        .db
        .get_plans_for_group(&group_id, cursor, fetch_limit)
        .await?;

    let has_more = plans.len() > limit as usize;
    if has_more {
        plans.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        plans.last().map(|p| {
            encode_cursor(PlanQueryCursor {
                planned_date: p.planned_date,
            })
        })
    } else {
        None
    };

    Ok(Json(GroupPlansResponse {
        plans: plans.iter().map(PlanResponse::from).collect(),
        per_page: limit,
        next_cursor,
    }))
}

// ─── Leaderboard ─────────────────────────────────────────────

/// Get the ranked standings for a group.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    tracing::debug!(user_id = %user.user_id, group_id = %group_id, "Fetching leaderboard");

    let entries = state.plans.leaderboard(&group_id).await?;
    Ok(Json(entries))
}

// ─── Change Feed ─────────────────────────────────────────────

/// Subscribe to change events for one entity over SSE.
///
/// Events are typed {entity, id, op}; a lagging client just misses events
/// and refetches, so lag is skipped rather than treated as an error.
async fn change_stream(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let entity: EntityKind = entity.parse().map_err(|_| {
        crate::error::AppError::BadRequest(format!(
            "Unknown entity type '{}': must be plan, group or profile",
            entity
        ))
    })?;

    let rx = state.changes.subscribe(entity, &id);

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default().json_data(&event).ok()?;
                    return Some((Ok::<_, Infallible>(sse), rx));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
