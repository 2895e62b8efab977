// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan lifecycle service.
//!
//! Handles the core workflow:
//! 1. Create a plan and seed participants from the group roster
//! 2. Record votes and recompute aggregate counts
//! 3. Auto-confirm once yes-votes reach the plan's threshold
//! 4. Record check-ins at the venue
//! 5. Complete the plan, scoring every committed participant once
//!
//! Every state change commits before its notification fan-out runs; push
//! failures never roll a transition back.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{
    leaderboard, LeaderboardEntry, NotificationKind, Outcome, Participant, ParticipantStatus,
    Plan, PlanStatus, TransitionOutcome, Vote, VoteCounts,
};
use crate::services::push::{DispatchSummary, PushRecipient, PushService};
use crate::services::realtime::{ChangeFeed, ChangeOp, EntityKind};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use std::sync::Arc;

/// Profile rows are disjoint, so completion scoring can run them together.
const MAX_CONCURRENT_SCORING: usize = 10;

/// Inputs for proposing a plan.
#[derive(Debug, Clone)]
pub struct CreatePlanRequest {
    pub event_id: String,
    pub group_id: String,
    pub created_by: String,
    pub min_attendees: u32,
    pub planned_date: DateTime<Utc>,
}

/// Result of casting a vote.
#[derive(Debug)]
pub struct VoteOutcome {
    pub plan: Plan,
    pub participants: Vec<Participant>,
    pub counts: VoteCounts,
    /// True only for the vote that won the proposed→confirmed transition
    pub auto_confirmed: bool,
}

/// Attendance totals reported by plan completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionSummary {
    pub total_attended: u32,
    pub total_no_shows: u32,
}

/// Map a committed participant's check-in flag to their scored outcome.
fn outcome_for(checked_in: bool) -> Outcome {
    if checked_in {
        Outcome::Attended
    } else {
        Outcome::NoShow
    }
}

/// Attendance totals over the committed participants of a plan, derived
/// from check-in flags alone so a retried completion reports the same
/// numbers it reported the first time.
fn summarize_attendance(committed: &[Participant]) -> CompletionSummary {
    let total_attended = committed.iter().filter(|p| p.checked_in).count() as u32;
    CompletionSummary {
        total_attended,
        total_no_shows: committed.len() as u32 - total_attended,
    }
}

/// Participants whose derived status matches `status`.
fn with_status(participants: &[Participant], status: ParticipantStatus) -> Vec<Participant> {
    participants
        .iter()
        .filter(|p| p.status == status)
        .cloned()
        .collect()
}

/// Drive plans through their lifecycle.
pub struct PlanService {
    db: FirestoreDb,
    push: Arc<PushService>,
    changes: Arc<ChangeFeed>,
}

impl PlanService {
    pub fn new(db: FirestoreDb, push: Arc<PushService>, changes: Arc<ChangeFeed>) -> Self {
        Self { db, push, changes }
    }

    /// Propose a plan and seed one pending participant per current group
    /// member. Later roster changes never touch the seeded set.
    pub async fn create_plan(&self, req: CreatePlanRequest) -> Result<(Plan, Vec<Participant>)> {
        let group = self
            .db
            .get_group(&req.group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", req.group_id)))?;

        let members = self.db.get_group_members(&req.group_id).await?;
        if !members.iter().any(|m| m.user_id == req.created_by) {
            return Err(AppError::BadRequest(
                "Plan creator is not a member of the group".to_string(),
            ));
        }

        let now = Utc::now();
        let plan = Plan {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: req.event_id,
            group_id: req.group_id,
            created_by: req.created_by,
            status: PlanStatus::Proposed,
            planned_date: req.planned_date,
            min_attendees: req.min_attendees,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
        };

        let participants: Vec<Participant> = members
            .iter()
            .map(|m| Participant::seeded(&plan.id, &m.user_id))
            .collect();

        self.db.set_plan(&plan).await?;
        self.db.seed_participants(&participants).await?;

        tracing::info!(
            plan_id = %plan.id,
            group_id = %plan.group_id,
            participants = participants.len(),
            min_attendees = plan.min_attendees,
            "Plan created"
        );

        self.changes
            .publish(EntityKind::Plan, &plan.id, ChangeOp::Created);
        self.changes
            .publish(EntityKind::Group, &plan.group_id, ChangeOp::Updated);

        // Invite everyone except the creator; delivery failures are logged
        // inside the fan-out and never fail plan creation.
        let invitees: Vec<Participant> = participants
            .iter()
            .filter(|p| p.user_id != plan.created_by)
            .cloned()
            .collect();
        let recipients = self.recipients_for(&invitees).await?;
        self.push
            .notify(NotificationKind::PlanInvite, &plan.id, &group.name, &recipients)
            .await;

        Ok((plan, participants))
    }

    /// Record a participant's vote and evaluate auto-confirmation.
    pub async fn cast_vote(&self, plan_id: &str, user_id: &str, vote: Vote) -> Result<VoteOutcome> {
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        if plan.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Plan is {}, votes are closed",
                plan.status
            )));
        }

        let mut participant = self.db.get_participant(plan_id, user_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("User {} is not a participant of this plan", user_id))
        })?;

        // Identical repeat votes change nothing; skip the write so voted_at
        // keeps the original submission time.
        if participant.apply_vote(vote, Utc::now()) {
            self.db.set_participant(&participant).await?;
            self.changes
                .publish(EntityKind::Plan, plan_id, ChangeOp::Updated);
        }

        // Full recount over all rows rather than an increment, so counts
        // cannot drift under concurrent voters.
        let participants = self.db.get_participants_for_plan(plan_id).await?;
        let counts = VoteCounts::tally(&participants);

        let auto_confirmed = self
            .evaluate_auto_confirmation(&plan, &participants, counts)
            .await?;

        // Re-read so the response carries the stamped confirmation if any
        // caller (us or a racing voter) just applied it.
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        Ok(VoteOutcome {
            plan,
            participants,
            counts,
            auto_confirmed,
        })
    }

    /// Confirm the plan once yes-votes reach the threshold.
    ///
    /// The store applies the transition only if the plan is still proposed
    /// at the moment of update, so concurrent voters crossing the threshold
    /// produce exactly one confirmation; losers skip the fan-out.
    async fn evaluate_auto_confirmation(
        &self,
        plan: &Plan,
        participants: &[Participant],
        counts: VoteCounts,
    ) -> Result<bool> {
        if plan.status != PlanStatus::Proposed || counts.yes < plan.min_attendees {
            return Ok(false);
        }

        let outcome = self
            .db
            .transition_plan(&plan.id, PlanStatus::Confirmed, Utc::now())
            .await?;

        if outcome != TransitionOutcome::Applied {
            tracing::debug!(
                plan_id = %plan.id,
                "Lost confirmation race, skipping notification"
            );
            return Ok(false);
        }

        tracing::info!(
            plan_id = %plan.id,
            yes = counts.yes,
            min_attendees = plan.min_attendees,
            "Plan auto-confirmed"
        );

        self.changes
            .publish(EntityKind::Plan, &plan.id, ChangeOp::Updated);

        let group_name = self.group_name(&plan.group_id).await;
        let committed = with_status(participants, ParticipantStatus::Confirmed);
        let recipients = self.recipients_for(&committed).await?;
        self.push
            .notify(
                NotificationKind::PlanConfirmed,
                &plan.id,
                &group_name,
                &recipients,
            )
            .await;

        Ok(true)
    }

    /// Mark a participant present at the venue. Idempotent.
    pub async fn check_in(&self, plan_id: &str, user_id: &str) -> Result<bool> {
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        if plan.status != PlanStatus::Confirmed {
            return Err(AppError::Conflict(format!(
                "Check-in is only open on confirmed plans (plan is {})",
                plan.status
            )));
        }

        let mut participant = self.db.get_participant(plan_id, user_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("User {} is not a participant of this plan", user_id))
        })?;

        if participant.checked_in {
            return Ok(true);
        }

        participant.checked_in = true;
        participant.checked_in_at = Some(Utc::now());
        self.db.set_participant(&participant).await?;

        tracing::info!(plan_id, user_id, "Participant checked in");
        self.changes
            .publish(EntityKind::Plan, plan_id, ChangeOp::Updated);

        Ok(true)
    }

    /// Complete a confirmed plan: score every committed participant once
    /// and finalize the status.
    ///
    /// Safe to retry after a partial failure: each (plan, user) delta is
    /// guarded by the outcome ledger, and the final transition treats an
    /// already-completed plan as a no-op.
    pub async fn complete_plan(&self, plan_id: &str) -> Result<CompletionSummary> {
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        match plan.status {
            PlanStatus::Confirmed => {}
            // Retry path: re-run the (idempotent) scoring loop in case an
            // earlier call crashed between scoring and reporting.
            PlanStatus::Completed => {}
            other => {
                return Err(AppError::Conflict(format!(
                    "Cannot complete a {} plan",
                    other
                )));
            }
        }

        let participants = self.db.get_participants_for_plan(plan_id).await?;
        let committed = with_status(&participants, ParticipantStatus::Confirmed);
        let summary = summarize_attendance(&committed);
        let now = Utc::now();

        // Each participant's delta touches a disjoint profile row, so the
        // ledger applications run concurrently; the ledger makes each one
        // exactly-once across retries.
        let scoring_work: Vec<(String, Outcome)> = committed
            .iter()
            .map(|p| (p.user_id.clone(), outcome_for(p.checked_in)))
            .collect();
        let applied: Vec<(String, Outcome, bool)> = stream::iter(scoring_work.into_iter())
            .map(|(user_id, outcome)| {
                async move {
                    let newly_applied = self
                        .db
                        .apply_outcome_atomic(plan_id, &user_id, outcome, now)
                        .await?;
                    Ok::<_, AppError>((user_id, outcome, newly_applied))
                }
            })
            .buffer_unordered(MAX_CONCURRENT_SCORING)
            .collect::<Vec<Result<(String, Outcome, bool)>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        // Streak bonus only for freshly-scored attendees, so a retried
        // completion cannot award it twice.
        for (user_id, outcome, newly_applied) in &applied {
            if *newly_applied && *outcome == Outcome::Attended {
                self.db.award_consistency_bonus(user_id, now).await?;
            }
        }

        let outcome = self
            .db
            .transition_plan(plan_id, PlanStatus::Completed, now)
            .await?;

        match outcome {
            TransitionOutcome::Applied => {
                tracing::info!(
                    plan_id,
                    attended = summary.total_attended,
                    no_shows = summary.total_no_shows,
                    "Plan completed"
                );

                self.changes
                    .publish(EntityKind::Plan, plan_id, ChangeOp::Updated);

                let group_name = self.group_name(&plan.group_id).await;
                let recipients = self.recipients_for(&committed).await?;
                self.push
                    .notify(
                        NotificationKind::PlanCompleted,
                        plan_id,
                        &group_name,
                        &recipients,
                    )
                    .await;
            }
            TransitionOutcome::AlreadyInTarget => {
                tracing::debug!(plan_id, "Plan already completed (retry)");
            }
            TransitionOutcome::Rejected(from) => {
                return Err(AppError::Conflict(format!(
                    "Cannot complete a {} plan",
                    from
                )));
            }
        }

        Ok(summary)
    }

    /// Cancel a plan. Terminal, creator-only, no scoring effect.
    pub async fn cancel_plan(&self, plan_id: &str, user_id: &str) -> Result<Plan> {
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        if plan.created_by != user_id {
            return Err(AppError::BadRequest(
                "Only the plan creator can cancel it".to_string(),
            ));
        }

        match self
            .db
            .transition_plan(plan_id, PlanStatus::Cancelled, Utc::now())
            .await?
        {
            TransitionOutcome::Applied => {
                tracing::info!(plan_id, "Plan cancelled");
                self.changes
                    .publish(EntityKind::Plan, plan_id, ChangeOp::Updated);
            }
            TransitionOutcome::AlreadyInTarget => {}
            TransitionOutcome::Rejected(from) => {
                return Err(AppError::Conflict(format!("Cannot cancel a {} plan", from)));
            }
        }

        self.db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))
    }

    /// Nudge participants, creator-only. On a proposed plan, reminds
    /// members who haven't committed; on a confirmed plan, tells committed
    /// members check-in is open. Pure fan-out, no state change.
    pub async fn remind(&self, plan_id: &str, user_id: &str) -> Result<DispatchSummary> {
        let plan = self
            .db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", plan_id)))?;

        if plan.created_by != user_id {
            return Err(AppError::BadRequest(
                "Only the plan creator can send reminders".to_string(),
            ));
        }

        let participants = self.db.get_participants_for_plan(plan_id).await?;
        let (kind, targets) = match plan.status {
            PlanStatus::Proposed => {
                let mut undecided = with_status(&participants, ParticipantStatus::Pending);
                undecided.extend(with_status(&participants, ParticipantStatus::Maybe));
                (NotificationKind::PlanReminder, undecided)
            }
            PlanStatus::Confirmed => {
                let committed: Vec<Participant> =
                    with_status(&participants, ParticipantStatus::Confirmed)
                        .into_iter()
                        .filter(|p| !p.checked_in)
                        .collect();
                (NotificationKind::CheckInOpen, committed)
            }
            other => {
                return Err(AppError::Conflict(format!(
                    "Cannot send reminders for a {} plan",
                    other
                )));
            }
        };

        let group_name = self.group_name(&plan.group_id).await;
        let recipients = self.recipients_for(&targets).await?;
        Ok(self
            .push
            .notify(kind, plan_id, &group_name, &recipients)
            .await)
    }

    /// Ranked standings for a group.
    pub async fn leaderboard(&self, group_id: &str) -> Result<Vec<LeaderboardEntry>> {
        self.db
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))?;

        let members = self.db.get_group_members(group_id).await?;
        let user_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();
        let profiles = self.db.get_profiles(&user_ids).await?;

        Ok(leaderboard::rank_members(&profiles))
    }

    /// Resolve participants to push recipients via their profiles.
    async fn recipients_for(&self, participants: &[Participant]) -> Result<Vec<PushRecipient>> {
        let user_ids: Vec<String> = participants.iter().map(|p| p.user_id.clone()).collect();
        let profiles = self.db.get_profiles(&user_ids).await?;

        Ok(profiles
            .into_iter()
            .map(|profile| PushRecipient {
                user_id: profile.id,
                push_token: profile.push_token,
            })
            .collect())
    }

    /// Group name for notification copy; delivery must not fail on a
    /// missing group record.
    async fn group_name(&self, group_id: &str) -> String {
        match self.db.get_group(group_id).await {
            Ok(Some(group)) => group.name,
            _ => "your group".to_string(),
        }
    }
}
