// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan participant model: one row per group member, seeded at plan
//! creation, carrying that member's vote and attendance state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant's vote on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Yes,
    Maybe,
    No,
}

impl Vote {
    /// Fixed vote→status mapping: yes→confirmed, no→declined, maybe→maybe.
    pub fn participant_status(self) -> ParticipantStatus {
        match self {
            Vote::Yes => ParticipantStatus::Confirmed,
            Vote::Maybe => ParticipantStatus::Maybe,
            Vote::No => ParticipantStatus::Declined,
        }
    }
}

impl std::str::FromStr for Vote {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Vote::Yes),
            "maybe" => Ok(Vote::Maybe),
            "no" => Ok(Vote::No),
            _ => Err(()),
        }
    }
}

/// Derived participation status. `pending` until a vote is cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Confirmed,
    Declined,
    Maybe,
    Pending,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Confirmed => "confirmed",
            ParticipantStatus::Declined => "declined",
            ParticipantStatus::Maybe => "maybe",
            ParticipantStatus::Pending => "pending",
        }
    }
}

/// Stored participant record (document ID: `{plan_id}_{user_id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub plan_id: String,
    pub user_id: String,
    /// Unset until the member votes
    pub vote: Option<Vote>,
    /// Always derived from `vote` via the fixed mapping
    pub status: ParticipantStatus,
    /// Set when the member checks in at the venue
    pub checked_in: bool,
    pub voted_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Fresh pending row, seeded at plan creation.
    pub fn seeded(plan_id: &str, user_id: &str) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            user_id: user_id.to_string(),
            vote: None,
            status: ParticipantStatus::Pending,
            checked_in: false,
            voted_at: None,
            checked_in_at: None,
        }
    }

    /// Overwrite the vote (last write wins) and re-derive status.
    ///
    /// Returns `false` without touching anything when the vote is identical
    /// to the current one, keeping repeated submissions idempotent.
    pub fn apply_vote(&mut self, vote: Vote, now: DateTime<Utc>) -> bool {
        if self.vote == Some(vote) {
            return false;
        }
        self.vote = Some(vote);
        self.status = vote.participant_status();
        self.voted_at = Some(now);
        true
    }
}

/// Aggregate vote counts over all participants of a plan.
///
/// Always recomputed in full from the participant rows rather than
/// incremented, so concurrent writers cannot drift the counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct VoteCounts {
    pub yes: u32,
    pub maybe: u32,
    pub no: u32,
    pub pending: u32,
}

impl VoteCounts {
    /// Full recomputation over a plan's participants.
    pub fn tally(participants: &[Participant]) -> Self {
        let mut counts = VoteCounts::default();
        for p in participants {
            match p.vote {
                Some(Vote::Yes) => counts.yes += 1,
                Some(Vote::Maybe) => counts.maybe += 1,
                Some(Vote::No) => counts.no += 1,
                None => counts.pending += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_status_mapping() {
        assert_eq!(Vote::Yes.participant_status(), ParticipantStatus::Confirmed);
        assert_eq!(Vote::No.participant_status(), ParticipantStatus::Declined);
        assert_eq!(Vote::Maybe.participant_status(), ParticipantStatus::Maybe);
    }

    #[test]
    fn test_seeded_participant_is_pending() {
        let p = Participant::seeded("plan-1", "user-1");
        assert_eq!(p.status, ParticipantStatus::Pending);
        assert!(p.vote.is_none());
        assert!(!p.checked_in);
    }

    #[test]
    fn test_apply_vote_overwrites_and_rederives() {
        let now = Utc::now();
        let mut p = Participant::seeded("plan-1", "user-1");

        assert!(p.apply_vote(Vote::Maybe, now));
        assert_eq!(p.status, ParticipantStatus::Maybe);
        assert_eq!(p.voted_at, Some(now));

        let later = now + chrono::Duration::minutes(5);
        assert!(p.apply_vote(Vote::Yes, later));
        assert_eq!(p.status, ParticipantStatus::Confirmed);
        assert_eq!(p.voted_at, Some(later));
    }

    #[test]
    fn test_identical_vote_is_idempotent() {
        let now = Utc::now();
        let mut p = Participant::seeded("plan-1", "user-1");
        p.apply_vote(Vote::Yes, now);

        let later = now + chrono::Duration::minutes(5);
        assert!(!p.apply_vote(Vote::Yes, later));
        // voted_at not bumped by the duplicate
        assert_eq!(p.voted_at, Some(now));
    }

    #[test]
    fn test_tally_counts_all_buckets() {
        let now = Utc::now();
        let mut participants: Vec<Participant> = (0..5)
            .map(|i| Participant::seeded("plan-1", &format!("user-{}", i)))
            .collect();

        participants[0].apply_vote(Vote::Yes, now);
        participants[1].apply_vote(Vote::Yes, now);
        participants[2].apply_vote(Vote::No, now);
        participants[3].apply_vote(Vote::Maybe, now);
        // participants[4] never votes

        let counts = VoteCounts::tally(&participants);
        assert_eq!(
            counts,
            VoteCounts {
                yes: 2,
                maybe: 1,
                no: 1,
                pending: 1
            }
        );
    }

    #[test]
    fn test_tally_recompute_matches_after_vote_change() {
        let now = Utc::now();
        let mut participants = vec![
            Participant::seeded("plan-1", "a"),
            Participant::seeded("plan-1", "b"),
        ];
        participants[0].apply_vote(Vote::Yes, now);
        participants[1].apply_vote(Vote::Yes, now);

        // One member changes their mind; the recount reflects only the
        // final state, no residue from the earlier vote.
        participants[1].apply_vote(Vote::No, now);
        let counts = VoteCounts::tally(&participants);
        assert_eq!(counts.yes, 1);
        assert_eq!(counts.no, 1);
        assert_eq!(counts.pending, 0);
    }
}
