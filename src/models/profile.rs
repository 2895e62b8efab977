//! User profile and commitment scoring policy.
//!
//! The commitment score is a 0–100 reliability measure adjusted by
//! attendance outcomes. `apply_outcome` and `award_consistency_bonus` are
//! the only writers of the score and its counters; everything else treats
//! profiles as read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Participant;

/// Score range bounds.
pub const SCORE_MIN: i32 = 0;
pub const SCORE_MAX: i32 = 100;
/// Score for a brand-new profile.
pub const SCORE_DEFAULT: i32 = 100;

/// Streak length the consistency bonus inspects.
pub const CONSISTENCY_WINDOW: usize = 5;
/// Bonus awarded for a full check-in streak.
pub const CONSISTENCY_BONUS: i32 = 5;

/// Attendance outcome applied by the scoring ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Attended,
    NoShow,
    CancelledLate,
    CancelledEarly,
}

impl Outcome {
    /// Signed score adjustment for this outcome.
    pub fn score_delta(self) -> i32 {
        match self {
            Outcome::Attended => 2,
            Outcome::NoShow => -10,
            Outcome::CancelledLate => -8,
            Outcome::CancelledEarly => -3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Attended => "attended",
            Outcome::NoShow => "no_show",
            Outcome::CancelledLate => "cancelled_late",
            Outcome::CancelledEarly => "cancelled_early",
        }
    }
}

/// User profile stored in Firestore (document ID: user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// User ID from the group directory (also used as document ID)
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Reliability score, clamped to [0, 100]
    pub commitment_score: i32,
    /// Plans attended (checked in at completion)
    pub total_attended: u32,
    /// Plans flaked (committed but absent at completion)
    pub total_flaked: u32,
    /// Device push token, absent until the app registers one
    pub push_token: Option<String>,
    /// Last ledger update
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Fresh profile with the default score and zeroed counters.
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            commitment_score: SCORE_DEFAULT,
            total_attended: 0,
            total_flaked: 0,
            push_token: None,
            updated_at: None,
        }
    }

    /// Apply one attendance outcome: adjust the score (clamped) and bump
    /// the matching counter.
    pub fn apply_outcome(&mut self, outcome: Outcome, now: DateTime<Utc>) {
        self.commitment_score =
            (self.commitment_score + outcome.score_delta()).clamp(SCORE_MIN, SCORE_MAX);
        match outcome {
            Outcome::Attended => self.total_attended += 1,
            Outcome::NoShow | Outcome::CancelledLate => self.total_flaked += 1,
            Outcome::CancelledEarly => {}
        }
        self.updated_at = Some(now);
    }

    /// Award the consistency bonus if the user's recent confirmed
    /// participations form a full check-in streak.
    ///
    /// `recent` must be the user's confirmed-status participations ordered
    /// most recent first. Returns the points awarded (0 or the bonus).
    pub fn award_consistency_bonus(&mut self, recent: &[Participant], now: DateTime<Utc>) -> i32 {
        if !has_consistency_streak(recent) {
            return 0;
        }
        let before = self.commitment_score;
        self.commitment_score = (self.commitment_score + CONSISTENCY_BONUS).clamp(SCORE_MIN, SCORE_MAX);
        self.updated_at = Some(now);
        self.commitment_score - before
    }

    /// Share of committed plans actually attended, as a 0–100 percentage.
    /// A profile with no history counts as fully reliable.
    pub fn attendance_rate(&self) -> u32 {
        let total = self.total_attended + self.total_flaked;
        if total == 0 {
            return 100;
        }
        ((100.0 * f64::from(self.total_attended)) / f64::from(total)).round() as u32
    }
}

/// All of the `CONSISTENCY_WINDOW` most recent confirmed participations
/// checked in. Fewer than a full window never qualifies.
pub fn has_consistency_streak(recent: &[Participant]) -> bool {
    recent.len() >= CONSISTENCY_WINDOW
        && recent[..CONSISTENCY_WINDOW].iter().all(|p| p.checked_in)
}

/// Ledger record of an outcome applied to one (plan, user) pair
/// (document ID: `{plan_id}_{user_id}`).
///
/// Written in the same transaction as the profile delta and checked before
/// every application, so a retried completion can never re-apply a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedOutcome {
    pub plan_id: String,
    pub user_id: String,
    pub outcome: Outcome,
    pub score_delta: i32,
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked_in_participant(plan: &str, checked_in: bool) -> Participant {
        let mut p = Participant::seeded(plan, "user-1");
        p.checked_in = checked_in;
        p
    }

    #[test]
    fn test_outcome_deltas() {
        assert_eq!(Outcome::Attended.score_delta(), 2);
        assert_eq!(Outcome::NoShow.score_delta(), -10);
        assert_eq!(Outcome::CancelledLate.score_delta(), -8);
        assert_eq!(Outcome::CancelledEarly.score_delta(), -3);
    }

    #[test]
    fn test_attended_bumps_score_and_counter() {
        let mut profile = Profile::new("user-1", "Sam");
        profile.commitment_score = 90;

        profile.apply_outcome(Outcome::Attended, Utc::now());

        assert_eq!(profile.commitment_score, 92);
        assert_eq!(profile.total_attended, 1);
        assert_eq!(profile.total_flaked, 0);
    }

    #[test]
    fn test_no_show_clamps_at_zero() {
        let mut profile = Profile::new("user-1", "Sam");
        profile.commitment_score = 5;

        profile.apply_outcome(Outcome::NoShow, Utc::now());

        assert_eq!(profile.commitment_score, 0, "5 - 10 clamps to 0, not -5");
        assert_eq!(profile.total_flaked, 1);
    }

    #[test]
    fn test_attended_clamps_at_hundred() {
        let mut profile = Profile::new("user-1", "Sam");
        assert_eq!(profile.commitment_score, SCORE_DEFAULT);

        profile.apply_outcome(Outcome::Attended, Utc::now());

        assert_eq!(profile.commitment_score, 100);
        assert_eq!(profile.total_attended, 1);
    }

    #[test]
    fn test_cancelled_late_counts_as_flake() {
        let mut profile = Profile::new("user-1", "Sam");
        profile.apply_outcome(Outcome::CancelledLate, Utc::now());

        assert_eq!(profile.commitment_score, 92);
        assert_eq!(profile.total_flaked, 1);
        assert_eq!(profile.total_attended, 0);
    }

    #[test]
    fn test_cancelled_early_touches_no_counter() {
        let mut profile = Profile::new("user-1", "Sam");
        profile.apply_outcome(Outcome::CancelledEarly, Utc::now());

        assert_eq!(profile.commitment_score, 97);
        assert_eq!(profile.total_attended, 0);
        assert_eq!(profile.total_flaked, 0);
    }

    #[test]
    fn test_consistency_streak_requires_full_window() {
        let four: Vec<Participant> = (0..4)
            .map(|i| checked_in_participant(&format!("plan-{}", i), true))
            .collect();
        assert!(!has_consistency_streak(&four));

        let five: Vec<Participant> = (0..5)
            .map(|i| checked_in_participant(&format!("plan-{}", i), true))
            .collect();
        assert!(has_consistency_streak(&five));
    }

    #[test]
    fn test_consistency_streak_broken_by_one_miss() {
        let mut recent: Vec<Participant> = (0..5)
            .map(|i| checked_in_participant(&format!("plan-{}", i), true))
            .collect();
        recent[2].checked_in = false;

        assert!(!has_consistency_streak(&recent));
    }

    #[test]
    fn test_consistency_bonus_awards_and_clamps() {
        let recent: Vec<Participant> = (0..5)
            .map(|i| checked_in_participant(&format!("plan-{}", i), true))
            .collect();

        let mut profile = Profile::new("user-1", "Sam");
        profile.commitment_score = 80;
        assert_eq!(profile.award_consistency_bonus(&recent, Utc::now()), 5);
        assert_eq!(profile.commitment_score, 85);

        // Near the ceiling only the clamped remainder is awarded
        profile.commitment_score = 98;
        assert_eq!(profile.award_consistency_bonus(&recent, Utc::now()), 2);
        assert_eq!(profile.commitment_score, 100);
    }

    #[test]
    fn test_consistency_bonus_zero_without_streak() {
        let recent = vec![checked_in_participant("plan-0", false)];
        let mut profile = Profile::new("user-1", "Sam");
        profile.commitment_score = 80;

        assert_eq!(profile.award_consistency_bonus(&recent, Utc::now()), 0);
        assert_eq!(profile.commitment_score, 80);
    }

    #[test]
    fn test_attendance_rate() {
        let mut profile = Profile::new("user-1", "Sam");
        assert_eq!(profile.attendance_rate(), 100, "no history counts as 100");

        profile.total_attended = 2;
        profile.total_flaked = 1;
        assert_eq!(profile.attendance_rate(), 67);

        profile.total_attended = 0;
        profile.total_flaked = 3;
        assert_eq!(profile.attendance_rate(), 0);
    }
}
