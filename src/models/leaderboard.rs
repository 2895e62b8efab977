// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Group leaderboard derived from member commitment scores.

use serde::Serialize;

use crate::models::Profile;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Podium marker for the top three positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    /// Strictly positional 1..N; tied scores do not share a rank
    pub rank: u32,
    pub user_id: String,
    pub name: String,
    pub score: i32,
    pub attended: u32,
    pub flaked: u32,
    /// round(100 * attended / (attended + flaked)); 100 with no history
    pub attendance_rate: u32,
    pub medal: Option<Medal>,
}

/// Rank a snapshot of a group's member profiles.
///
/// Sort is stable on score descending, so members tied on score keep their
/// input order. Ranks are positional and the first three positions get
/// gold, silver, and bronze markers.
pub fn rank_members(profiles: &[Profile]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&Profile> = profiles.iter().collect();
    ordered.sort_by(|a, b| b.commitment_score.cmp(&a.commitment_score));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, profile)| {
            let rank = i as u32 + 1;
            let medal = match rank {
                1 => Some(Medal::Gold),
                2 => Some(Medal::Silver),
                3 => Some(Medal::Bronze),
                _ => None,
            };
            LeaderboardEntry {
                rank,
                user_id: profile.id.clone(),
                name: profile.display_name.clone(),
                score: profile.commitment_score,
                attended: profile.total_attended,
                flaked: profile.total_flaked,
                attendance_rate: profile.attendance_rate(),
                medal,
            }
        })
        .collect()
}
