//! # Leaderboard — Dense Ranking over Scored Entities
//!
//! Two scopes, never mixed:
//!
//! - [`Scope::Global`] ranks pets by their cumulative love count, regardless
//!   of any challenge.
//! - [`Scope::Challenge`] ranks submissions to the currently active weekly
//!   challenge by net vote score.
//!
//! Stores return candidates in insertion order; [`rank`] sorts them by
//! descending score with a stable sort, so equal scores keep insertion order,
//! and assigns 1-based dense ranks (`[5, 5, 3]` ranks as `[1, 1, 2]`). Ranks
//! are computed over the whole candidate list before `offset`/`limit` slice
//! it, so a page never restarts at rank 1.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Challenge,
}

/// A candidate before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub entity: T,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry<T> {
    pub entity: T,
    pub score: i64,
    pub rank: u32,
}

pub fn rank<T>(candidates: Vec<Scored<T>>, offset: usize, limit: usize) -> Vec<RankedEntry<T>> {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let mut current_rank = 0u32;
    let mut previous: Option<i64> = None;
    sorted
        .into_iter()
        .map(|c| {
            if previous != Some(c.score) {
                current_rank += 1;
                previous = Some(c.score);
            }
            RankedEntry {
                entity: c.entity,
                score: c.score,
                rank: current_rank,
            }
        })
        .skip(offset)
        .take(limit)
        .collect()
}
