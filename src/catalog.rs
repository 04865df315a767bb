//! # Challenge Catalog — Static XP Challenge Definitions
//!
//! The catalog is compiled into the binary and shared read-only by every
//! request. Progress rows reference challenges by [`ChallengeDefinition::id`];
//! an id that is not in [`CATALOG`] is reported as `NotFound`.
//!
//! | Id | Cadence | Goal | XP |
//! |----|---------|------|----|
//! | `daily_post` | daily | 1 | 10 |
//! | `daily_love` | daily | 5 | 15 |
//! | `daily_comment` | daily | 3 | 15 |
//! | `daily_expand_petnet` | daily | 3 | 30 |
//! | `weekly_challenge_entry` | weekly | 1 | 50 |
//! | `weekly_votes` | weekly | 10 | 40 |
//! | `seasonal_pet_parent` | seasonal | 3 | 100 |
//!
//! `daily_expand_petnet` counts shares to distinct recipients: the same
//! recipient may only be counted once per calendar day.

use serde::Serialize;
use std::fmt;

/// How often a challenge's progress starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Seasonal,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Seasonal => "seasonal",
        }
    }

    /// Parse the column value stored alongside progress rows.
    pub fn parse(s: &str) -> Option<Cadence> {
        match s {
            "daily" => Some(Cadence::Daily),
            "weekly" => Some(Cadence::Weekly),
            "seasonal" => Some(Cadence::Seasonal),
            _ => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub cadence: Cadence,
    /// Progress needed to complete. Always > 0.
    pub goal: i32,
    pub xp_reward: i64,
    /// Each increment names a recipient, unique per (user, recipient, day).
    pub unique_recipient: bool,
}

pub const CATALOG: &[ChallengeDefinition] = &[
    ChallengeDefinition {
        id: "daily_post",
        title: "Share a moment from your pet's day",
        cadence: Cadence::Daily,
        goal: 1,
        xp_reward: 10,
        unique_recipient: false,
    },
    ChallengeDefinition {
        id: "daily_love",
        title: "Give love to 5 pets",
        cadence: Cadence::Daily,
        goal: 5,
        xp_reward: 15,
        unique_recipient: false,
    },
    ChallengeDefinition {
        id: "daily_comment",
        title: "Leave 3 comments",
        cadence: Cadence::Daily,
        goal: 3,
        xp_reward: 15,
        unique_recipient: false,
    },
    ChallengeDefinition {
        id: "daily_expand_petnet",
        title: "Share Petnet with 3 friends",
        cadence: Cadence::Daily,
        goal: 3,
        xp_reward: 30,
        unique_recipient: true,
    },
    ChallengeDefinition {
        id: "weekly_challenge_entry",
        title: "Enter this week's photo challenge",
        cadence: Cadence::Weekly,
        goal: 1,
        xp_reward: 50,
        unique_recipient: false,
    },
    ChallengeDefinition {
        id: "weekly_votes",
        title: "Vote on 10 challenge entries",
        cadence: Cadence::Weekly,
        goal: 10,
        xp_reward: 40,
        unique_recipient: false,
    },
    ChallengeDefinition {
        id: "seasonal_pet_parent",
        title: "Add 3 pets to your family",
        cadence: Cadence::Seasonal,
        goal: 3,
        xp_reward: 100,
        unique_recipient: false,
    },
];

/// Look up a challenge by id.
pub fn find(id: &str) -> Option<&'static ChallengeDefinition> {
    CATALOG.iter().find(|c| c.id == id)
}

/// All challenges, in catalog order.
pub fn all() -> &'static [ChallengeDefinition] {
    CATALOG
}
