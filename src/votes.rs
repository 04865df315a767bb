//! # Votes — Toggle State Machine and Net Score
//!
//! Each (voter, votable) pair holds at most one vote of +1 or -1. Casting a
//! value moves the pair through [`transition`]:
//!
//! | Existing | Cast | Result | Action |
//! |----------|------|--------|--------|
//! | none | v | v | `cast` |
//! | v | v | none | `retracted` |
//! | v | -v | -v | `changed` |
//!
//! Casting the same value twice retracts it. Scores are never stored: a
//! votable's net score is [`net_score`] over its live vote rows, recomputed
//! on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{PetnetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    /// Accepts only +1 and -1; "no vote" is expressed by casting the same value again.
    pub fn from_i64(value: i64) -> Result<VoteValue> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(PetnetError::invalid(format!(
                "vote value must be 1 or -1, got {}",
                other
            ))),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = PetnetError;

    fn try_from(value: i16) -> Result<Self> {
        VoteValue::from_i64(i64::from(value))
    }
}

impl Serialize for VoteValue {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i16(self.as_i16())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Cast,
    Changed,
    Retracted,
}

impl VoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteAction::Cast => "cast",
            VoteAction::Changed => "changed",
            VoteAction::Retracted => "retracted",
        }
    }
}

/// Next stored vote for a pair, given what is stored and what was cast.
pub fn transition(existing: Option<VoteValue>, cast: VoteValue) -> (VoteAction, Option<VoteValue>) {
    match existing {
        None => (VoteAction::Cast, Some(cast)),
        Some(v) if v == cast => (VoteAction::Retracted, None),
        Some(_) => (VoteAction::Changed, Some(cast)),
    }
}

/// Upvotes minus downvotes.
pub fn net_score<I>(values: I) -> i64
where
    I: IntoIterator<Item = VoteValue>,
{
    values.into_iter().map(|v| i64::from(v.as_i16())).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotableKind {
    Post,
    Comment,
    Submission,
}

impl VotableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotableKind::Post => "post",
            VotableKind::Comment => "comment",
            VotableKind::Submission => "submission",
        }
    }

    pub fn parse(s: &str) -> Option<VotableKind> {
        match s {
            "post" => Some(VotableKind::Post),
            "comment" => Some(VotableKind::Comment),
            "submission" => Some(VotableKind::Submission),
            _ => None,
        }
    }
}

impl fmt::Display for VotableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A votable entity as resolved by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotableRef {
    pub id: Uuid,
    pub kind: VotableKind,
    /// Voting window of the owning weekly challenge, for submissions.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl VotableRef {
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.window {
            Some((starts_at, ends_at)) => starts_at <= now && now < ends_at,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub votable_id: Uuid,
    pub action: VoteAction,
    /// The vote now stored for the caller, if any.
    pub value: Option<VoteValue>,
    pub score: i64,
}
