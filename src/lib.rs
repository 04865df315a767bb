//! # Petnet — Pet Social Network Backend
//!
//! The gamification core (challenge catalog, progress tracking, vote tally,
//! leaderboard ranking) plus the CRUD surface around it, served over HTTP by
//! [`api`] and backed by PostgreSQL or an in-process store.
//!
//! Pure state transitions live in [`progress`], [`votes`] and [`leaderboard`];
//! [`service`] composes them with a [`store::Store`] and a [`clock::Clock`].

pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod media;
pub mod metrics;
pub mod progress;
pub mod service;
pub mod store;
pub mod votes;

pub use error::{PetnetError, Result};

/// XP per level.
pub const XP_PER_LEVEL: i64 = 100;

/// Level for an XP total: `floor(xp / 100) + 1`, so a fresh account or pet
/// is level 1. Used for both accounts and pets. Negative totals read as 0.
pub fn level_from_xp(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}
