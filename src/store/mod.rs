//! # Store — Persistence Collaborator
//!
//! The service layer talks to persistence only through the [`Store`] trait.
//! Two implementations ship:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx::PgPool`. Read-modify-write sequences
//!   run in a transaction holding a `pg_advisory_xact_lock` on the
//!   (user, challenge) or (voter, votable) key, so concurrent requests on the
//!   same key are serialized across processes.
//! - [`MemoryStore`]: a single-writer in-process store behind one mutex,
//!   used by `petnet serve --memory` and the test suites.
//!
//! Both call the same pure transition functions ([`crate::progress`],
//! [`crate::votes`]); a store only decides how rows are loaded, locked and
//! written.
//!
//! ## Tables
//!
//! - `users`: identity-provider subject, display name, role, `total_xp`
//! - `pets`: owner, profile fields, `xp`, `love_count`
//! - `challenge_progress`: one row per (user, challenge)
//! - `share_log`: (user, recipient, day) keys for the share challenge
//! - `barks`, `posts`, `comments`: forum content
//! - `weekly_challenges`, `submissions`: weekly photo challenge
//! - `votes`: one row per (voter, votable)
//! - `listings`: marketplace

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ChallengeDefinition;
use crate::error::Result;
use crate::progress::{ProgressState, ResetPolicy};
use crate::votes::{VotableRef, VoteOutcome, VoteValue};

// ── Accounts ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub display_name: Option<String>,
    pub role: String,
    pub total_xp: i64,
    pub created_at: DateTime<Utc>,
}

pub const ROLE_MEMBER: &str = "member";
pub const ROLE_ADMIN: &str = "admin";

// ── Pets ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PetRow {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub avatar_url: Option<String>,
    pub xp: i64,
    pub love_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPet {
    pub owner_id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub avatar_url: Option<String>,
}

// ── Challenge progress ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProgressRow {
    pub user_id: String,
    pub challenge_id: String,
    pub cadence: String,
    pub progress: i32,
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl ProgressRow {
    pub fn state(&self) -> ProgressState {
        ProgressState {
            progress: self.progress,
            completed: self.completed,
            last_updated: self.last_updated,
        }
    }
}

/// Per-day uniqueness key for challenges that count distinct recipients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareKey {
    pub recipient: String,
    pub day: NaiveDate,
}

/// One validated `recordProgress` call, ready to apply atomically.
#[derive(Debug, Clone)]
pub struct ProgressCommand<'a> {
    pub user_id: &'a str,
    pub challenge: &'static ChallengeDefinition,
    pub increment: i32,
    pub share: Option<ShareKey>,
    pub policy: ResetPolicy,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOutcome {
    pub challenge_id: String,
    pub progress: i32,
    pub goal: i32,
    pub completed: bool,
    /// XP credited by this call; non-zero only on the completion transition.
    pub xp_gained: i64,
    pub total_xp: i64,
    /// The stored daily progress was stale and restarted from zero.
    pub reset: bool,
}

// ── Barks, posts, comments ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BarkRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBark {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostRow {
    pub id: Uuid,
    pub author_id: String,
    pub bark_id: Option<Uuid>,
    pub body: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Net vote score at read time.
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: String,
    pub bark_id: Option<Uuid>,
    pub body: String,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub author_id: String,
    pub body: String,
}

// ── Weekly challenges ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyChallengeRow {
    pub id: Uuid,
    pub title: String,
    pub prompt: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WeeklyChallengeRow {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

#[derive(Debug, Clone)]
pub struct NewWeeklyChallenge {
    pub title: String,
    pub prompt: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRow {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub user_id: String,
    pub pet_id: Option<Uuid>,
    pub caption: String,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub challenge_id: Uuid,
    pub user_id: String,
    pub pet_id: Option<Uuid>,
    pub caption: String,
    pub media_url: String,
}

// ── Marketplace ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListingRow {
    pub id: Uuid,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
}

/// Fields a seller may change; `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub image_url: Option<String>,
    pub status: Option<ListingStatus>,
}

// ── Store trait ─────────────────────────────────────────────────

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    /// Create the account on first sight; later calls return it unchanged
    /// apart from filling in a missing display name.
    async fn ensure_user(&self, user_id: &str, display_name: Option<&str>) -> Result<UserRow>;
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRow>>;
    /// Returns false if the account does not exist.
    async fn set_user_role(&self, user_id: &str, role: &str) -> Result<bool>;

    async fn create_pet(&self, pet: NewPet) -> Result<PetRow>;
    async fn get_pet(&self, id: Uuid) -> Result<Option<PetRow>>;
    async fn list_pets(&self, owner_id: &str) -> Result<Vec<PetRow>>;
    /// Atomically add one to a pet's love count.
    async fn love_pet(&self, id: Uuid) -> Result<Option<PetRow>>;
    /// Every pet, in insertion order.
    async fn all_pets(&self) -> Result<Vec<PetRow>>;

    /// Apply one progress increment as a single serialized unit: share-key
    /// check, lazy reset, clamp, write, and the XP credit on completion.
    /// Fails with `NotFound` for an unknown account and `DuplicateAction` for
    /// a repeated share key, in both cases before anything is written.
    async fn record_progress(&self, cmd: &ProgressCommand<'_>) -> Result<ProgressOutcome>;
    async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressRow>>;

    /// Fails with `Conflict` when the slug is taken.
    async fn create_bark(&self, bark: NewBark) -> Result<BarkRow>;
    async fn get_bark(&self, id: Uuid) -> Result<Option<BarkRow>>;
    async fn list_barks(&self) -> Result<Vec<BarkRow>>;

    async fn create_post(&self, post: NewPost) -> Result<PostRow>;
    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>>;
    /// Newest first.
    async fn list_posts(&self, bark_id: Option<Uuid>, limit: usize) -> Result<Vec<PostRow>>;
    async fn create_comment(&self, comment: NewComment) -> Result<CommentRow>;
    /// Oldest first.
    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<CommentRow>>;

    async fn create_weekly_challenge(
        &self,
        challenge: NewWeeklyChallenge,
    ) -> Result<WeeklyChallengeRow>;
    async fn get_weekly_challenge(&self, id: Uuid) -> Result<Option<WeeklyChallengeRow>>;
    /// The challenge whose window contains `now`; the latest-starting one if
    /// windows overlap.
    async fn active_weekly_challenge(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyChallengeRow>>;
    async fn create_submission(&self, submission: NewSubmission) -> Result<SubmissionRow>;
    /// Submissions to one challenge, in insertion order.
    async fn list_submissions(&self, challenge_id: Uuid) -> Result<Vec<SubmissionRow>>;

    async fn find_votable(&self, id: Uuid) -> Result<Option<VotableRef>>;
    /// Apply the vote toggle for (voter, votable) as a single serialized unit
    /// and return the recomputed score.
    async fn toggle_vote(
        &self,
        voter_id: &str,
        votable: &VotableRef,
        value: VoteValue,
    ) -> Result<VoteOutcome>;

    async fn create_listing(&self, listing: NewListing) -> Result<ListingRow>;
    async fn get_listing(&self, id: Uuid) -> Result<Option<ListingRow>>;
    /// Newest first, optionally filtered by status.
    async fn list_listings(&self, status: Option<ListingStatus>) -> Result<Vec<ListingRow>>;
    async fn update_listing(&self, id: Uuid, update: ListingUpdate) -> Result<Option<ListingRow>>;
    async fn delete_listing(&self, id: Uuid) -> Result<bool>;
}
