//! # Service — Authenticated Operations
//!
//! [`Petnet`] is the single entry point the HTTP layer and the CLI call. It
//! validates caller input, resolves the catalog and clock, and hands a fully
//! formed command to the [`Store`], which applies it atomically. Every
//! `user_id` argument is an authenticated principal whose account has been
//! provisioned with [`Petnet::ensure_account`].
//!
//! Time is read once per operation from the injected [`Clock`], so a single
//! call never straddles a daily reset boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{self, Cadence, ChallengeDefinition};
use crate::clock::{Clock, SystemClock};
use crate::config::LeaderboardConfig;
use crate::error::{PetnetError, Result};
use crate::leaderboard::{self, RankedEntry, Scope, Scored};
use crate::metrics::Metrics;
use crate::progress::{self, ProgressState, ResetPolicy};
use crate::store::{
    BarkRow, CommentRow, ListingRow, ListingStatus, ListingUpdate, NewBark, NewComment,
    NewListing, NewPet, NewPost, NewSubmission, NewWeeklyChallenge, PetRow, PostRow,
    ProgressCommand, ProgressOutcome, ShareKey, Store, SubmissionRow, UserRow,
    WeeklyChallengeRow, ROLE_ADMIN,
};
use crate::votes::{VoteOutcome, VoteValue};
use crate::level_from_xp;

const MAX_NAME_LEN: usize = 80;
const MAX_BODY_LEN: usize = 10_000;
const DEFAULT_POST_LIMIT: usize = 50;
const MAX_POST_LIMIT: usize = 200;

// ── Views ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetView {
    #[serde(flatten)]
    pub pet: PetRow,
    pub level: i64,
}

impl From<PetRow> for PetView {
    fn from(pet: PetRow) -> Self {
        let level = level_from_xp(pet.xp);
        PetView { pet, level }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: Option<String>,
    pub role: String,
    pub total_xp: i64,
    pub level: i64,
    pub pets: Vec<PetView>,
}

/// One catalog challenge as it reads for a user right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub challenge_id: &'static str,
    pub title: &'static str,
    pub cadence: Cadence,
    pub goal: i32,
    pub xp_reward: i64,
    pub progress: i32,
    pub completed: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProgressView {
    fn new(challenge: &'static ChallengeDefinition, state: Option<ProgressState>) -> Self {
        ProgressView {
            challenge_id: challenge.id,
            title: challenge.title,
            cadence: challenge.cadence,
            goal: challenge.goal,
            xp_reward: challenge.xp_reward,
            progress: state.map_or(0, |s| s.progress),
            completed: state.is_some_and(|s| s.completed),
            last_updated: state.map(|s| s.last_updated),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LeaderboardEntity {
    Pet(PetRow),
    Submission(SubmissionRow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub scope: Scope,
    /// The weekly challenge a `challenge`-scoped page was drawn from.
    pub challenge: Option<WeeklyChallengeRow>,
    pub ranked_entities: Vec<RankedEntry<LeaderboardEntity>>,
}

// ── Inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PetInput {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub body: String,
    pub media_url: Option<String>,
    pub bark_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct WeeklyChallengeInput {
    pub title: String,
    pub prompt: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionInput {
    pub caption: String,
    pub media_url: String,
    pub pet_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingInput {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
}

// ── Service ─────────────────────────────────────────────────────

pub struct Petnet {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: ResetPolicy,
    leaderboard: LeaderboardConfig,
    metrics: Arc<Metrics>,
}

impl Petnet {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Petnet {
            store,
            clock: Arc::new(SystemClock),
            policy: ResetPolicy::default(),
            leaderboard: LeaderboardConfig::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_leaderboard(mut self, leaderboard: LeaderboardConfig) -> Self {
        self.leaderboard = leaderboard;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    // ── Accounts ────────────────────────────────────────────────

    /// Provision the account for an authenticated principal on first sight.
    pub async fn ensure_account(&self, user_id: &str, display_name: Option<&str>) -> Result<UserRow> {
        if user_id.trim().is_empty() {
            return Err(PetnetError::Unauthenticated);
        }
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());
        self.store.ensure_user(user_id, display_name).await
    }

    pub async fn profile(&self, user_id: &str) -> Result<Profile> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("account '{}'", user_id)))?;
        let pets = self.store.list_pets(user_id).await?;
        Ok(Profile {
            level: level_from_xp(user.total_xp),
            id: user.id,
            display_name: user.display_name,
            role: user.role,
            total_xp: user.total_xp,
            pets: pets.into_iter().map(PetView::from).collect(),
        })
    }

    /// Make an account an administrator, provisioning it if needed.
    pub async fn grant_admin(&self, user_id: &str) -> Result<UserRow> {
        self.ensure_account(user_id, None).await?;
        self.store.set_user_role(user_id, ROLE_ADMIN).await?;
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("account '{}'", user_id)))
    }

    // ── Progress ────────────────────────────────────────────────

    /// `recordProgress`: apply one increment to the caller's progress on a
    /// catalog challenge and credit XP on the completion transition.
    ///
    /// `increment` defaults to 1. Challenges that count distinct recipients
    /// take exactly one recipient per call.
    pub async fn record_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
        increment: Option<i64>,
        recipient: Option<&str>,
    ) -> Result<ProgressOutcome> {
        let challenge = catalog::find(challenge_id)
            .ok_or_else(|| PetnetError::not_found(format!("challenge '{}'", challenge_id)))?;
        let increment = increment.unwrap_or(1);
        if increment < 0 {
            return Err(PetnetError::invalid("increment must not be negative"));
        }
        let increment = i32::try_from(increment)
            .map_err(|_| PetnetError::invalid("increment is too large"))?;

        let now = self.clock.now();
        let share = if challenge.unique_recipient {
            if increment != 1 {
                return Err(PetnetError::invalid(
                    "share challenges count one recipient per call",
                ));
            }
            let recipient = normalize_recipient(recipient)
                .ok_or_else(|| PetnetError::invalid("recipient is required"))?;
            if recipient == user_id.trim().to_lowercase() {
                return Err(PetnetError::invalid("cannot share with yourself"));
            }
            Some(ShareKey {
                recipient,
                day: self.policy.local_day(now),
            })
        } else {
            None
        };

        let outcome = self
            .store
            .record_progress(&ProgressCommand {
                user_id,
                challenge,
                increment,
                share,
                policy: self.policy,
                now,
            })
            .await?;

        self.metrics.progress_updates.inc();
        if outcome.xp_gained > 0 {
            self.metrics
                .record_completion(challenge.id, outcome.xp_gained);
        }
        Ok(outcome)
    }

    /// Every catalog challenge as it reads for the caller now. Stale daily
    /// rows read as zero; nothing is written back.
    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressView>> {
        let rows = self.store.list_progress(user_id).await?;
        let now = self.clock.now();
        Ok(catalog::all()
            .iter()
            .map(|challenge| {
                let state = rows
                    .iter()
                    .find(|r| r.challenge_id == challenge.id)
                    .map(|r| progress::current_view(&r.state(), challenge.cadence, &self.policy, now));
                ProgressView::new(challenge, state)
            })
            .collect())
    }

    // ── Votes ───────────────────────────────────────────────────

    /// `castVote`: run the toggle state machine for (voter, votable).
    pub async fn cast_vote(&self, voter_id: &str, votable_id: Uuid, value: i64) -> Result<VoteOutcome> {
        let value = VoteValue::from_i64(value)?;
        let votable = self
            .store
            .find_votable(votable_id)
            .await?
            .ok_or_else(|| PetnetError::NotEligible(format!("nothing to vote on at {}", votable_id)))?;
        if !votable.is_eligible(self.clock.now()) {
            return Err(PetnetError::NotEligible(format!(
                "{} {} is not open for voting",
                votable.kind, votable_id
            )));
        }

        let outcome = self.store.toggle_vote(voter_id, &votable, value).await?;
        self.metrics.record_vote(outcome.action.as_str());
        info!(
            voter_id,
            votable_id = %votable_id,
            kind = %votable.kind,
            action = outcome.action.as_str(),
            score = outcome.score,
            "vote recorded"
        );
        Ok(outcome)
    }

    // ── Leaderboard ─────────────────────────────────────────────

    pub async fn leaderboard(
        &self,
        scope: Scope,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<LeaderboardPage> {
        let limit = self.leaderboard.effective_limit(limit);
        let (challenge, candidates) = match scope {
            Scope::Global => {
                let pets = self.store.all_pets().await?;
                let candidates = pets
                    .into_iter()
                    .map(|p| Scored {
                        score: p.love_count,
                        entity: LeaderboardEntity::Pet(p),
                    })
                    .collect::<Vec<_>>();
                (None, candidates)
            }
            Scope::Challenge => match self.store.active_weekly_challenge(self.clock.now()).await? {
                Some(active) => {
                    let submissions = self.store.list_submissions(active.id).await?;
                    let candidates = submissions
                        .into_iter()
                        .map(|s| Scored {
                            score: s.score,
                            entity: LeaderboardEntity::Submission(s),
                        })
                        .collect::<Vec<_>>();
                    (Some(active), candidates)
                }
                None => (None, Vec::new()),
            },
        };
        debug!(?scope, candidates = candidates.len(), limit, offset, "ranking leaderboard");
        Ok(LeaderboardPage {
            scope,
            challenge,
            ranked_entities: leaderboard::rank(candidates, offset, limit),
        })
    }

    // ── Pets ────────────────────────────────────────────────────

    pub async fn create_pet(&self, owner_id: &str, input: PetInput) -> Result<PetView> {
        let name = required(&input.name, "name", MAX_NAME_LEN)?;
        let species = required(&input.species, "species", MAX_NAME_LEN)?;
        let pet = self
            .store
            .create_pet(NewPet {
                owner_id: owner_id.to_string(),
                name,
                species,
                breed: optional(input.breed),
                avatar_url: optional(input.avatar_url),
            })
            .await?;
        Ok(pet.into())
    }

    pub async fn get_pet(&self, id: Uuid) -> Result<PetView> {
        self.store
            .get_pet(id)
            .await?
            .map(PetView::from)
            .ok_or_else(|| PetnetError::not_found(format!("pet {}", id)))
    }

    pub async fn list_pets(&self, owner_id: &str) -> Result<Vec<PetView>> {
        let pets = self.store.list_pets(owner_id).await?;
        Ok(pets.into_iter().map(PetView::from).collect())
    }

    pub async fn love_pet(&self, id: Uuid) -> Result<PetView> {
        self.store
            .love_pet(id)
            .await?
            .map(PetView::from)
            .ok_or_else(|| PetnetError::not_found(format!("pet {}", id)))
    }

    // ── Barks, posts, comments ──────────────────────────────────

    pub async fn create_bark(
        &self,
        owner_id: &str,
        slug: &str,
        name: &str,
        description: &str,
    ) -> Result<BarkRow> {
        let slug = slug.trim().to_lowercase();
        if !is_valid_slug(&slug) {
            return Err(PetnetError::invalid(
                "slug must be 3-32 characters of a-z, 0-9 or '-'",
            ));
        }
        let name = required(name, "name", MAX_NAME_LEN)?;
        self.store
            .create_bark(NewBark {
                slug,
                name,
                description: description.trim().to_string(),
                owner_id: owner_id.to_string(),
            })
            .await
    }

    pub async fn list_barks(&self) -> Result<Vec<BarkRow>> {
        self.store.list_barks().await
    }

    pub async fn create_post(&self, author_id: &str, input: PostInput) -> Result<PostRow> {
        let media_url = optional(input.media_url);
        let body = input.body.trim().to_string();
        if body.is_empty() && media_url.is_none() {
            return Err(PetnetError::invalid("a post needs a body or media"));
        }
        if body.len() > MAX_BODY_LEN {
            return Err(PetnetError::invalid("body is too long"));
        }
        if let Some(bark_id) = input.bark_id {
            if self.store.get_bark(bark_id).await?.is_none() {
                return Err(PetnetError::not_found(format!("bark {}", bark_id)));
            }
        }
        self.store
            .create_post(NewPost {
                author_id: author_id.to_string(),
                bark_id: input.bark_id,
                body,
                media_url,
            })
            .await
    }

    pub async fn get_post(&self, id: Uuid) -> Result<PostRow> {
        self.store
            .get_post(id)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("post {}", id)))
    }

    /// Newest first, with live scores.
    pub async fn list_posts(&self, bark_id: Option<Uuid>, limit: Option<usize>) -> Result<Vec<PostRow>> {
        let limit = limit.unwrap_or(DEFAULT_POST_LIMIT).clamp(1, MAX_POST_LIMIT);
        self.store.list_posts(bark_id, limit).await
    }

    pub async fn create_comment(&self, author_id: &str, post_id: Uuid, body: &str) -> Result<CommentRow> {
        let body = required(body, "body", MAX_BODY_LEN)?;
        self.get_post(post_id).await?;
        self.store
            .create_comment(NewComment {
                post_id,
                author_id: author_id.to_string(),
                body,
            })
            .await
    }

    pub async fn list_comments(&self, post_id: Uuid) -> Result<Vec<CommentRow>> {
        self.get_post(post_id).await?;
        self.store.list_comments(post_id).await
    }

    // ── Weekly challenges ───────────────────────────────────────

    pub async fn create_weekly_challenge(
        &self,
        actor_id: &str,
        input: WeeklyChallengeInput,
    ) -> Result<WeeklyChallengeRow> {
        let actor = self
            .store
            .get_user(actor_id)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("account '{}'", actor_id)))?;
        if actor.role != ROLE_ADMIN {
            return Err(PetnetError::Forbidden(
                "only administrators can create weekly challenges".into(),
            ));
        }
        let title = required(&input.title, "title", MAX_NAME_LEN)?;
        let prompt = required(&input.prompt, "prompt", MAX_BODY_LEN)?;
        if input.starts_at >= input.ends_at {
            return Err(PetnetError::invalid("startsAt must be before endsAt"));
        }
        let row = self
            .store
            .create_weekly_challenge(NewWeeklyChallenge {
                title,
                prompt,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
            })
            .await?;
        info!(challenge_id = %row.id, title = %row.title, "weekly challenge created");
        Ok(row)
    }

    pub async fn active_weekly_challenge(&self) -> Result<Option<WeeklyChallengeRow>> {
        self.store.active_weekly_challenge(self.clock.now()).await
    }

    pub async fn submit_entry(&self, user_id: &str, input: SubmissionInput) -> Result<SubmissionRow> {
        let media_url = required(&input.media_url, "mediaUrl", 2048)?;
        let challenge = self
            .store
            .active_weekly_challenge(self.clock.now())
            .await?
            .ok_or_else(|| PetnetError::NotEligible("no weekly challenge is running".into()))?;
        if let Some(pet_id) = input.pet_id {
            let pet = self
                .store
                .get_pet(pet_id)
                .await?
                .ok_or_else(|| PetnetError::not_found(format!("pet {}", pet_id)))?;
            if pet.owner_id != user_id {
                return Err(PetnetError::Forbidden("that pet belongs to someone else".into()));
            }
        }
        self.store
            .create_submission(NewSubmission {
                challenge_id: challenge.id,
                user_id: user_id.to_string(),
                pet_id: input.pet_id,
                caption: input.caption.trim().to_string(),
                media_url,
            })
            .await
    }

    pub async fn list_submissions(&self, challenge_id: Uuid) -> Result<Vec<SubmissionRow>> {
        if self.store.get_weekly_challenge(challenge_id).await?.is_none() {
            return Err(PetnetError::not_found(format!("weekly challenge {}", challenge_id)));
        }
        self.store.list_submissions(challenge_id).await
    }

    // ── Marketplace ─────────────────────────────────────────────

    pub async fn create_listing(&self, seller_id: &str, input: ListingInput) -> Result<ListingRow> {
        let title = required(&input.title, "title", MAX_NAME_LEN)?;
        if input.price_cents < 0 {
            return Err(PetnetError::invalid("priceCents must not be negative"));
        }
        self.store
            .create_listing(NewListing {
                seller_id: seller_id.to_string(),
                title,
                description: input.description.trim().to_string(),
                price_cents: input.price_cents,
                image_url: optional(input.image_url),
            })
            .await
    }

    /// Listings with the given status, `active` when unspecified.
    pub async fn list_listings(&self, status: Option<ListingStatus>) -> Result<Vec<ListingRow>> {
        self.store
            .list_listings(Some(status.unwrap_or(ListingStatus::Active)))
            .await
    }

    pub async fn get_listing(&self, id: Uuid) -> Result<ListingRow> {
        self.store
            .get_listing(id)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("listing {}", id)))
    }

    pub async fn update_listing(
        &self,
        actor_id: &str,
        id: Uuid,
        mut update: ListingUpdate,
    ) -> Result<ListingRow> {
        self.owned_listing(actor_id, id).await?;
        if let Some(title) = update.title.take() {
            update.title = Some(required(&title, "title", MAX_NAME_LEN)?);
        }
        if update.price_cents.is_some_and(|p| p < 0) {
            return Err(PetnetError::invalid("priceCents must not be negative"));
        }
        update.description = update.description.map(|d| d.trim().to_string());
        self.store
            .update_listing(id, update)
            .await?
            .ok_or_else(|| PetnetError::not_found(format!("listing {}", id)))
    }

    pub async fn delete_listing(&self, actor_id: &str, id: Uuid) -> Result<()> {
        self.owned_listing(actor_id, id).await?;
        if !self.store.delete_listing(id).await? {
            return Err(PetnetError::not_found(format!("listing {}", id)));
        }
        Ok(())
    }

    async fn owned_listing(&self, actor_id: &str, id: Uuid) -> Result<ListingRow> {
        let listing = self.get_listing(id).await?;
        if listing.seller_id != actor_id {
            return Err(PetnetError::Forbidden("only the seller can change a listing".into()));
        }
        Ok(listing)
    }
}

fn normalize_recipient(recipient: Option<&str>) -> Option<String> {
    recipient
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
}

fn required(value: &str, field: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PetnetError::invalid(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(PetnetError::invalid(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_valid_slug(slug: &str) -> bool {
    (3..=32).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}
