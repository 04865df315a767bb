//! In-process store.
//!
//! All tables live behind one mutex and every operation runs to completion
//! while holding it, which makes each trait call atomic and serializes
//! read-modify-write sequences on every key. Insertion order is the order of
//! the backing `Vec`s.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;
use uuid::Uuid;

use super::*;
use crate::clock::{Clock, SystemClock};
use crate::error::PetnetError;
use crate::votes::VotableKind;
use crate::{progress, votes};

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserRow>,
    pets: Vec<PetRow>,
    progress: HashMap<(String, String), ProgressRow>,
    shares: HashSet<(String, ShareKey)>,
    barks: Vec<BarkRow>,
    posts: Vec<PostRow>,
    comments: Vec<CommentRow>,
    weekly: Vec<WeeklyChallengeRow>,
    submissions: Vec<SubmissionRow>,
    votes: HashMap<(String, Uuid), VoteValue>,
    listings: Vec<ListingRow>,
}

impl Tables {
    fn score(&self, votable_id: Uuid) -> i64 {
        votes::net_score(
            self.votes
                .iter()
                .filter(|((_, id), _)| *id == votable_id)
                .map(|(_, v)| *v),
        )
    }

    fn post(&self, mut row: PostRow) -> PostRow {
        row.score = self.score(row.id);
        row
    }

    fn comment(&self, mut row: CommentRow) -> CommentRow {
        row.score = self.score(row.id);
        row
    }

    fn submission(&self, mut row: SubmissionRow) -> SubmissionRow {
        row.score = self.score(row.id);
        row
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Timestamps for new rows come from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            tables: Mutex::new(Tables::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        drop(self.lock());
        Ok(())
    }

    async fn ensure_user(&self, user_id: &str, display_name: Option<&str>) -> Result<UserRow> {
        let now = self.clock.now();
        let mut t = self.lock();
        let user = t
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRow {
                id: user_id.to_string(),
                display_name: None,
                role: ROLE_MEMBER.to_string(),
                total_xp: 0,
                created_at: now,
            });
        if user.display_name.is_none() {
            user.display_name = display_name.map(str::to_string);
        }
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn set_user_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let mut t = self.lock();
        match t.users.get_mut(user_id) {
            Some(user) => {
                user.role = role.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_pet(&self, pet: NewPet) -> Result<PetRow> {
        let row = PetRow {
            id: Uuid::new_v4(),
            owner_id: pet.owner_id,
            name: pet.name,
            species: pet.species,
            breed: pet.breed,
            avatar_url: pet.avatar_url,
            xp: 0,
            love_count: 0,
            created_at: self.clock.now(),
        };
        self.lock().pets.push(row.clone());
        Ok(row)
    }

    async fn get_pet(&self, id: Uuid) -> Result<Option<PetRow>> {
        Ok(self.lock().pets.iter().find(|p| p.id == id).cloned())
    }

    async fn list_pets(&self, owner_id: &str) -> Result<Vec<PetRow>> {
        Ok(self
            .lock()
            .pets
            .iter()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn love_pet(&self, id: Uuid) -> Result<Option<PetRow>> {
        let mut t = self.lock();
        Ok(t.pets.iter_mut().find(|p| p.id == id).map(|p| {
            p.love_count += 1;
            p.clone()
        }))
    }

    async fn all_pets(&self) -> Result<Vec<PetRow>> {
        Ok(self.lock().pets.clone())
    }

    async fn record_progress(&self, cmd: &ProgressCommand<'_>) -> Result<ProgressOutcome> {
        let mut t = self.lock();
        if !t.users.contains_key(cmd.user_id) {
            return Err(PetnetError::not_found(format!("account '{}'", cmd.user_id)));
        }
        if let Some(share) = &cmd.share {
            let key = (cmd.user_id.to_string(), share.clone());
            if !t.shares.insert(key) {
                return Err(PetnetError::DuplicateAction(format!(
                    "already shared with {} today",
                    share.recipient
                )));
            }
        }

        let key = (cmd.user_id.to_string(), cmd.challenge.id.to_string());
        let prior = t.progress.get(&key).map(ProgressRow::state);
        let transition = progress::apply_increment(
            prior.as_ref(),
            cmd.challenge,
            cmd.increment,
            &cmd.policy,
            cmd.now,
        );
        t.progress.insert(
            key,
            ProgressRow {
                user_id: cmd.user_id.to_string(),
                challenge_id: cmd.challenge.id.to_string(),
                cadence: cmd.challenge.cadence.as_str().to_string(),
                progress: transition.state.progress,
                completed: transition.state.completed,
                last_updated: transition.state.last_updated,
            },
        );

        let xp_gained = if transition.newly_completed() {
            cmd.challenge.xp_reward
        } else {
            0
        };
        if xp_gained > 0 {
            for pet in t.pets.iter_mut().filter(|p| p.owner_id == cmd.user_id) {
                pet.xp += xp_gained;
            }
        }
        let total_xp = match t.users.get_mut(cmd.user_id) {
            Some(user) => {
                user.total_xp += xp_gained;
                user.total_xp
            }
            None => 0,
        };
        if transition.newly_completed() {
            info!(
                user_id = cmd.user_id,
                challenge = cmd.challenge.id,
                xp = xp_gained,
                "challenge completed"
            );
        }

        Ok(ProgressOutcome {
            challenge_id: cmd.challenge.id.to_string(),
            progress: transition.state.progress,
            goal: cmd.challenge.goal,
            completed: transition.state.completed,
            xp_gained,
            total_xp,
            reset: transition.reset,
        })
    }

    async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressRow>> {
        let t = self.lock();
        let mut rows: Vec<ProgressRow> = t
            .progress
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.challenge_id.cmp(&b.challenge_id));
        Ok(rows)
    }

    async fn create_bark(&self, bark: NewBark) -> Result<BarkRow> {
        let now = self.clock.now();
        let mut t = self.lock();
        if t.barks.iter().any(|b| b.slug == bark.slug) {
            return Err(PetnetError::Conflict(format!(
                "bark '{}' already exists",
                bark.slug
            )));
        }
        let row = BarkRow {
            id: Uuid::new_v4(),
            slug: bark.slug,
            name: bark.name,
            description: bark.description,
            owner_id: bark.owner_id,
            created_at: now,
        };
        t.barks.push(row.clone());
        Ok(row)
    }

    async fn get_bark(&self, id: Uuid) -> Result<Option<BarkRow>> {
        Ok(self.lock().barks.iter().find(|b| b.id == id).cloned())
    }

    async fn list_barks(&self) -> Result<Vec<BarkRow>> {
        let mut barks = self.lock().barks.clone();
        barks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(barks)
    }

    async fn create_post(&self, post: NewPost) -> Result<PostRow> {
        let row = PostRow {
            id: Uuid::new_v4(),
            author_id: post.author_id,
            bark_id: post.bark_id,
            body: post.body,
            media_url: post.media_url,
            created_at: self.clock.now(),
            score: 0,
        };
        self.lock().posts.push(row.clone());
        Ok(row)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>> {
        let t = self.lock();
        Ok(t.posts.iter().find(|p| p.id == id).cloned().map(|p| t.post(p)))
    }

    async fn list_posts(&self, bark_id: Option<Uuid>, limit: usize) -> Result<Vec<PostRow>> {
        let t = self.lock();
        Ok(t.posts
            .iter()
            .rev()
            .filter(|p| bark_id.is_none() || p.bark_id == bark_id)
            .take(limit)
            .cloned()
            .map(|p| t.post(p))
            .collect())
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRow> {
        let row = CommentRow {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            body: comment.body,
            created_at: self.clock.now(),
            score: 0,
        };
        self.lock().comments.push(row.clone());
        Ok(row)
    }

    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<CommentRow>> {
        let t = self.lock();
        Ok(t.comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .map(|c| t.comment(c))
            .collect())
    }

    async fn create_weekly_challenge(
        &self,
        challenge: NewWeeklyChallenge,
    ) -> Result<WeeklyChallengeRow> {
        let row = WeeklyChallengeRow {
            id: Uuid::new_v4(),
            title: challenge.title,
            prompt: challenge.prompt,
            starts_at: challenge.starts_at,
            ends_at: challenge.ends_at,
            created_at: self.clock.now(),
        };
        self.lock().weekly.push(row.clone());
        Ok(row)
    }

    async fn get_weekly_challenge(&self, id: Uuid) -> Result<Option<WeeklyChallengeRow>> {
        Ok(self.lock().weekly.iter().find(|w| w.id == id).cloned())
    }

    async fn active_weekly_challenge(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyChallengeRow>> {
        Ok(self
            .lock()
            .weekly
            .iter()
            .filter(|w| w.is_active(now))
            .max_by_key(|w| w.starts_at)
            .cloned())
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<SubmissionRow> {
        let row = SubmissionRow {
            id: Uuid::new_v4(),
            challenge_id: submission.challenge_id,
            user_id: submission.user_id,
            pet_id: submission.pet_id,
            caption: submission.caption,
            media_url: submission.media_url,
            created_at: self.clock.now(),
            score: 0,
        };
        self.lock().submissions.push(row.clone());
        Ok(row)
    }

    async fn list_submissions(&self, challenge_id: Uuid) -> Result<Vec<SubmissionRow>> {
        let t = self.lock();
        Ok(t.submissions
            .iter()
            .filter(|s| s.challenge_id == challenge_id)
            .cloned()
            .map(|s| t.submission(s))
            .collect())
    }

    async fn find_votable(&self, id: Uuid) -> Result<Option<VotableRef>> {
        let t = self.lock();
        if t.posts.iter().any(|p| p.id == id) {
            return Ok(Some(VotableRef {
                id,
                kind: VotableKind::Post,
                window: None,
            }));
        }
        if t.comments.iter().any(|c| c.id == id) {
            return Ok(Some(VotableRef {
                id,
                kind: VotableKind::Comment,
                window: None,
            }));
        }
        let submission = t.submissions.iter().find(|s| s.id == id);
        Ok(submission.and_then(|s| {
            t.weekly
                .iter()
                .find(|w| w.id == s.challenge_id)
                .map(|w| VotableRef {
                    id,
                    kind: VotableKind::Submission,
                    window: Some((w.starts_at, w.ends_at)),
                })
        }))
    }

    async fn toggle_vote(
        &self,
        voter_id: &str,
        votable: &VotableRef,
        value: VoteValue,
    ) -> Result<VoteOutcome> {
        let mut t = self.lock();
        let key = (voter_id.to_string(), votable.id);
        let existing = t.votes.get(&key).copied();
        let (action, next) = votes::transition(existing, value);
        match next {
            Some(v) => {
                t.votes.insert(key, v);
            }
            None => {
                t.votes.remove(&key);
            }
        }
        Ok(VoteOutcome {
            votable_id: votable.id,
            action,
            value: next,
            score: t.score(votable.id),
        })
    }

    async fn create_listing(&self, listing: NewListing) -> Result<ListingRow> {
        let now = self.clock.now();
        let row = ListingRow {
            id: Uuid::new_v4(),
            seller_id: listing.seller_id,
            title: listing.title,
            description: listing.description,
            price_cents: listing.price_cents,
            image_url: listing.image_url,
            status: ListingStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.lock().listings.push(row.clone());
        Ok(row)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<ListingRow>> {
        Ok(self.lock().listings.iter().find(|l| l.id == id).cloned())
    }

    async fn list_listings(&self, status: Option<ListingStatus>) -> Result<Vec<ListingRow>> {
        Ok(self
            .lock()
            .listings
            .iter()
            .rev()
            .filter(|l| status.map_or(true, |s| l.status == s.as_str()))
            .cloned()
            .collect())
    }

    async fn update_listing(&self, id: Uuid, update: ListingUpdate) -> Result<Option<ListingRow>> {
        let now = self.clock.now();
        let mut t = self.lock();
        Ok(t.listings.iter_mut().find(|l| l.id == id).map(|l| {
            if let Some(title) = update.title {
                l.title = title;
            }
            if let Some(description) = update.description {
                l.description = description;
            }
            if let Some(price) = update.price_cents {
                l.price_cents = price;
            }
            if let Some(url) = update.image_url {
                l.image_url = Some(url);
            }
            if let Some(status) = update.status {
                l.status = status.as_str().to_string();
            }
            l.updated_at = now;
            l.clone()
        }))
    }

    async fn delete_listing(&self, id: Uuid) -> Result<bool> {
        let mut t = self.lock();
        let before = t.listings.len();
        t.listings.retain(|l| l.id != id);
        Ok(t.listings.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::TimeZone;

    fn command<'a>(user_id: &'a str, challenge: &str, increment: i32) -> ProgressCommand<'a> {
        ProgressCommand {
            user_id,
            challenge: catalog::find(challenge).unwrap(),
            increment,
            share: None,
            policy: ResetPolicy::default(),
            now: Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn progress_requires_existing_account() {
        let store = MemoryStore::new();
        let err = store
            .record_progress(&command("ghost", "daily_post", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn completion_credits_every_pet_and_ledger_once() {
        let store = MemoryStore::new();
        store.ensure_user("u1", None).await.unwrap();
        for name in ["Biscuit", "Mochi"] {
            store
                .create_pet(NewPet {
                    owner_id: "u1".into(),
                    name: name.into(),
                    species: "dog".into(),
                    breed: None,
                    avatar_url: None,
                })
                .await
                .unwrap();
        }

        let first = store
            .record_progress(&command("u1", "daily_post", 1))
            .await
            .unwrap();
        assert!(first.completed);
        assert_eq!(first.xp_gained, 10);
        assert_eq!(first.total_xp, 10);

        let again = store
            .record_progress(&command("u1", "daily_post", 1))
            .await
            .unwrap();
        assert_eq!(again.xp_gained, 0);
        assert_eq!(again.total_xp, 10);

        let pets = store.list_pets("u1").await.unwrap();
        assert!(pets.iter().all(|p| p.xp == 10));
    }

    #[tokio::test]
    async fn repeated_share_key_is_rejected_without_progress() {
        let store = MemoryStore::new();
        store.ensure_user("u1", None).await.unwrap();
        let mut cmd = command("u1", "daily_expand_petnet", 1);
        cmd.share = Some(ShareKey {
            recipient: "friend@example.com".into(),
            day: cmd.policy.local_day(cmd.now),
        });
        let first = store.record_progress(&cmd).await.unwrap();
        assert_eq!(first.progress, 1);

        let err = store.record_progress(&cmd).await.unwrap_err();
        assert_eq!(err.kind(), "duplicate_action");
        let rows = store.list_progress("u1").await.unwrap();
        assert_eq!(rows[0].progress, 1);
    }

    #[tokio::test]
    async fn scores_follow_vote_rows() {
        let store = MemoryStore::new();
        let post = store
            .create_post(NewPost {
                author_id: "author".into(),
                bark_id: None,
                body: "zoomies".into(),
                media_url: None,
            })
            .await
            .unwrap();
        let votable = store.find_votable(post.id).await.unwrap().unwrap();
        assert_eq!(votable.kind, VotableKind::Post);

        store.toggle_vote("a", &votable, VoteValue::Up).await.unwrap();
        store.toggle_vote("b", &votable, VoteValue::Up).await.unwrap();
        let out = store.toggle_vote("c", &votable, VoteValue::Down).await.unwrap();
        assert_eq!(out.score, 1);
        assert_eq!(store.get_post(post.id).await.unwrap().unwrap().score, 1);

        let out = store.toggle_vote("a", &votable, VoteValue::Up).await.unwrap();
        assert_eq!(out.action, votes::VoteAction::Retracted);
        assert_eq!(out.score, 0);
    }

    #[tokio::test]
    async fn duplicate_bark_slug_conflicts() {
        let store = MemoryStore::new();
        let bark = NewBark {
            slug: "corgis".into(),
            name: "Corgis".into(),
            description: String::new(),
            owner_id: "u1".into(),
        };
        store.create_bark(bark.clone()).await.unwrap();
        let err = store.create_bark(bark).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn unknown_votable_is_none() {
        let store = MemoryStore::new();
        assert!(store.find_votable(Uuid::new_v4()).await.unwrap().is_none());
    }
}
