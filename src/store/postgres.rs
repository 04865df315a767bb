//! PostgreSQL store.
//!
//! Progress and vote writes run inside a transaction that first takes
//! `pg_advisory_xact_lock(hashtextextended(key, 0))` on the row's logical key.
//! The lock covers rows that do not exist yet, which a `SELECT ... FOR UPDATE`
//! cannot, and is released on commit or rollback. Returning early with an
//! error drops the transaction, which rolls it back.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::*;
use crate::error::PetnetError;
use crate::votes::VotableKind;
use crate::{progress, votes};

const SCHEMA_SQL: &str = include_str!("../../migrations/001_petnet.sql");

const POST_COLUMNS: &str = "p.id, p.author_id, p.bark_id, p.body, p.media_url, p.created_at,
     COALESCE((SELECT SUM(v.value) FROM votes v WHERE v.votable_id = p.id), 0)::BIGINT AS score";

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.author_id, c.body, c.created_at,
     COALESCE((SELECT SUM(v.value) FROM votes v WHERE v.votable_id = c.id), 0)::BIGINT AS score";

const SUBMISSION_COLUMNS: &str =
    "s.id, s.challenge_id, s.user_id, s.pet_id, s.caption, s.media_url, s.created_at,
     COALESCE((SELECT SUM(v.value) FROM votes v WHERE v.votable_id = s.id), 0)::BIGINT AS score";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so that percent-encoded usernames (pooler
    /// URLs of the form `user.project-ref`) survive intact.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await?;
        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing tables and indexes. Safe to run repeatedly.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn lock_key(tx: &mut Transaction<'_, Postgres>, key: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

fn conflict_on_unique(e: sqlx::Error, what: &str) -> PetnetError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PetnetError::Conflict(format!("{} already exists", what))
        }
        _ => PetnetError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_user(&self, user_id: &str, display_name: Option<&str>) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, display_name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE
               SET display_name = COALESCE(users.display_name, EXCLUDED.display_name)
             RETURNING id, display_name, role, total_xp, created_at",
        )
        .bind(user_id)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, role, total_xp, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_user_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_pet(&self, pet: NewPet) -> Result<PetRow> {
        let row = sqlx::query_as::<_, PetRow>(
            "INSERT INTO pets (id, owner_id, name, species, breed, avatar_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, owner_id, name, species, breed, avatar_url, xp, love_count, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&pet.owner_id)
        .bind(&pet.name)
        .bind(&pet.species)
        .bind(&pet.breed)
        .bind(&pet.avatar_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_pet(&self, id: Uuid) -> Result<Option<PetRow>> {
        let row = sqlx::query_as::<_, PetRow>(
            "SELECT id, owner_id, name, species, breed, avatar_url, xp, love_count, created_at
             FROM pets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_pets(&self, owner_id: &str) -> Result<Vec<PetRow>> {
        let rows = sqlx::query_as::<_, PetRow>(
            "SELECT id, owner_id, name, species, breed, avatar_url, xp, love_count, created_at
             FROM pets WHERE owner_id = $1 ORDER BY created_at, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn love_pet(&self, id: Uuid) -> Result<Option<PetRow>> {
        let row = sqlx::query_as::<_, PetRow>(
            "UPDATE pets SET love_count = love_count + 1 WHERE id = $1
             RETURNING id, owner_id, name, species, breed, avatar_url, xp, love_count, created_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn all_pets(&self) -> Result<Vec<PetRow>> {
        let rows = sqlx::query_as::<_, PetRow>(
            "SELECT id, owner_id, name, species, breed, avatar_url, xp, love_count, created_at
             FROM pets ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_progress(&self, cmd: &ProgressCommand<'_>) -> Result<ProgressOutcome> {
        let mut tx = self.pool.begin().await?;
        Self::lock_key(
            &mut tx,
            &format!("progress:{}:{}", cmd.user_id, cmd.challenge.id),
        )
        .await?;

        let total_before: Option<i64> =
            sqlx::query_scalar("SELECT total_xp FROM users WHERE id = $1")
                .bind(cmd.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let total_before = total_before
            .ok_or_else(|| PetnetError::not_found(format!("account '{}'", cmd.user_id)))?;

        if let Some(share) = &cmd.share {
            let inserted = sqlx::query(
                "INSERT INTO share_log (user_id, recipient, share_day) VALUES ($1, $2, $3)
                 ON CONFLICT DO NOTHING",
            )
            .bind(cmd.user_id)
            .bind(&share.recipient)
            .bind(share.day)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted == 0 {
                return Err(PetnetError::DuplicateAction(format!(
                    "already shared with {} today",
                    share.recipient
                )));
            }
        }

        let prior = sqlx::query_as::<_, ProgressRow>(
            "SELECT user_id, challenge_id, cadence, progress, completed, last_updated
             FROM challenge_progress WHERE user_id = $1 AND challenge_id = $2",
        )
        .bind(cmd.user_id)
        .bind(cmd.challenge.id)
        .fetch_optional(&mut *tx)
        .await?;
        let prior_state = prior.as_ref().map(ProgressRow::state);
        let transition = progress::apply_increment(
            prior_state.as_ref(),
            cmd.challenge,
            cmd.increment,
            &cmd.policy,
            cmd.now,
        );

        sqlx::query(
            "INSERT INTO challenge_progress
               (user_id, challenge_id, cadence, progress, completed, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, challenge_id) DO UPDATE
               SET cadence = EXCLUDED.cadence,
                   progress = EXCLUDED.progress,
                   completed = EXCLUDED.completed,
                   last_updated = EXCLUDED.last_updated",
        )
        .bind(cmd.user_id)
        .bind(cmd.challenge.id)
        .bind(cmd.challenge.cadence.as_str())
        .bind(transition.state.progress)
        .bind(transition.state.completed)
        .bind(transition.state.last_updated)
        .execute(&mut *tx)
        .await?;

        let mut total_xp = total_before;
        let mut xp_gained = 0;
        if transition.newly_completed() {
            xp_gained = cmd.challenge.xp_reward;
            sqlx::query("UPDATE pets SET xp = xp + $2 WHERE owner_id = $1")
                .bind(cmd.user_id)
                .bind(xp_gained)
                .execute(&mut *tx)
                .await?;
            total_xp = sqlx::query_scalar(
                "UPDATE users SET total_xp = total_xp + $2 WHERE id = $1 RETURNING total_xp",
            )
            .bind(cmd.user_id)
            .bind(xp_gained)
            .fetch_one(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        if xp_gained > 0 {
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
        let rows = sqlx::query_as::<_, ProgressRow>(
            "SELECT user_id, challenge_id, cadence, progress, completed, last_updated
             FROM challenge_progress WHERE user_id = $1 ORDER BY challenge_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_bark(&self, bark: NewBark) -> Result<BarkRow> {
        sqlx::query_as::<_, BarkRow>(
            "INSERT INTO barks (id, slug, name, description, owner_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, slug, name, description, owner_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&bark.slug)
        .bind(&bark.name)
        .bind(&bark.description)
        .bind(&bark.owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, &format!("bark '{}'", bark.slug)))
    }

    async fn get_bark(&self, id: Uuid) -> Result<Option<BarkRow>> {
        let row = sqlx::query_as::<_, BarkRow>(
            "SELECT id, slug, name, description, owner_id, created_at FROM barks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_barks(&self) -> Result<Vec<BarkRow>> {
        let rows = sqlx::query_as::<_, BarkRow>(
            "SELECT id, slug, name, description, owner_id, created_at FROM barks ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_post(&self, post: NewPost) -> Result<PostRow> {
        let row = sqlx::query_as::<_, PostRow>(
            "INSERT INTO posts (id, author_id, bark_id, body, media_url)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, author_id, bark_id, body, media_url, created_at, 0::BIGINT AS score",
        )
        .bind(Uuid::new_v4())
        .bind(&post.author_id)
        .bind(post.bark_id)
        .bind(&post.body)
        .bind(&post.media_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = $1", POST_COLUMNS);
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_posts(&self, bark_id: Option<Uuid>, limit: usize) -> Result<Vec<PostRow>> {
        let sql = format!(
            "SELECT {} FROM posts p
             WHERE ($1::uuid IS NULL OR p.bark_id = $1)
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT $2",
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(bark_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRow> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO comments (id, post_id, author_id, body)
             VALUES ($1, $2, $3, $4)
             RETURNING id, post_id, author_id, body, created_at, 0::BIGINT AS score",
        )
        .bind(Uuid::new_v4())
        .bind(comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<CommentRow>> {
        let sql = format!(
            "SELECT {} FROM comments c WHERE c.post_id = $1 ORDER BY c.created_at, c.id",
            COMMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_weekly_challenge(
        &self,
        challenge: NewWeeklyChallenge,
    ) -> Result<WeeklyChallengeRow> {
        let row = sqlx::query_as::<_, WeeklyChallengeRow>(
            "INSERT INTO weekly_challenges (id, title, prompt, starts_at, ends_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, title, prompt, starts_at, ends_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&challenge.title)
        .bind(&challenge.prompt)
        .bind(challenge.starts_at)
        .bind(challenge.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_weekly_challenge(&self, id: Uuid) -> Result<Option<WeeklyChallengeRow>> {
        let row = sqlx::query_as::<_, WeeklyChallengeRow>(
            "SELECT id, title, prompt, starts_at, ends_at, created_at
             FROM weekly_challenges WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn active_weekly_challenge(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyChallengeRow>> {
        let row = sqlx::query_as::<_, WeeklyChallengeRow>(
            "SELECT id, title, prompt, starts_at, ends_at, created_at
             FROM weekly_challenges
             WHERE starts_at <= $1 AND $1 < ends_at
             ORDER BY starts_at DESC
             LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<SubmissionRow> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            "INSERT INTO submissions (id, challenge_id, user_id, pet_id, caption, media_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, challenge_id, user_id, pet_id, caption, media_url, created_at,
                       0::BIGINT AS score",
        )
        .bind(Uuid::new_v4())
        .bind(submission.challenge_id)
        .bind(&submission.user_id)
        .bind(submission.pet_id)
        .bind(&submission.caption)
        .bind(&submission.media_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_submissions(&self, challenge_id: Uuid) -> Result<Vec<SubmissionRow>> {
        let sql = format!(
            "SELECT {} FROM submissions s WHERE s.challenge_id = $1 ORDER BY s.created_at, s.id",
            SUBMISSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(challenge_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_votable(&self, id: Uuid) -> Result<Option<VotableRef>> {
        let row: Option<(String, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                "SELECT 'post', NULL::timestamptz, NULL::timestamptz FROM posts WHERE id = $1
                 UNION ALL
                 SELECT 'comment', NULL::timestamptz, NULL::timestamptz FROM comments WHERE id = $1
                 UNION ALL
                 SELECT 'submission', w.starts_at, w.ends_at
                   FROM submissions s JOIN weekly_challenges w ON w.id = s.challenge_id
                  WHERE s.id = $1
                 LIMIT 1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(kind, starts_at, ends_at)| {
            VotableKind::parse(&kind).map(|kind| VotableRef {
                id,
                kind,
                window: starts_at.zip(ends_at),
            })
        }))
    }

    async fn toggle_vote(
        &self,
        voter_id: &str,
        votable: &VotableRef,
        value: VoteValue,
    ) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await?;
        Self::lock_key(&mut tx, &format!("vote:{}:{}", voter_id, votable.id)).await?;

        let existing: Option<i16> =
            sqlx::query_scalar("SELECT value FROM votes WHERE voter_id = $1 AND votable_id = $2")
                .bind(voter_id)
                .bind(votable.id)
                .fetch_optional(&mut *tx)
                .await?;
        let existing = existing.map(VoteValue::try_from).transpose()?;
        let (action, next) = votes::transition(existing, value);

        match (existing, next) {
            (_, None) => {
                sqlx::query("DELETE FROM votes WHERE voter_id = $1 AND votable_id = $2")
                    .bind(voter_id)
                    .bind(votable.id)
                    .execute(&mut *tx)
                    .await?;
            }
            (None, Some(v)) => {
                sqlx::query(
                    "INSERT INTO votes (voter_id, votable_id, votable_kind, value)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(voter_id)
                .bind(votable.id)
                .bind(votable.kind.as_str())
                .bind(v.as_i16())
                .execute(&mut *tx)
                .await?;
            }
            (Some(_), Some(v)) => {
                sqlx::query(
                    "UPDATE votes SET value = $3, updated_at = NOW()
                     WHERE voter_id = $1 AND votable_id = $2",
                )
                .bind(voter_id)
                .bind(votable.id)
                .bind(v.as_i16())
                .execute(&mut *tx)
                .await?;
            }
        }

        let score: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(value), 0)::BIGINT FROM votes WHERE votable_id = $1",
        )
        .bind(votable.id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(VoteOutcome {
            votable_id: votable.id,
            action,
            value: next,
            score,
        })
    }

    async fn create_listing(&self, listing: NewListing) -> Result<ListingRow> {
        let row = sqlx::query_as::<_, ListingRow>(
            "INSERT INTO listings (id, seller_id, title, description, price_cents, image_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, seller_id, title, description, price_cents, image_url, status,
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&listing.seller_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price_cents)
        .bind(&listing.image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<ListingRow>> {
        let row = sqlx::query_as::<_, ListingRow>(
            "SELECT id, seller_id, title, description, price_cents, image_url, status,
                    created_at, updated_at
             FROM listings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_listings(&self, status: Option<ListingStatus>) -> Result<Vec<ListingRow>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            "SELECT id, seller_id, title, description, price_cents, image_url, status,
                    created_at, updated_at
             FROM listings
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_listing(&self, id: Uuid, update: ListingUpdate) -> Result<Option<ListingRow>> {
        let row = sqlx::query_as::<_, ListingRow>(
            "UPDATE listings SET
               title = COALESCE($2, title),
               description = COALESCE($3, description),
               price_cents = COALESCE($4, price_cents),
               image_url = COALESCE($5, image_url),
               status = COALESCE($6, status),
               updated_at = NOW()
             WHERE id = $1
             RETURNING id, seller_id, title, description, price_cents, image_url, status,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(update.title)
        .bind(update.description)
        .bind(update.price_cents)
        .bind(update.image_url)
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_listing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
