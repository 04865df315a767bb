//! # Progress — Challenge Progress State Transitions
//!
//! Pure functions behind `POST /api/xp/track`. A store loads the prior row for
//! a (user, challenge) key under its per-key lock, calls [`apply_increment`],
//! persists the returned state, and credits XP when
//! [`ProgressTransition::newly_completed`] is set.
//!
//! ## Daily reset
//!
//! Daily challenges start over at a fixed local time (06:00 by default) in a
//! fixed UTC offset. Nothing runs at the boundary: a row whose `last_updated`
//! predates the most recent boundary is treated as zero the next time it is
//! touched ([`ResetPolicy::is_stale`]). Weekly and seasonal challenges never
//! reset here.
//!
//! ## Completion
//!
//! Progress is clamped to the goal, and `completed == (progress >= goal)`
//! holds for every state this module produces. XP is edge-triggered: only the
//! call that moves a row from not-completed to completed reports
//! `newly_completed`.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::Serialize;

use crate::catalog::{Cadence, ChallengeDefinition};
use crate::error::{PetnetError, Result};

const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// When daily challenges roll over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPolicy {
    reset_time: NaiveTime,
    offset: FixedOffset,
}

impl ResetPolicy {
    pub fn new(hour: u32, utc_offset_minutes: i32) -> Result<Self> {
        let reset_time = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| PetnetError::invalid(format!("reset hour {} is not 0..=23", hour)))?;
        let offset = Some(utc_offset_minutes)
            .filter(|m| (-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(m))
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .ok_or_else(|| {
                PetnetError::invalid(format!(
                    "utc offset of {} minutes is out of range",
                    utc_offset_minutes
                ))
            })?;
        Ok(ResetPolicy { reset_time, offset })
    }

    /// The most recent reset instant at or before `now`.
    pub fn last_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset).naive_local();
        let mut boundary = local.date().and_time(self.reset_time);
        if local < boundary {
            boundary -= Duration::days(1);
        }
        let utc = boundary - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// True when a row last written at `last_updated` belongs to an earlier daily period.
    pub fn is_stale(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        last_updated < self.last_boundary(now)
    }

    /// Calendar date at `now` in the reference offset.
    pub fn local_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

impl Default for ResetPolicy {
    fn default() -> Self {
        ResetPolicy {
            reset_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            offset: Utc.fix(),
        }
    }
}

/// Persisted portion of a progress row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub progress: i32,
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTransition {
    pub state: ProgressState,
    /// Completion flag the new state should be compared against; false after a reset.
    pub was_completed: bool,
    /// The prior row was discarded by the daily reset.
    pub reset: bool,
}

impl ProgressTransition {
    pub fn newly_completed(&self) -> bool {
        self.state.completed && !self.was_completed
    }
}

/// Compute the next state of a progress row.
///
/// `increment` must be non-negative; the service rejects anything else before
/// a store is involved.
pub fn apply_increment(
    prior: Option<&ProgressState>,
    challenge: &ChallengeDefinition,
    increment: i32,
    policy: &ResetPolicy,
    now: DateTime<Utc>,
) -> ProgressTransition {
    let reset = prior.is_some_and(|p| {
        challenge.cadence == Cadence::Daily && policy.is_stale(p.last_updated, now)
    });
    let (base, was_completed) = match prior {
        Some(p) if !reset => (p.progress, p.completed),
        _ => (0, false),
    };
    let progress = base
        .saturating_add(increment.max(0))
        .min(challenge.goal)
        .max(0);
    ProgressTransition {
        state: ProgressState {
            progress,
            completed: progress >= challenge.goal,
            last_updated: now,
        },
        was_completed,
        reset,
    }
}

/// How a stored row reads at `now`, without writing it back.
pub fn current_view(
    stored: &ProgressState,
    cadence: Cadence,
    policy: &ResetPolicy,
    now: DateTime<Utc>,
) -> ProgressState {
    if cadence == Cadence::Daily && policy.is_stale(stored.last_updated, now) {
        ProgressState {
            progress: 0,
            completed: false,
            last_updated: stored.last_updated,
        }
    } else {
        *stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn goal3() -> ChallengeDefinition {
        ChallengeDefinition {
            id: "test_goal3",
            title: "three",
            cadence: Cadence::Weekly,
            goal: 3,
            xp_reward: 15,
            unique_recipient: false,
        }
    }

    fn daily(goal: i32) -> ChallengeDefinition {
        ChallengeDefinition {
            cadence: Cadence::Daily,
            goal,
            ..goal3()
        }
    }

    #[test]
    fn boundary_same_day_after_reset_hour() {
        let policy = ResetPolicy::default();
        assert_eq!(
            policy.last_boundary(at(2026, 5, 10, 9, 30)),
            at(2026, 5, 10, 6, 0)
        );
    }

    #[test]
    fn boundary_before_reset_hour_is_previous_day() {
        let policy = ResetPolicy::default();
        assert_eq!(
            policy.last_boundary(at(2026, 5, 10, 5, 59)),
            at(2026, 5, 9, 6, 0)
        );
    }

    #[test]
    fn boundary_exactly_at_reset_is_that_instant() {
        let policy = ResetPolicy::default();
        let now = at(2026, 5, 10, 6, 0);
        assert_eq!(policy.last_boundary(now), now);
    }

    #[test]
    fn boundary_respects_negative_offset() {
        // 06:00 at UTC-05:00 is 11:00 UTC.
        let policy = ResetPolicy::new(6, -300).unwrap();
        assert_eq!(
            policy.last_boundary(at(2026, 1, 15, 12, 0)),
            at(2026, 1, 15, 11, 0)
        );
        // 10:59 UTC is 05:59 local: still the previous period.
        assert_eq!(
            policy.last_boundary(at(2026, 1, 15, 10, 59)),
            at(2026, 1, 14, 11, 0)
        );
    }

    #[test]
    fn boundary_crosses_month_end() {
        let policy = ResetPolicy::default();
        assert_eq!(
            policy.last_boundary(at(2026, 3, 1, 2, 0)),
            at(2026, 2, 28, 6, 0)
        );
    }

    #[test]
    fn policy_rejects_bad_values() {
        assert!(ResetPolicy::new(24, 0).is_err());
        assert!(ResetPolicy::new(6, 19 * 60).is_err());
        assert!(ResetPolicy::new(6, i32::MAX).is_err());
        assert!(ResetPolicy::new(0, -12 * 60).is_ok());
    }

    #[test]
    fn local_day_uses_reference_offset() {
        let policy = ResetPolicy::new(6, -300).unwrap();
        assert_eq!(
            policy.local_day(at(2026, 1, 15, 3, 0)),
            NaiveDate::from_ymd_opt(2026, 1, 14).unwrap()
        );
    }

    #[test]
    fn increments_accumulate_then_clamp_and_complete_once() {
        let policy = ResetPolicy::default();
        let challenge = goal3();
        let now = at(2026, 5, 10, 9, 0);

        let t1 = apply_increment(None, &challenge, 1, &policy, now);
        assert_eq!((t1.state.progress, t1.state.completed), (1, false));
        assert!(!t1.newly_completed());

        let t2 = apply_increment(Some(&t1.state), &challenge, 1, &policy, now);
        assert_eq!((t2.state.progress, t2.state.completed), (2, false));

        let t3 = apply_increment(Some(&t2.state), &challenge, 2, &policy, now);
        assert_eq!((t3.state.progress, t3.state.completed), (3, true));
        assert!(t3.newly_completed());

        let t4 = apply_increment(Some(&t3.state), &challenge, 5, &policy, now);
        assert_eq!((t4.state.progress, t4.state.completed), (3, true));
        assert!(!t4.newly_completed());
    }

    #[test]
    fn zero_increment_changes_nothing_but_timestamp() {
        let policy = ResetPolicy::default();
        let challenge = goal3();
        let t1 = apply_increment(None, &challenge, 2, &policy, at(2026, 5, 10, 9, 0));
        let t2 = apply_increment(Some(&t1.state), &challenge, 0, &policy, at(2026, 5, 10, 9, 5));
        assert_eq!(t2.state.progress, 2);
        assert!(!t2.state.completed);
        assert!(!t2.newly_completed());
    }

    #[test]
    fn stale_daily_row_restarts_from_zero() {
        let policy = ResetPolicy::default();
        let challenge = daily(3);
        let yesterday = apply_increment(None, &challenge, 3, &policy, at(2026, 5, 9, 20, 0));
        assert!(yesterday.state.completed);

        let today = apply_increment(
            Some(&yesterday.state),
            &challenge,
            1,
            &policy,
            at(2026, 5, 10, 7, 0),
        );
        assert!(today.reset);
        assert_eq!(today.state.progress, 1);
        assert!(!today.state.completed);
        assert!(!today.was_completed);
    }

    #[test]
    fn daily_row_completed_again_after_reset_credits_again() {
        let policy = ResetPolicy::default();
        let challenge = daily(1);
        let day1 = apply_increment(None, &challenge, 1, &policy, at(2026, 5, 9, 8, 0));
        assert!(day1.newly_completed());
        let day2 = apply_increment(Some(&day1.state), &challenge, 1, &policy, at(2026, 5, 10, 8, 0));
        assert!(day2.reset);
        assert!(day2.newly_completed());
    }

    #[test]
    fn daily_row_before_boundary_same_period_is_kept() {
        let policy = ResetPolicy::default();
        let challenge = daily(5);
        // 23:00 and 05:00 next morning are in the same daily period.
        let evening = apply_increment(None, &challenge, 2, &policy, at(2026, 5, 9, 23, 0));
        let early = apply_increment(Some(&evening.state), &challenge, 1, &policy, at(2026, 5, 10, 5, 0));
        assert!(!early.reset);
        assert_eq!(early.state.progress, 3);
    }

    #[test]
    fn weekly_rows_never_reset_here() {
        let policy = ResetPolicy::default();
        let challenge = goal3();
        let old = apply_increment(None, &challenge, 2, &policy, at(2026, 5, 1, 9, 0));
        let later = apply_increment(Some(&old.state), &challenge, 1, &policy, at(2026, 5, 20, 9, 0));
        assert!(!later.reset);
        assert_eq!(later.state.progress, 3);
        assert!(later.newly_completed());
    }

    #[test]
    fn reset_path_is_clamped_to_goal() {
        let policy = ResetPolicy::default();
        let challenge = daily(2);
        let old = apply_increment(None, &challenge, 1, &policy, at(2026, 5, 1, 9, 0));
        let next = apply_increment(Some(&old.state), &challenge, 9, &policy, at(2026, 5, 2, 9, 0));
        assert_eq!(next.state.progress, 2);
        assert!(next.state.completed);
    }

    #[test]
    fn current_view_hides_stale_daily_progress() {
        let policy = ResetPolicy::default();
        let stored = ProgressState {
            progress: 3,
            completed: true,
            last_updated: at(2026, 5, 9, 9, 0),
        };
        let view = current_view(&stored, Cadence::Daily, &policy, at(2026, 5, 10, 9, 0));
        assert_eq!(view.progress, 0);
        assert!(!view.completed);

        let weekly = current_view(&stored, Cadence::Weekly, &policy, at(2026, 5, 10, 9, 0));
        assert_eq!(weekly, stored);
    }

    #[test]
    fn catalog_share_challenge_completes_at_three() {
        let policy = ResetPolicy::default();
        let share = catalog::find("daily_expand_petnet").unwrap();
        let now = at(2026, 5, 10, 9, 0);
        let mut state = None;
        let mut credited = 0;
        for _ in 0..5 {
            let t = apply_increment(state.as_ref(), share, 1, &policy, now);
            if t.newly_completed() {
                credited += 1;
            }
            state = Some(t.state);
        }
        assert_eq!(credited, 1);
        assert_eq!(state.unwrap().progress, 3);
    }
}
