//! # Metrics — Prometheus Exposition
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `petnet_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `petnet_progress_updates_total` | Counter | | Accepted `xp/track` calls |
//! | `petnet_challenge_completions_total` | Counter | `challenge` | Completion transitions |
//! | `petnet_xp_credited_total` | Counter | | XP credited to account ledgers |
//! | `petnet_vote_transitions_total` | Counter | `action` | Vote casts, changes and retractions |
//!
//! The `/metrics` endpoint renders the registry on each scrape. Paths are
//! normalised by the API layer before they become labels.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use tracing::warn;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChallengeLabel {
    pub challenge: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VoteActionLabel {
    pub action: String,
}

type HistogramFamily<L> = Family<L, Histogram, fn() -> Histogram>;

/// Thread-safe metrics registry. Every field is atomic and may be updated
/// from any task.
pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: HistogramFamily<HttpLabel>,
    pub progress_updates: Counter,
    pub challenge_completions: Family<ChallengeLabel, Counter>,
    pub xp_credited: Counter,
    pub vote_transitions: Family<VoteActionLabel, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration = HistogramFamily::<HttpLabel>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 12))
        });
        registry.register(
            "petnet_http_request_duration_seconds",
            "HTTP request latency by method and normalised path",
            http_request_duration.clone(),
        );

        let progress_updates = Counter::default();
        registry.register(
            "petnet_progress_updates",
            "Challenge progress increments applied",
            progress_updates.clone(),
        );

        let challenge_completions = Family::<ChallengeLabel, Counter>::default();
        registry.register(
            "petnet_challenge_completions",
            "Challenge completion transitions by challenge id",
            challenge_completions.clone(),
        );

        let xp_credited = Counter::default();
        registry.register(
            "petnet_xp_credited",
            "XP credited to account ledgers",
            xp_credited.clone(),
        );

        let vote_transitions = Family::<VoteActionLabel, Counter>::default();
        registry.register(
            "petnet_vote_transitions",
            "Vote toggle transitions by action",
            vote_transitions.clone(),
        );

        Self {
            registry,
            http_request_duration,
            progress_updates,
            challenge_completions,
            xp_credited,
            vote_transitions,
        }
    }

    pub fn record_completion(&self, challenge: &str, xp: i64) {
        self.challenge_completions
            .get_or_create(&ChallengeLabel {
                challenge: challenge.to_string(),
            })
            .inc();
        self.xp_credited.inc_by(u64::try_from(xp).unwrap_or(0));
    }

    pub fn record_vote(&self, action: &str) {
        self.vote_transitions
            .get_or_create(&VoteActionLabel {
                action: action.to_string(),
            })
            .inc();
    }

    /// Render all metrics in the OpenMetrics text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            warn!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
