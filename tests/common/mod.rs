//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use petnet::api::{self, AppState};
use petnet::clock::{Clock, ManualClock};
use petnet::config::Config;
use petnet::media::LocalBlobStore;
use petnet::service::Petnet;
use petnet::store::{MemoryStore, Store};

pub const TEST_SECRET: &str = "test-secret";

/// Sunday 2026-05-10 12:00 UTC, six hours past the default daily reset.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
}

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config
}

/// A service over a fresh in-memory store with a pinned clock.
pub fn memory_service(clock: Arc<ManualClock>) -> Petnet {
    let clock: Arc<dyn Clock> = clock;
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_clock(clock.clone()));
    Petnet::new(store).with_clock(clock)
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub media_dir: tempfile::TempDir,
}

/// Build an Axum test app over an in-memory store. Media uploads land in a
/// temporary directory that lives as long as the returned value.
pub fn build_test_app() -> TestApp {
    let clock = Arc::new(ManualClock::new(start_time()));
    let media_dir = tempfile::tempdir().unwrap();
    let blobs = Arc::new(LocalBlobStore::new(
        media_dir.path(),
        "http://localhost:7001/media",
    ));
    let mut config = test_config();
    config.media.local_dir = media_dir.path().to_path_buf();
    let state = AppState::new(memory_service(clock.clone()), config, blobs);
    TestApp {
        router: api::build_router(state.clone()),
        state,
        clock,
        media_dir,
    }
}

/// Mint an HS256 token the way the identity provider does.
pub fn token_for(sub: &str) -> String {
    token_with(sub, TEST_SECRET, "authenticated")
}

pub fn token_with(sub: &str, secret: &str, audience: &str) -> String {
    let claims = serde_json::json!({
        "sub": sub,
        "aud": audience,
        "exp": Utc::now().timestamp() + 3600,
        "name": format!("{} the human", sub),
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
