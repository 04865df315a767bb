//! # Configuration — TOML File with Environment Overrides
//!
//! All sections are optional; a missing file or section falls back to the
//! defaults below. Secrets (`PETNET_JWT_SECRET`, `PETNET_MEDIA_TOKEN`) are read
//! from the environment after the file so they never need to live on disk.
//!
//! ```toml
//! [server]
//! port = 7001
//! request_timeout_secs = 30
//!
//! [auth]
//! audience = "authenticated"
//!
//! [xp]
//! reset_hour = 6
//! reset_utc_offset_minutes = -300
//!
//! [leaderboard]
//! default_limit = 10
//! max_limit = 100
//!
//! [media]
//! backend = "local"
//! local_dir = "media"
//! public_base_url = "http://localhost:7001/media"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::progress::ResetPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub xp: XpConfig,
    pub leaderboard: LeaderboardConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    /// Directory of a static frontend export, served as the router fallback.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 7001,
            request_timeout_secs: 30,
            body_limit_bytes: 8 * 1024 * 1024,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider. `None` disables
    /// signature verification (development only).
    pub jwt_secret: Option<String>,
    pub audience: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: None,
            audience: "authenticated".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XpConfig {
    pub reset_hour: u32,
    pub reset_utc_offset_minutes: i32,
}

impl Default for XpConfig {
    fn default() -> Self {
        XpConfig {
            reset_hour: 6,
            reset_utc_offset_minutes: 0,
        }
    }
}

impl XpConfig {
    pub fn reset_policy(&self) -> Result<ResetPolicy> {
        ResetPolicy::new(self.reset_hour, self.reset_utc_offset_minutes)
            .context("invalid [xp] reset settings")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        LeaderboardConfig {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl LeaderboardConfig {
    /// Resolve a caller-supplied limit: default when absent, clamped to `1..=max_limit`.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    Local,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub backend: MediaBackend,
    /// Root directory for the `local` backend.
    pub local_dir: PathBuf,
    /// Prefix of the URLs handed back to callers.
    pub public_base_url: String,
    /// Upload endpoint for the `http` backend.
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub max_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            backend: MediaBackend::Local,
            local_dir: PathBuf::from("media"),
            public_base_url: "http://localhost:7001/media".to_string(),
            endpoint: None,
            token: None,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                Config::from_toml(&raw)
                    .with_context(|| format!("parsing config file {}", p.display()))?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Config> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("PETNET_JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = Some(secret);
            }
        }
        if let Ok(token) = std::env::var("PETNET_MEDIA_TOKEN") {
            if !token.is_empty() {
                self.media.token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.xp.reset_policy()?;
        if self.leaderboard.max_limit == 0 {
            bail!("leaderboard.max_limit must be at least 1");
        }
        if self.media.backend == MediaBackend::Http && self.media.endpoint.is_none() {
            bail!("media.endpoint is required for the http media backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.xp.reset_hour, 6);
        assert_eq!(config.xp.reset_utc_offset_minutes, 0);
        assert_eq!(config.auth.audience, "authenticated");
        assert_eq!(config.media.backend, MediaBackend::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            "[xp]\nreset_utc_offset_minutes = -300\n[server]\nport = 9000\n",
        )
        .unwrap();
        assert_eq!(config.xp.reset_hour, 6);
        assert_eq!(config.xp.reset_utc_offset_minutes, -300);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout_secs, 30);
    }

    #[test]
    fn rejects_out_of_range_reset_hour() {
        let config = Config::from_toml("[xp]\nreset_hour = 24\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn http_media_requires_endpoint() {
        let config = Config::from_toml("[media]\nbackend = \"http\"\n").unwrap();
        assert!(config.validate().is_err());
        let config = Config::from_toml(
            "[media]\nbackend = \"http\"\nendpoint = \"https://blob.example.com/upload\"\n",
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_media_backend_fails_to_parse() {
        assert!(Config::from_toml("[media]\nbackend = \"ftp\"\n").is_err());
    }

    #[test]
    fn effective_limit_defaults_and_clamps() {
        let lb = LeaderboardConfig::default();
        assert_eq!(lb.effective_limit(None), 10);
        assert_eq!(lb.effective_limit(Some(0)), 1);
        assert_eq!(lb.effective_limit(Some(25)), 25);
        assert_eq!(lb.effective_limit(Some(10_000)), 100);
    }
}
