//! Configuration management
//!
//! Values are layered: built-in defaults, then `settings.json` in the data
//! directory, then environment variables.
//!
//! ```json
//! {
//!   "cache": { "ttlSeconds": 300, "cleanupIntervalSeconds": 60 },
//!   "skinport": { "addr": "https://api.skinport.com/v1", "rateLimit": 8, ... }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::skinport::{validate_base_url, SKINPORT_PRODUCTION_URL};
use crate::domain::result::{Error, Result};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
/// Skinport allows 8 calls to `/items` per 5 minutes
pub const DEFAULT_RATE_LIMIT: usize = 8;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 300;
/// Upper bound for every configured duration: 30 days
pub const MAX_DURATION_SECS: u64 = 30 * 86_400;
/// Upper bound for the limiter capacity; the limiter keeps one slot per call
pub const MAX_RATE_LIMIT: usize = 10_000;

/// Keys accepted by [`Config::set`], as they appear in settings.json
pub const SETTABLE_KEYS: &[&str] = &[
    "cache.ttlSeconds",
    "cache.cleanupIntervalSeconds",
    "skinport.addr",
    "skinport.clientId",
    "skinport.timeoutSeconds",
    "skinport.rateLimit",
    "skinport.rateWindowSeconds",
];

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    cache: CacheSettings,
    #[serde(default)]
    skinport: SkinportSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cleanup_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkinportSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rate_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rate_window_seconds: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// SkinVault configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_ttl: Duration,
    pub cache_cleanup_interval: Duration,
    pub skinport_addr: String,
    pub skinport_client_id: Option<String>,
    /// Only read from the environment, never written to settings.json
    pub skinport_client_secret: Option<String>,
    pub upstream_timeout: Duration,
    pub rate_limit: usize,
    pub rate_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_cleanup_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            skinport_addr: SKINPORT_PRODUCTION_URL.to_string(),
            skinport_client_id: None,
            skinport_client_secret: None,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
        }
    }
}

impl Config {
    /// Load config from the data directory and the process environment
    ///
    /// Environment variables: `CACHE_TTL`, `CACHE_CLEANUP_INTERVAL`,
    /// `SKINPORT_ADDR`, `SKINPORT_CLIENT_ID`, `SKINPORT_CLIENT_SECRET`,
    /// `UPSTREAM_TIMEOUT`, `SKINPORT_RATE_LIMIT`, `SKINPORT_RATE_WINDOW`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// Load config with a custom environment lookup
    pub fn load_with_env<F>(data_dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match read_settings(data_dir) {
            Err(Error::Config(e)) => {
                log::warn!("Ignoring {}", e);
                SettingsFile::default()
            }
            other => other?,
        };
        let defaults = Self::default();

        let config = Self {
            cache_ttl: secs(
                &env,
                "CACHE_TTL",
                raw.cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
            ),
            cache_cleanup_interval: secs(
                &env,
                "CACHE_CLEANUP_INTERVAL",
                raw.cache
                    .cleanup_interval_seconds
                    .unwrap_or(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            ),
            skinport_addr: non_empty(env("SKINPORT_ADDR"))
                .or(raw.skinport.addr)
                .unwrap_or(defaults.skinport_addr),
            skinport_client_id: non_empty(env("SKINPORT_CLIENT_ID")).or(raw.skinport.client_id),
            skinport_client_secret: non_empty(env("SKINPORT_CLIENT_SECRET")),
            upstream_timeout: secs(
                &env,
                "UPSTREAM_TIMEOUT",
                raw.skinport
                    .timeout_seconds
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            rate_limit: parsed(
                &env,
                "SKINPORT_RATE_LIMIT",
                raw.skinport.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            ),
            rate_window: secs(
                &env,
                "SKINPORT_RATE_WINDOW",
                raw.skinport
                    .rate_window_seconds
                    .unwrap_or(DEFAULT_RATE_WINDOW_SECS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the cache, limiter or HTTP client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.cache_cleanup_interval.is_zero() {
            return Err(Error::Config("cache cleanup interval must be positive".into()));
        }
        if self.upstream_timeout.is_zero() {
            return Err(Error::Config("upstream timeout must be positive".into()));
        }
        if self.rate_limit == 0 {
            return Err(Error::Config("rate limit must allow at least one call".into()));
        }
        if self.rate_limit > MAX_RATE_LIMIT {
            return Err(Error::Config(format!(
                "rate limit of {} calls exceeds the maximum of {}",
                self.rate_limit, MAX_RATE_LIMIT
            )));
        }
        if self.rate_window.is_zero() {
            return Err(Error::Config("rate limit window must be positive".into()));
        }

        let max = Duration::from_secs(MAX_DURATION_SECS);
        for (name, value) in [
            ("cache ttl", self.cache_ttl),
            ("cache cleanup interval", self.cache_cleanup_interval),
            ("upstream timeout", self.upstream_timeout),
            ("rate limit window", self.rate_window),
        ] {
            if value > max {
                return Err(Error::Config(format!(
                    "{} of {}s exceeds the maximum of {}s",
                    name,
                    value.as_secs(),
                    MAX_DURATION_SECS
                )));
            }
        }
        Ok(())
    }

    /// Set one value by its settings.json key, e.g. `cache.ttlSeconds`
    ///
    /// The change is validated before it is applied. An empty value clears
    /// `skinport.clientId`. The client secret cannot be set here.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let mut next = self.clone();
        match key {
            "cache.ttlSeconds" => next.cache_ttl = Duration::from_secs(parse_value(key, value)?),
            "cache.cleanupIntervalSeconds" => {
                next.cache_cleanup_interval = Duration::from_secs(parse_value(key, value)?)
            }
            "skinport.addr" => next.skinport_addr = validate_base_url(value)?,
            "skinport.clientId" => next.skinport_client_id = non_empty(Some(value.to_string())),
            "skinport.timeoutSeconds" => {
                next.upstream_timeout = Duration::from_secs(parse_value(key, value)?)
            }
            "skinport.rateLimit" => next.rate_limit = parse_value(key, value)?,
            "skinport.rateWindowSeconds" => {
                next.rate_window = Duration::from_secs(parse_value(key, value)?)
            }
            "skinport.clientSecret" => {
                return Err(Error::Config(
                    "the client secret is only read from SKINPORT_CLIENT_SECRET".into(),
                ));
            }
            _ => {
                return Err(Error::Config(format!(
                    "unknown key '{}', expected one of: {}",
                    key,
                    SETTABLE_KEYS.join(", ")
                )));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Save config to the data directory
    ///
    /// Keys this crate does not manage are preserved. The client secret is
    /// never written. A malformed settings.json is left untouched and
    /// reported as `Error::Config`.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        let mut settings = read_settings(data_dir)?;

        settings.cache.ttl_seconds = Some(self.cache_ttl.as_secs());
        settings.cache.cleanup_interval_seconds = Some(self.cache_cleanup_interval.as_secs());
        settings.skinport.addr = Some(self.skinport_addr.clone());
        settings.skinport.client_id = self.skinport_client_id.clone();
        settings.skinport.timeout_seconds = Some(self.upstream_timeout.as_secs());
        settings.skinport.rate_limit = Some(self.rate_limit);
        settings.skinport.rate_window_seconds = Some(self.rate_window.as_secs());

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }

    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("malformed {}: {}", settings_path.display(), e)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parsed<T, F>(env: &F, key: &str, fallback: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(env(key)) else {
        return fallback;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Invalid {}={:?}, using {}", key, raw, fallback);
            fallback
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value '{}' for {}", value, key)))
}

fn secs<F>(env: &F, key: &str, fallback: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parsed(env, key, fallback))
}
