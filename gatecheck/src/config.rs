//! Configuration management for the scan engine.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The signing secret is the one setting with no default: a gate that cannot
//! verify credential signatures must refuse to start.

use crate::error::ScanError;
use crate::types::ReentryMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pre-shared secret for credential HMAC signatures (required)
    pub signing_secret: String,
    /// Window within which repeated presentations of the same credential are ignored
    pub debounce_window_ms: u64,
    /// Cool-down before a finished scan's in-flight key is released
    pub result_cooldown_secs: u64,
    /// Lifetime of an override session from activation
    pub override_duration_secs: u64,
    /// How long a scan may wait for an operator-supplied override reason
    pub override_reason_timeout_secs: u64,
    /// Upper bound on any single remote backend call
    pub remote_timeout_secs: u64,
    /// Background sync cadence while entries are queued
    pub sync_interval_secs: u64,
    /// Sync attempts per queued scan before it is marked failed and retained
    pub max_sync_attempts: u32,
    /// Durable journal file for offline scans (None = in-memory only)
    pub journal_path: Option<PathBuf>,
    /// Venue re-entry policy
    pub reentry_mode: ReentryMode,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] when `GATECHECK_SIGNING_SECRET`
    /// is missing or empty. All other settings have defaults.
    pub fn from_env() -> Result<Self, ScanError> {
        let signing_secret = env::var("GATECHECK_SIGNING_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ScanError::Configuration("GATECHECK_SIGNING_SECRET is not set".to_string())
            })?;

        Ok(Self {
            signing_secret,
            debounce_window_ms: env::var("GATECHECK_DEBOUNCE_WINDOW_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            result_cooldown_secs: env::var("GATECHECK_RESULT_COOLDOWN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            override_duration_secs: env::var("GATECHECK_OVERRIDE_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            override_reason_timeout_secs: env::var("GATECHECK_OVERRIDE_REASON_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            remote_timeout_secs: env::var("GATECHECK_REMOTE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            sync_interval_secs: env::var("GATECHECK_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            max_sync_attempts: env::var("GATECHECK_MAX_SYNC_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            journal_path: env::var("GATECHECK_JOURNAL_PATH").ok().map(PathBuf::from),
            reentry_mode: env::var("GATECHECK_REENTRY_MODE")
                .ok()
                .and_then(|s| ReentryMode::parse(&s))
                .unwrap_or_default(),
        })
    }

    /// Configuration with defaults and the given secret, for tests and demos.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            signing_secret: secret.into(),
            debounce_window_ms: 1000,
            result_cooldown_secs: 4,
            override_duration_secs: 300,
            override_reason_timeout_secs: 120,
            remote_timeout_secs: 5,
            sync_interval_secs: 5,
            max_sync_attempts: 5,
            journal_path: None,
            reentry_mode: ReentryMode::Single,
        }
    }

    /// Debounce window as a `Duration`
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Result cool-down as a `Duration`
    #[must_use]
    pub const fn result_cooldown(&self) -> Duration {
        Duration::from_secs(self.result_cooldown_secs)
    }

    /// Override session lifetime as a `Duration`
    #[must_use]
    pub const fn override_duration(&self) -> Duration {
        Duration::from_secs(self.override_duration_secs)
    }

    /// Override reason wait bound as a `Duration`
    #[must_use]
    pub const fn override_reason_timeout(&self) -> Duration {
        Duration::from_secs(self.override_reason_timeout_secs)
    }

    /// Remote call bound as a `Duration`
    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Sync cadence as a `Duration`
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// The subset of timing settings the reducer needs at every step.
///
/// Copied out of [`Config`] into the environment so the reducer never reads
/// env vars or the full config.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Debounce window
    pub debounce_window: Duration,
    /// In-flight key release cool-down after a terminal result
    pub result_cooldown: Duration,
    /// Override session lifetime
    pub override_duration: Duration,
    /// Bound on waiting for an operator-supplied override reason
    pub override_reason_timeout: Duration,
    /// Upper bound on any single remote backend call; a timed-out call is
    /// treated as offline, never as a denial
    pub remote_timeout: Duration,
    /// Sync attempts per queued scan before giving up
    pub max_sync_attempts: u32,
}

impl From<&Config> for Timings {
    fn from(config: &Config) -> Self {
        Self {
            debounce_window: config.debounce_window(),
            result_cooldown: config.result_cooldown(),
            override_duration: config.override_duration(),
            override_reason_timeout: config.override_reason_timeout(),
            remote_timeout: config.remote_timeout(),
            max_sync_attempts: config.max_sync_attempts,
        }
    }
}
