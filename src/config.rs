// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (JWT signing key) are read once at startup and cached in
//! memory for the lifetime of the process.

use std::env;
use std::time::Duration;

/// Thresholds for the live-location publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Foreground sample interval.
    pub foreground_interval: Duration,
    /// Foreground movement threshold in meters.
    pub foreground_distance_m: f64,
    /// Background sample interval (best-effort, OS may throttle).
    pub background_interval: Duration,
    /// Background movement threshold in meters.
    pub background_distance_m: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            foreground_interval: Duration::from_secs(5),
            foreground_distance_m: 10.0,
            background_interval: Duration::from_secs(15),
            background_distance_m: 25.0,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Directory holding the per-device shadow cache files
    pub cache_dir: String,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,

    // --- Protocol tuning ---
    /// Upper bound on any store read used for a go/no-go decision.
    /// On expiry the read falls back to the local cache.
    pub read_timeout: Duration,
    /// Poll interval for document watches on the Firestore adapter.
    pub watch_poll_interval: Duration,
    /// Free trial window measured from account creation, in days.
    pub trial_days: i64,
    /// Live-location publisher thresholds.
    pub publisher: PublisherConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cache_dir: env::var("SHADOW_CACHE_DIR").unwrap_or_else(|_| ".pairtrack".to_string()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            read_timeout: Duration::from_secs(
                env::var("STORE_READ_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(4),
            ),
            watch_poll_interval: Duration::from_secs(
                env::var("WATCH_POLL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            trial_days: env::var("TRIAL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            publisher: PublisherConfig::default(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            cache_dir: std::env::temp_dir()
                .join("pairtrack-test-cache")
                .to_string_lossy()
                .into_owned(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            read_timeout: Duration::from_millis(250),
            watch_poll_interval: Duration::from_millis(50),
            trial_days: 14,
            publisher: PublisherConfig {
                foreground_interval: Duration::from_millis(50),
                foreground_distance_m: 10.0,
                background_interval: Duration::from_millis(150),
                background_distance_m: 25.0,
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(config.read_timeout, Duration::from_secs(4));
        assert_eq!(config.trial_days, 14);
    }

    #[test]
    fn test_publisher_defaults_match_design_values() {
        let p = PublisherConfig::default();
        assert_eq!(p.foreground_interval, Duration::from_secs(5));
        assert_eq!(p.foreground_distance_m, 10.0);
        assert_eq!(p.background_interval, Duration::from_secs(15));
        assert_eq!(p.background_distance_m, 25.0);
    }
}
