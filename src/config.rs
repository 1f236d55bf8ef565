//! Portal configuration parsed from environment variables.

use std::time::Duration;

use crate::state::verification::PollTiming;

pub const DEFAULT_API_BASE_URL: &str = "https://api.swecc.org";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DIRECTORY_CACHE_TTL_SECS: u64 = 5 * 60;

/// Errors produced while building [`PortalConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API base URL must not be empty")]
    EmptyBaseUrl,
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Where and how the HTTP layer talks to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeouts: ApiTimeouts,
}

impl ApiConfig {
    /// Config pointing at `base_url` with default timeouts.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts: ApiTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub api: ApiConfig,
    pub verification: PollTiming,
    pub directory_cache_ttl: Duration,
}

impl PortalConfig {
    /// Build typed portal config from environment variables.
    ///
    /// All optional:
    /// - `PORTAL_API_BASE_URL`: default `https://api.swecc.org`
    /// - `PORTAL_REQUEST_TIMEOUT_SECS`: default 30
    /// - `PORTAL_CONNECT_TIMEOUT_SECS`: default 10
    /// - `PORTAL_VERIFY_MAX_ATTEMPTS`: default 3
    /// - `PORTAL_VERIFY_CHECK_INTERVAL_MS`: default 5000
    /// - `PORTAL_VERIFY_PROGRESS_INTERVAL_MS`: default 400
    /// - `PORTAL_VERIFY_SUCCESS_DELAY_MS`: default 1500
    /// - `PORTAL_DIRECTORY_CACHE_TTL_SECS`: default 300
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the base URL is blank, or the attempt
    /// limit or a poll interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`PortalConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("PORTAL_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        let timeouts = ApiTimeouts {
            request_secs: parse_or(&lookup, "PORTAL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "PORTAL_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let defaults = PollTiming::default();
        let max_attempts = parse_or(&lookup, "PORTAL_VERIFY_MAX_ATTEMPTS", defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Zero { var: "PORTAL_VERIFY_MAX_ATTEMPTS" });
        }
        let verification = PollTiming {
            max_attempts,
            check_interval: parse_millis_or(&lookup, "PORTAL_VERIFY_CHECK_INTERVAL_MS", defaults.check_interval),
            progress_interval: parse_millis_or(
                &lookup,
                "PORTAL_VERIFY_PROGRESS_INTERVAL_MS",
                defaults.progress_interval,
            ),
            progress_step: defaults.progress_step,
            success_delay: parse_millis_or(&lookup, "PORTAL_VERIFY_SUCCESS_DELAY_MS", defaults.success_delay),
        };
        if verification.check_interval.is_zero() {
            return Err(ConfigError::Zero { var: "PORTAL_VERIFY_CHECK_INTERVAL_MS" });
        }
        if verification.progress_interval.is_zero() {
            return Err(ConfigError::Zero { var: "PORTAL_VERIFY_PROGRESS_INTERVAL_MS" });
        }

        let directory_cache_ttl = Duration::from_secs(parse_or(
            &lookup,
            "PORTAL_DIRECTORY_CACHE_TTL_SECS",
            DEFAULT_DIRECTORY_CACHE_TTL_SECS,
        ));

        Ok(Self { api: ApiConfig { base_url, timeouts }, verification, directory_cache_ttl })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
