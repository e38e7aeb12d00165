//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::net::connection::{BackoffPolicy, DEFAULT_BACKOFF_INITIAL_MS, DEFAULT_BACKOFF_MAX_MS, MIN_BACKOFF_MS};
use crate::net::transport::{Credential, TransportConfig, WireFormat};
use crate::state::board::LocalUser;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: i64 = 15_000;
pub const DEFAULT_AI_TIMEOUT_MS: i64 = 120_000;

/// Error type for configuration parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}` ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },
}

/// Session-level settings: request timeouts and the identity shown to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for ordinary requests; `None` disables timeouts.
    pub request_timeout_ms: Option<i64>,
    /// Deadline for `ai:prompt`, which streams for much longer.
    pub ai_timeout_ms: Option<i64>,
    pub user: LocalUser,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            ai_timeout_ms: Some(DEFAULT_AI_TIMEOUT_MS),
            user: LocalUser::default(),
        }
    }
}

/// Everything needed to run a [`crate::client::SyncClient`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub transport: TransportConfig,
    pub session: SessionConfig,
}

impl SyncConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `COLLAB_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `COLLAB_WS_TICKET`: one-time websocket ticket
    /// - `COLLAB_SESSION_TOKEN`: session cookie, exchanged for a ticket per attempt
    /// - `SYNC_BACKOFF_INITIAL_MS`: default 1000, at least 10
    /// - `SYNC_BACKOFF_MAX_MS`: default 10000
    /// - `SYNC_REQUEST_TIMEOUT_MS`: default 15000, `0` disables
    /// - `SYNC_AI_TIMEOUT_MS`: default 120000, `0` disables
    /// - `SYNC_WIRE_FORMAT`: `binary` (default) or `json`
    /// - `SYNC_USER_NAME`, `SYNC_USER_COLOR`: identity on cursor frames
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is present but unparseable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let base_url = get("COLLAB_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let credential = match (get("COLLAB_WS_TICKET"), get("COLLAB_SESSION_TOKEN")) {
            (Some(ticket), _) => Credential::Ticket(ticket),
            (None, Some(token)) => Credential::SessionToken(token),
            (None, None) => Credential::None,
        };

        let initial_ms = parse_u64("SYNC_BACKOFF_INITIAL_MS", get("SYNC_BACKOFF_INITIAL_MS"), DEFAULT_BACKOFF_INITIAL_MS)?;
        if initial_ms < MIN_BACKOFF_MS {
            return Err(ConfigError::Invalid {
                key: "SYNC_BACKOFF_INITIAL_MS",
                value: initial_ms.to_string(),
                reason: format!("must be at least {MIN_BACKOFF_MS}"),
            });
        }
        let max_ms = parse_u64("SYNC_BACKOFF_MAX_MS", get("SYNC_BACKOFF_MAX_MS"), DEFAULT_BACKOFF_MAX_MS)?;
        let backoff = BackoffPolicy {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms.max(initial_ms)),
            ..BackoffPolicy::default()
        };

        let wire_format = match get("SYNC_WIRE_FORMAT") {
            None => WireFormat::default(),
            Some(raw) => raw.parse::<WireFormat>().map_err(|reason| ConfigError::Invalid {
                key: "SYNC_WIRE_FORMAT",
                value: raw.clone(),
                reason,
            })?,
        };

        let session = SessionConfig {
            request_timeout_ms: parse_timeout(
                "SYNC_REQUEST_TIMEOUT_MS",
                get("SYNC_REQUEST_TIMEOUT_MS"),
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?,
            ai_timeout_ms: parse_timeout("SYNC_AI_TIMEOUT_MS", get("SYNC_AI_TIMEOUT_MS"), DEFAULT_AI_TIMEOUT_MS)?,
            user: LocalUser { name: get("SYNC_USER_NAME"), color: get("SYNC_USER_COLOR") },
        };

        Ok(Self { transport: TransportConfig { base_url, credential, backoff, wire_format }, session })
    }
}

fn parse_u64(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.parse::<u64>()
        .map_err(|err| ConfigError::Invalid { key, value: raw.clone(), reason: err.to_string() })
}

/// Milliseconds, where `0` means "no timeout".
fn parse_timeout(key: &'static str, raw: Option<String>, default: i64) -> Result<Option<i64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Some(default));
    };
    match raw.parse::<i64>() {
        Ok(0) => Ok(None),
        Ok(ms) if ms > 0 => Ok(Some(ms)),
        Ok(_) => Err(ConfigError::Invalid { key, value: raw, reason: "must not be negative".into() }),
        Err(err) => Err(ConfigError::Invalid { key, value: raw, reason: err.to_string() }),
    }
}
