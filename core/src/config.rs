//! Client configuration.
//!
//! Values default to something usable out of the box and can be overridden
//! from the environment, the same way the mock server picks up `PORT`.

use std::time::Duration;

/// Default upper bound on buffered response bodies (10 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Default bound on a cancelable call that has no other timeout.
pub const DEFAULT_CANCEL_FALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const ENV_TIMEOUT_MS: &str = "HTTPC_TIMEOUT_MS";
const ENV_MAX_RESPONSE_BYTES: &str = "HTTPC_MAX_RESPONSE_BYTES";
const ENV_USER_AGENT: &str = "HTTPC_USER_AGENT";
const ENV_CANCEL_FALLBACK_TIMEOUT_MS: &str = "HTTPC_CANCEL_FALLBACK_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Hard cap on a whole round-trip, independent of any context deadline.
    pub timeout: Option<Duration>,
    /// Bodies longer than this fail with `Error::BodyTooLarge`.
    pub max_response_bytes: u64,
    pub user_agent: String,
    /// Applied to calls on a cancelable context when neither the context nor
    /// `timeout` bounds them, so a call abandoned on cancel still ends.
    pub cancel_fallback_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            user_agent: concat!("httpc/", env!("CARGO_PKG_VERSION")).to_string(),
            cancel_fallback_timeout: DEFAULT_CANCEL_FALLBACK_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `HTTPC_TIMEOUT_MS`, `HTTPC_MAX_RESPONSE_BYTES`,
    /// `HTTPC_USER_AGENT` and `HTTPC_CANCEL_FALLBACK_TIMEOUT_MS`. Unparsable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Some(Duration::from_millis(ms)),
                Err(err) => tracing::warn!(key = ENV_TIMEOUT_MS, value = %raw, %err, "ignoring invalid value"),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_RESPONSE_BYTES) {
            match raw.trim().parse::<u64>() {
                Ok(limit) => config.max_response_bytes = limit,
                Err(err) => tracing::warn!(key = ENV_MAX_RESPONSE_BYTES, value = %raw, %err, "ignoring invalid value"),
            }
        }
        if let Some(raw) = lookup(ENV_CANCEL_FALLBACK_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.cancel_fallback_timeout = Duration::from_millis(ms),
                Ok(_) => tracing::warn!(key = ENV_CANCEL_FALLBACK_TIMEOUT_MS, "ignoring zero timeout"),
                Err(err) => tracing::warn!(key = ENV_CANCEL_FALLBACK_TIMEOUT_MS, value = %raw, %err, "ignoring invalid value"),
            }
        }
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|agent| !agent.is_empty()) {
            config.user_agent = agent;
        }

        config
    }
}
