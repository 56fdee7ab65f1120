//! Client configuration.
//!
//! Defaults suit a local development server; [`ClientConfig::from_env`]
//! overrides them from `NOTELY_*` environment variables.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {key} URL {value:?}: {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API root, e.g. `http://localhost:5000/api`
    pub api_base_url: String,
    /// WebSocket endpoint for both channel scopes
    pub socket_base_url: String,
    /// Where the auth token is persisted (None = memory only)
    pub token_path: Option<PathBuf>,
    /// Keystroke inactivity before `stopTyping` is emitted
    pub typing_timeout: Duration,
    /// Outbound/inbound queue capacity per channel
    pub channel_capacity: usize,
    /// Per-request timeout for the REST client
    pub request_timeout: Duration,
    /// How long closing a channel waits for `leaveNote` to flush
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            socket_base_url: "ws://localhost:5000".to_string(),
            token_path: None,
            typing_timeout: Duration::from_millis(1500),
            channel_capacity: 256,
            request_timeout: Duration::from_secs(15),
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by whichever `NOTELY_*` variables are set.
    ///
    /// Unparseable values are logged and the default is kept.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: env::var("NOTELY_API_BASE_URL").unwrap_or(defaults.api_base_url),
            socket_base_url: env::var("NOTELY_SOCKET_BASE_URL").unwrap_or(defaults.socket_base_url),
            token_path: env::var("NOTELY_TOKEN_PATH")
                .ok()
                .map(PathBuf::from)
                .or(defaults.token_path),
            typing_timeout: Duration::from_millis(try_load(
                "NOTELY_TYPING_TIMEOUT_MS",
                defaults.typing_timeout.as_millis() as u64,
            )),
            channel_capacity: try_load("NOTELY_CHANNEL_CAPACITY", defaults.channel_capacity).max(1),
            request_timeout: Duration::from_secs(try_load(
                "NOTELY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            close_timeout: defaults.close_timeout,
        }
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_url("api_base_url", &self.api_base_url)
    }

    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        parse_url("socket_base_url", &self.socket_base_url)
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            log::warn!("Invalid {key} value {raw:?}: {e}, using default {default}");
            default
        }),
        Err(_) => default,
    }
}
