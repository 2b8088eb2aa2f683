//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup. `main` loads a `.env` file into the
//! process environment before calling [`Config::from_env`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Host serving message content for the Messaging API.
pub const DEFAULT_CONTENT_API_BASE: &str = "https://api-data.line.me";

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Channel secret used as the HMAC key for `X-Line-Signature`
    pub channel_secret: String,

    /// Channel access token sent as a bearer token to the content API
    pub access_token: String,

    /// Base URL of the content API
    pub content_api_base: Url,

    /// Directory where fetched message content is written
    pub content_dir: PathBuf,

    /// Timeout for a single content download in milliseconds
    pub content_fetch_timeout_ms: u64,

    /// Timeout for writing a single downloaded file in milliseconds
    pub content_write_timeout_ms: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("channel_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("content_api_base", &self.content_api_base.as_str())
            .field("content_dir", &self.content_dir)
            .field("content_fetch_timeout_ms", &self.content_fetch_timeout_ms)
            .field("content_write_timeout_ms", &self.content_write_timeout_ms)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel_secret = required(&lookup, "LINE_CHANNEL_SECRET")
            .ok_or(ConfigError::Missing("LINE_CHANNEL_SECRET"))?;

        // The misspelled name is what deployments of this service already use.
        let access_token = required(&lookup, "LINE_ACCSESS_TOKEN")
            .or_else(|| required(&lookup, "LINE_ACCESS_TOKEN"))
            .ok_or(ConfigError::Missing("LINE_ACCSESS_TOKEN"))?;

        let raw_base = lookup("LINE_CONTENT_API_BASE")
            .unwrap_or_else(|| DEFAULT_CONTENT_API_BASE.to_string());
        let content_api_base = Url::parse(&raw_base).map_err(|e| ConfigError::Invalid {
            name: "LINE_CONTENT_API_BASE",
            reason: e.to_string(),
        })?;
        if content_api_base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                name: "LINE_CONTENT_API_BASE",
                reason: "not a base URL".to_string(),
            });
        }

        Ok(Config {
            port: parse_number(&lookup, "PORT", 8080),

            channel_secret,

            access_token,

            content_api_base,

            content_dir: lookup("CONTENT_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("content")),

            content_fetch_timeout_ms: parse_number(&lookup, "CONTENT_FETCH_TIMEOUT_MS", 10_000),

            content_write_timeout_ms: parse_number(&lookup, "CONTENT_WRITE_TIMEOUT_MS", 5_000),
        })
    }

    pub fn content_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.content_fetch_timeout_ms)
    }

    pub fn content_write_timeout(&self) -> Duration {
        Duration::from_millis(self.content_write_timeout_ms)
    }
}

/// Read a variable, treating blank values as unset.
fn required<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            default
        }
    }
}
