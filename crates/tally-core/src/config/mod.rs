//! Remote endpoint configuration.
//!
//! Clients discover the API endpoint from the environment; the engine only
//! ever sees a validated [`RemoteConfig`].

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Validated remote API endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL, scheme-checked, no trailing slash
    pub base_url: String,
    /// Optional bearer token
    pub auth_token: Option<String>,
    /// Per-request timeout; a timeout is an ordinary sync failure
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Create a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;

        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "API base URL must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the configuration from `TALLY_API_URL` / `TALLY_API_TOKEN`.
    ///
    /// Returns `None` when no usable URL is set; the engine then runs in
    /// local-only mode.
    pub fn from_env() -> Option<Self> {
        let url = normalize_text_option(env::var("TALLY_API_URL").ok())?;

        let config = match Self::new(url) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!("Ignoring invalid TALLY_API_URL: {error}");
                return None;
            }
        };

        match normalize_text_option(env::var("TALLY_API_TOKEN").ok()) {
            Some(token) => Some(config.with_auth_token(token)),
            None => Some(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_urls() {
        assert!(RemoteConfig::new("").is_err());
        assert!(RemoteConfig::new("api.example.com").is_err());
        assert!(RemoteConfig::new("ftp://api.example.com").is_err());
    }

    #[test]
    fn new_strips_trailing_slash() {
        let config = RemoteConfig::new("https://api.example.com/").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn with_auth_token_drops_blank_tokens() {
        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_auth_token("   ");
        assert_eq!(config.auth_token, None);

        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_auth_token("secret");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }
}
