//! Homeserver connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the homeserver admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HomeserverConfig {
    /// Base URL of the homeserver, e.g. `https://chat.example.com`.
    pub base_url: String,

    /// Admin API bearer token. Supports `${VAR}` interpolation so the
    /// token can live in the environment rather than on disk.
    pub admin_token: String,

    /// Per-request timeout in seconds. Applies to every call the agent
    /// makes; a timed-out call is treated as a retryable failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// User-Agent header for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page size for room/media enumeration.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("custodian/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_page_size() -> u32 {
    250
}

impl HomeserverConfig {
    /// Per-request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate connection settings.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!(
                "homeserver.base_url is not a valid URL: {}",
                self.base_url
            ));
        }
        if self.admin_token.trim().is_empty() {
            return Err("homeserver.admin_token must not be empty".into());
        }
        if self.timeout_secs == 0 {
            return Err("homeserver.timeout_secs must be positive".into());
        }
        if self.page_size == 0 {
            return Err("homeserver.page_size must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> HomeserverConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(
            r#"
            base_url = "https://chat.example.com"
            admin_token = "secret"
        "#,
        );
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.page_size, 250);
        assert!(config.user_agent.starts_with("custodian/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = parse(
            r#"
            base_url = "not a url"
            admin_token = "secret"
        "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = parse(
            r#"
            base_url = "https://chat.example.com"
            admin_token = "  "
        "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_accessor() {
        let config = parse(
            r#"
            base_url = "https://chat.example.com"
            admin_token = "secret"
            timeout_secs = 5
        "#,
        );
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
