//! Configuration module for the custodian agent.
//!
//! The agent is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [homeserver]
//! base_url = "https://chat.example.com"
//! admin_token = "${CUSTODIAN_ADMIN_TOKEN}"
//!
//! [cleanup.retention]
//! max_age_days = 30
//! ```

mod cleanup;
mod execution;
mod homeserver;
mod observability;

use std::path::Path;

pub use cleanup::*;
pub use execution::*;
pub use homeserver::*;
pub use observability::*;
use serde::{Deserialize, Serialize};

/// Root configuration for the custodian agent.
///
/// The `[homeserver]` section is required; everything else has defaults
/// so a minimal configuration is two lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustodianConfig {
    /// Homeserver connection settings.
    pub homeserver: HomeserverConfig,

    /// Cleanup policy settings.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Plan execution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl CustodianConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: CustodianConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for structural consistency.
    ///
    /// Policy semantics (age thresholds, pressure targets) are validated by
    /// the policy evaluator so that a malformed policy surfaces as an
    /// evaluation failure before any deletion is attempted.
    fn validate(&self) -> Result<(), ConfigError> {
        self.homeserver.validate().map_err(ConfigError::Validation)?;
        self.execution.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references from the environment.
///
/// Variables inside TOML comments are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let whole = cap.get(0).expect("group 0 always present");

            // Skip references that appear inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
