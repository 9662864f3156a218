mod observability;
mod server;
mod sessions;
mod transport;

pub use observability::*;
pub use server::*;
pub use sessions::*;
pub use transport::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error(
                "server.port",
                "port must be greater than 0",
            ));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_upload_bytes == 0 {
            errors.push(ConfigError::error(
                "server.max_upload_bytes",
                "upload limit must be greater than 0",
            ));
        }

        let b = &self.broadcast;
        if b.default_country_code.is_empty()
            || !b.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            errors.push(ConfigError::error(
                "broadcast.default_country_code",
                "country code must be a non-empty digit string",
            ));
        }
        if !b.user_suffix.starts_with('@') {
            errors.push(ConfigError::error(
                "broadcast.user_suffix",
                "suffix must start with '@'",
            ));
        }
        if !b.group_suffix.starts_with('@') {
            errors.push(ConfigError::error(
                "broadcast.group_suffix",
                "suffix must start with '@'",
            ));
        }
        if b.log_capacity == 0 {
            errors.push(ConfigError::error(
                "broadcast.log_capacity",
                "log capacity must be greater than 0",
            ));
        }
        if b.default_interval_secs == 0 {
            errors.push(ConfigError::warning(
                "broadcast.default_interval_secs",
                "interval of 0 is raised to 1 second",
            ));
        }
        if b.user_pacing_ms == 0 || b.group_pacing_ms == 0 {
            errors.push(ConfigError::warning(
                "broadcast.pacing",
                "zero pacing delay sends back-to-back and invites transport rate limiting",
            ));
        }

        if self.reconnect.delay_secs == 0 {
            errors.push(ConfigError::warning(
                "reconnect.delay_secs",
                "zero reconnect delay retries in a tight loop",
            ));
        }

        if self.credentials.root.as_os_str().is_empty() {
            errors.push(ConfigError::error(
                "credentials.root",
                "credential root must not be empty",
            ));
        }

        if self.transport.kind == TransportKind::Bridge {
            let base = &self.transport.bridge.base_url;
            if base.is_empty() {
                errors.push(ConfigError::error(
                    "transport.bridge.base_url",
                    "bridge base_url must not be empty",
                ));
            } else if !base.starts_with("http://") && !base.starts_with("https://") {
                errors.push(ConfigError::error(
                    "transport.bridge.base_url",
                    "bridge base_url must start with http:// or https://",
                ));
            }
        } else {
            errors.push(ConfigError::warning(
                "transport.kind",
                "dry_run transport is active, nothing will be delivered",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }
}
