//! Configuration file loading for the portal.
//!
//! This module provides types and functions for loading and validating the
//! portal configuration from TOML files. Every field has a default, so an
//! empty or missing `portal.toml` yields a runnable development setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// The configuration parsed but contains unusable values.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// HTTP server settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path to the SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Public base URL used when building links in emails and notifications.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Lifetime of a login session in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("data/portal.db")
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_session_ttl_hours() -> u64 {
    24 * 7
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database: default_database(),
            public_url: default_public_url(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl ServerConfig {
    /// Session lifetime as a [`Duration`].
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }
}

/// Magic-link code settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MagicLinkConfig {
    /// Minutes a code stays valid after it is issued.
    #[serde(default = "default_code_ttl_minutes")]
    pub code_ttl_minutes: u64,
    /// Number of digits in a code.
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Wrong guesses allowed against one code before it is locked.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sender address for code emails.
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

fn default_code_ttl_minutes() -> u64 {
    15
}

fn default_code_length() -> usize {
    6
}

fn default_max_attempts() -> u32 {
    5
}

fn default_from_address() -> String {
    "Telehealth Portal <no-reply@localhost>".to_string()
}

impl Default for MagicLinkConfig {
    fn default() -> Self {
        Self {
            code_ttl_minutes: default_code_ttl_minutes(),
            code_length: default_code_length(),
            max_attempts: default_max_attempts(),
            from_address: default_from_address(),
        }
    }
}

impl MagicLinkConfig {
    /// Code lifetime as a [`Duration`].
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_minutes * 60)
    }
}

/// A fixed-window rate limit: at most `max` hits per `window_secs`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Hits admitted per window.
    pub max: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Bucket used for magic-link code requests, keyed per email.
pub const MAGIC_LINK_BUCKET: &str = "magic_link";
/// Bucket used for code verification attempts, keyed per email.
pub const VERIFY_BUCKET: &str = "verify";
/// Bucket used for general API traffic, keyed per client.
pub const API_BUCKET: &str = "api";

fn default_rate_limits() -> HashMap<String, RateLimitConfig> {
    HashMap::from([
        (
            MAGIC_LINK_BUCKET.to_string(),
            RateLimitConfig {
                max: 5,
                window_secs: 900,
            },
        ),
        (
            VERIFY_BUCKET.to_string(),
            RateLimitConfig {
                max: 10,
                window_secs: 900,
            },
        ),
        (
            API_BUCKET.to_string(),
            RateLimitConfig {
                max: 120,
                window_secs: 60,
            },
        ),
    ])
}

/// Connection settings for one outbound HTTP service.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ServiceConfig {
    /// Base URL of the service API. An empty value disables the service.
    #[serde(default)]
    pub base_url: String,
    /// Bearer token sent with each request, if the service needs one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name, sender number or other service-specific setting.
    #[serde(default)]
    pub option: Option<String>,
}

impl ServiceConfig {
    /// Whether a base URL has been configured.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

/// Outbound integrations.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegrationsConfig {
    /// Provider registry lookup (NPPES style).
    #[serde(default = "default_registry")]
    pub registry: ServiceConfig,
    /// Video room provisioning.
    #[serde(default)]
    pub video: ServiceConfig,
    /// OpenAI-compatible chat completion endpoint; `option` is the model.
    #[serde(default)]
    pub llm: ServiceConfig,
    /// Fax delivery; `option` is the sender number.
    #[serde(default)]
    pub fax: ServiceConfig,
    /// Transactional email delivery.
    #[serde(default)]
    pub email: ServiceConfig,
}

fn default_registry() -> ServiceConfig {
    ServiceConfig {
        base_url: "https://npiregistry.cms.hhs.gov/api".to_string(),
        api_key: None,
        option: None,
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            video: ServiceConfig::default(),
            llm: ServiceConfig::default(),
            fax: ServiceConfig::default(),
            email: ServiceConfig::default(),
        }
    }
}

/// Retention and scheduling for the cleanup worker.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CleanupConfig {
    /// Seconds between cleanup ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Days read notifications are kept.
    #[serde(default = "default_notification_retention_days")]
    pub notification_retention_days: u32,
    /// Days audit entries are kept; 0 keeps them forever.
    #[serde(default)]
    pub audit_retention_days: u32,
    /// Minutes before a consultation at which reminders go out.
    #[serde(default = "default_reminder_lead_minutes")]
    pub reminder_lead_minutes: u32,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_notification_retention_days() -> u32 {
    30
}

fn default_reminder_lead_minutes() -> u32 {
    60
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            notification_retention_days: default_notification_retention_days(),
            audit_retention_days: 0,
            reminder_lead_minutes: default_reminder_lead_minutes(),
        }
    }
}

/// Main portal configuration structure.
///
/// Uses `portal.toml` in the current directory by default.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PortalConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Magic-link code settings.
    #[serde(default)]
    pub magic_link: MagicLinkConfig,
    /// Named rate-limit buckets. Missing buckets fall back to the defaults.
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, RateLimitConfig>,
    /// Outbound services.
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    /// Cleanup worker settings.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl PortalConfig {
    /// Loads the portal configuration from `portal.toml`.
    ///
    /// Returns a default configuration if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// [`ConfigError::ParseError`] if it contains invalid TOML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        if config_path.exists() {
            Self::from_path(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads and validates the configuration at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        PathBuf::from("portal.toml")
    }

    /// Looks up a rate-limit bucket, falling back to the built-in default
    /// for well-known bucket names.
    pub fn rate_limit(&self, bucket: &str) -> Option<RateLimitConfig> {
        self.rate_limits
            .get(bucket)
            .copied()
            .or_else(|| default_rate_limits().get(bucket).copied())
    }

    /// Checks values that would make the portal unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.magic_link.code_length == 0 || self.magic_link.code_length > 12 {
            return Err(ConfigError::Invalid(format!(
                "magic_link.code_length must be between 1 and 12, got {}",
                self.magic_link.code_length
            )));
        }
        if self.magic_link.code_ttl_minutes == 0 {
            return Err(ConfigError::Invalid(
                "magic_link.code_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.server.session_ttl_hours == 0 {
            return Err(ConfigError::Invalid(
                "server.session_ttl_hours must be positive".to_string(),
            ));
        }
        for (name, limit) in &self.rate_limits {
            if limit.max == 0 || limit.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limits.{name} needs a positive max and window_secs"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_toml_config() {
        let toml_content = r#"
[server]
bind = "0.0.0.0:8080"
database = "/var/lib/portal/portal.db"
session_ttl_hours = 12

[magic_link]
code_ttl_minutes = 10
code_length = 8

[rate_limits.magic_link]
max = 3
window_secs = 600

[integrations.video]
base_url = "https://api.daily.co/v1"
api_key = "secret"

[integrations.llm]
base_url = "https://api.openai.com/v1"
option = "gpt-4o-mini"
"#;

        let config = PortalConfig::from_toml(toml_content).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(
            config.server.database,
            PathBuf::from("/var/lib/portal/portal.db")
        );
        assert_eq!(config.server.session_ttl(), Duration::from_secs(12 * 3600));
        assert_eq!(config.magic_link.code_ttl(), Duration::from_secs(600));
        assert_eq!(config.magic_link.code_length, 8);
        assert_eq!(config.magic_link.max_attempts, 5); // default

        let magic = config.rate_limit(MAGIC_LINK_BUCKET).unwrap();
        assert_eq!(magic.max, 3);
        assert_eq!(magic.window_secs, 600);

        assert!(config.integrations.video.is_configured());
        assert_eq!(config.integrations.video.api_key.as_deref(), Some("secret"));
        assert_eq!(config.integrations.llm.option.as_deref(), Some("gpt-4o-mini"));
        assert!(!config.integrations.fax.is_configured());
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = PortalConfig::from_toml("").unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.magic_link.code_ttl_minutes, 15);
        assert_eq!(config.magic_link.code_length, 6);
        assert_eq!(config.cleanup.interval_secs, 300);
        assert_eq!(config.cleanup.audit_retention_days, 0);
        assert!(config.integrations.registry.is_configured());
        assert!(!config.integrations.email.is_configured());
    }

    #[test]
    fn test_partial_rate_limits_fall_back_to_defaults() {
        let config = PortalConfig::from_toml(
            r#"
[rate_limits.api]
max = 30
window_secs = 10
"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit(API_BUCKET).unwrap().max, 30);
        // Not present in the file, still resolvable
        let verify = config.rate_limit(VERIFY_BUCKET).unwrap();
        assert_eq!(verify.max, 10);
        assert_eq!(verify.window_secs, 900);
        assert!(config.rate_limit("unknown").is_none());
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let result = PortalConfig::from_toml(
            r#"
[rate_limits.api]
max = 0
window_secs = 60
"#,
        );

        match result {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("rate_limits.api")),
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_code_length() {
        let result = PortalConfig::from_toml("[magic_link]\ncode_length = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = PortalConfig::from_toml("[server\nbind = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = PortalConfig::from_path(Path::new("/nonexistent/portal.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
