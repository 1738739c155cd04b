//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for one gateway
//! tenant, loaded via the `config` crate from an optional TOML file plus
//! environment variables.
//!
//! Every relying-party field is optional at load time. A tenant with
//! missing credentials still starts; its login routes report the identity
//! provider as unavailable. See
//! [`RelyingPartySettings`](rolegate_access::RelyingPartySettings).

use rolegate_access::{RbacPolicy, RelyingPartySettings};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_ENV: &str = "ROLEGATE_CONFIG";

/// Prefix for configuration environment variables.
///
/// Nested keys use `__`, e.g. `ROLEGATE_OIDC__CLIENT_ID`.
pub const ENV_PREFIX: &str = "ROLEGATE";

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ListenConfig,

    /// Tenant identity and feature toggles.
    #[serde(default)]
    pub tenant: TenantConfig,

    /// OIDC relying-party settings.
    #[serde(default)]
    pub oidc: RelyingPartySettings,

    /// Outbound HTTP behaviour for provider calls.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Role hierarchy.
    #[serde(default)]
    pub rbac: RbacPolicy,
}

/// Where the gateway listens.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    /// Returns the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default landing page after federated logout.
    #[must_use]
    pub fn default_post_logout_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }
}

/// Per-tenant identity and feature toggles.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Name shown in page titles and attached to log lines.
    #[serde(default = "default_tenant_name")]
    pub name: String,

    /// Whether the `/admin` and `/moderator` views are served.
    #[serde(default = "default_role_views")]
    pub role_views: bool,
}

fn default_tenant_name() -> String {
    "gateway".to_string()
}

fn default_role_views() -> bool {
    true
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            name: default_tenant_name(),
            role_views: default_role_views(),
        }
    }
}

/// Timeouts and retries for calls to the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Timeout applied to discovery, code exchange and user-info requests.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// How many times discovery is attempted at startup.
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    /// Delay between discovery attempts, in seconds.
    #[serde(default = "default_discovery_retry_seconds")]
    pub discovery_retry_seconds: u64,
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_discovery_attempts() -> u32 {
    3
}

fn default_discovery_retry_seconds() -> u64 {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: default_http_timeout_seconds(),
            discovery_attempts: default_discovery_attempts(),
            discovery_retry_seconds: default_discovery_retry_seconds(),
        }
    }
}

impl ProviderConfig {
    /// Returns the outbound request timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Returns the delay between discovery attempts.
    #[must_use]
    pub fn discovery_retry_delay(&self) -> Duration {
        Duration::from_secs(self.discovery_retry_seconds)
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret the session cookie signing key is derived from.
    /// Must be at least 32 bytes; otherwise a random key is used.
    #[serde(default)]
    pub secret: Option<String>,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Off by default; turn on when deployed behind TLS.
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_cookie_name() -> String {
    "rolegate_session".to_string()
}

fn default_session_duration_minutes() -> i64 {
    60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_cookie_name(),
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: false,
        }
    }
}

/// Longest accepted session lifetime, in minutes (about 23 months).
pub const MAX_SESSION_DURATION_MINUTES: i64 = 1_000_000;

impl SessionConfig {
    /// Checks values that would otherwise break every login.
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_minutes` is outside
    /// `1..=MAX_SESSION_DURATION_MINUTES`.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(1..=MAX_SESSION_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(config::ConfigError::Message(format!(
                "session.duration_minutes must be between 1 and {MAX_SESSION_DURATION_MINUTES}, got {}",
                self.duration_minutes
            )));
        }
        Ok(())
    }

    /// Returns the session lifetime, clamped to the accepted range.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes.clamp(1, MAX_SESSION_DURATION_MINUTES))
    }
}

impl ServerConfig {
    /// Loads configuration from the optional file named by
    /// `ROLEGATE_CONFIG`, then from `ROLEGATE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a value has the wrong
    /// type, or the session lifetime is out of range. Missing relying-party
    /// values are not an error here.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()
            .and_then(|config| {
                config.session.validate()?;
                Ok(config)
            })
    }
}
