//! Relying-party configuration for the OIDC identity provider.
//!
//! Settings arrive from the environment with every field optional, so a
//! tenant that is missing credentials can still start and serve its public
//! routes. [`RelyingPartySettings::resolve`] turns them into an immutable
//! [`RelyingPartyConfig`] or explains what is missing.

use crate::claims::ClaimsStrategy;
use crate::error::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};

/// The only response type this gateway requests.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Raw relying-party settings as loaded from configuration.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartySettings {
    /// The OIDC issuer URL (e.g., "https://sso.example.com/realms/main").
    /// Used for OIDC discovery.
    #[serde(default)]
    pub issuer_url: Option<String>,
    /// The OAuth2 client ID registered with the provider.
    #[serde(default)]
    pub client_id: Option<String>,
    /// The OAuth2 client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// The redirect URI for the OAuth2 callback (e.g., "http://localhost:3000/callback").
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    pub scopes: String,
    /// Where the identity provider sends the browser after federated logout.
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    /// Where role claims are found.
    #[serde(default)]
    pub claims_strategy: ClaimsStrategy,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            issuer_url: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scopes: default_scopes(),
            post_logout_redirect_uri: None,
            claims_strategy: ClaimsStrategy::default(),
        }
    }
}

impl RelyingPartySettings {
    /// Resolves the settings into a usable configuration.
    ///
    /// `fallback_post_logout_uri` is used when no post-logout redirect was
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is absent or blank, or if a URL
    /// field does not use the http or https scheme.
    pub fn resolve(
        &self,
        fallback_post_logout_uri: &str,
    ) -> Result<RelyingPartyConfig, ConfigurationError> {
        let issuer_url = require_url("issuer_url", self.issuer_url.as_deref())?;
        let client_id = require("client_id", self.client_id.as_deref())?;
        let client_secret = require("client_secret", self.client_secret.as_deref())?;
        let redirect_uri = require_url("redirect_uri", self.redirect_uri.as_deref())?;
        let post_logout_redirect_uri = match self.post_logout_redirect_uri.as_deref() {
            Some(uri) => require_url("post_logout_redirect_uri", Some(uri))?,
            None => fallback_post_logout_uri.to_string(),
        };

        let scopes: Vec<String> = self
            .scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !scopes.iter().any(|s| s == "openid") {
            return Err(ConfigurationError::InvalidValue {
                field: "scopes",
                reason: "the openid scope is required".to_string(),
            }
            .into());
        }

        Ok(RelyingPartyConfig {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            post_logout_redirect_uri,
            claims_strategy: self.claims_strategy,
        })
    }
}

fn require(field: &'static str, value: Option<&str>) -> Result<String, ConfigurationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigurationError::MissingField { field }.into()),
    }
}

fn require_url(field: &'static str, value: Option<&str>) -> Result<String, ConfigurationError> {
    let value = require(field, value)?;
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(value)
    } else {
        Err(ConfigurationError::InvalidValue {
            field,
            reason: format!("'{value}' is not an http(s) URL"),
        }
        .into())
    }
}

/// Immutable relying-party configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingPartyConfig {
    issuer_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    post_logout_redirect_uri: String,
    claims_strategy: ClaimsStrategy,
}

impl RelyingPartyConfig {
    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the registered redirect URI.
    ///
    /// The same value is sent on the authorization request and on the code
    /// exchange.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes to request.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the requested response type.
    #[must_use]
    pub fn response_type(&self) -> &'static str {
        RESPONSE_TYPE_CODE
    }

    /// Returns the post-logout redirect target.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> &str {
        &self.post_logout_redirect_uri
    }

    /// Returns where role claims are read from.
    #[must_use]
    pub fn claims_strategy(&self) -> ClaimsStrategy {
        self.claims_strategy
    }
}
