//! Identity provider abstraction and its startup lifecycle.
//!
//! The provider descriptor is resolved once, in the background, after the
//! listener is up. Until then (and forever, if discovery fails) routes that
//! need it answer "Identity Provider unavailable" while the rest of the
//! gateway keeps serving.

use async_trait::async_trait;
use rolegate_access::{AuthState, RelyingPartyConfig, TokenSet};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

use super::oidc::{OidcClient, OidcError};
use crate::config::ProviderConfig;

/// Operations the gateway needs from an OIDC identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the relying-party configuration the provider was built with.
    fn config(&self) -> &RelyingPartyConfig;

    /// Builds the authorization URL and the state needed to finish the flow.
    fn authorization_url(&self) -> (String, AuthState);

    /// Exchanges an authorization code for a token set.
    async fn exchange_code(&self, code: &str, state: &AuthState) -> Result<TokenSet, OidcError>;

    /// Fetches the user-info claims for an access token.
    async fn fetch_userinfo(&self, tokens: &TokenSet) -> Result<Map<String, Value>, OidcError>;

    /// Builds the federated end-session URL, if the provider supports it.
    fn end_session_url(&self, id_token: &str) -> Option<String>;
}

/// Resolved state of the identity provider.
pub enum ProviderState {
    /// Discovery succeeded.
    Ready(Arc<dyn IdentityProvider>),
    /// Configuration or discovery failed. The reason is logged, never shown
    /// to browsers.
    Failed(String),
}

/// Why the provider cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUnavailable {
    /// Discovery has not finished yet.
    Pending,
    /// Discovery failed, for the given reason.
    Failed(String),
}

/// Publish-once holder for the identity provider.
///
/// Moves from pending to ready or failed exactly once; afterwards it is
/// read-only.
#[derive(Default)]
pub struct ProviderSlot {
    state: OnceLock<ProviderState>,
}

impl ProviderSlot {
    /// Creates a slot that is still waiting for discovery.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Creates a slot holding a ready provider.
    #[must_use]
    pub fn ready(provider: Arc<dyn IdentityProvider>) -> Self {
        let slot = Self::default();
        slot.publish(ProviderState::Ready(provider));
        slot
    }

    /// Publishes the resolved state. Returns false if a state was already
    /// published, in which case the new one is discarded.
    pub fn publish(&self, state: ProviderState) -> bool {
        self.state.set(state).is_ok()
    }

    /// Returns the provider if it is ready.
    ///
    /// # Errors
    ///
    /// Returns why the provider cannot be used.
    pub fn get(&self) -> Result<Arc<dyn IdentityProvider>, ProviderUnavailable> {
        match self.state.get() {
            Some(ProviderState::Ready(provider)) => Ok(provider.clone()),
            Some(ProviderState::Failed(reason)) => Err(ProviderUnavailable::Failed(reason.clone())),
            None => Err(ProviderUnavailable::Pending),
        }
    }

    /// Returns a short status label for health reporting.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self.state.get() {
            Some(ProviderState::Ready(_)) => "ready",
            Some(ProviderState::Failed(_)) => "failed",
            None => "pending",
        }
    }
}

/// Resolves configuration and discovers the provider, retrying on failure.
///
/// Never panics and never returns an error: every outcome is published to
/// the slot.
pub async fn initialize(
    slot: &ProviderSlot,
    config: Result<RelyingPartyConfig, String>,
    provider_config: &ProviderConfig,
) {
    let config = match config {
        Ok(config) => config,
        Err(reason) => {
            tracing::error!(error = %reason, "OIDC client not configured");
            slot.publish(ProviderState::Failed(reason));
            return;
        }
    };

    let attempts = provider_config.discovery_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match OidcClient::discover(config.clone(), provider_config.http_timeout()).await {
            Ok(client) => {
                tracing::info!(
                    issuer = %config.issuer_url(),
                    response_type = config.response_type(),
                    "OIDC client initialized"
                );
                slot.publish(ProviderState::Ready(Arc::new(client)));
                return;
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    attempts,
                    category = e.category(),
                    error = %e,
                    "OIDC discovery attempt failed"
                );
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            tokio::time::sleep(provider_config.discovery_retry_delay()).await;
        }
    }

    tracing::error!(error = %last_error, "Failed to initialize OIDC client");
    slot.publish(ProviderState::Failed(last_error));
}
