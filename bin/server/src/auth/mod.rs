//! Authentication module for the rolegate server.
//!
//! This module provides:
//! - OIDC authentication with an external identity provider
//! - Cookie-referenced, server-side sessions
//! - Authentication and role gates for Axum routes
//!
//! # Authorization Model
//!
//! Authorization is role based. Roles come from the provider's
//! `realm_access.roles` claim, normalized at login and stored with the
//! session. Role changes at the provider take effect on the next login.
//!
//! Gates are layered so that authentication always runs first: a visitor
//! without a session is sent to `/login`, an authenticated user without the
//! role gets a 403.

pub mod middleware;
pub mod oidc;
pub mod provider;
pub mod routes;
pub mod session;

use crate::config::{SessionConfig, TenantConfig};
use axum::extract::FromRef;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::Key;
use rolegate_access::{RbacPolicy, SessionStore};
use std::sync::Arc;

pub use middleware::{AuthenticatedSession, require_authenticated, require_role};
pub use oidc::{OidcClient, OidcError};
pub use provider::{IdentityProvider, ProviderSlot, ProviderState};
pub use routes::{callback, login, logout};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Identity provider, published once discovery completes.
    pub provider: Arc<ProviderSlot>,
    /// Session storage.
    pub sessions: Arc<dyn SessionStore>,
    /// Session configuration.
    pub session_config: Arc<SessionConfig>,
    /// Tenant identity and toggles.
    pub tenant: Arc<TenantConfig>,
    /// Role hierarchy.
    pub rbac: Arc<RbacPolicy>,
    /// Key used to sign the session cookie.
    pub cookie_key: Key,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        provider: Arc<ProviderSlot>,
        sessions: Arc<dyn SessionStore>,
        session_config: SessionConfig,
        tenant: TenantConfig,
        rbac: RbacPolicy,
    ) -> Self {
        let cookie_key = cookie_key(&session_config);
        Self {
            provider,
            sessions,
            session_config: Arc::new(session_config),
            tenant: Arc::new(tenant),
            rbac: Arc::new(rbac),
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Minimum secret length accepted for key derivation.
const MIN_SECRET_LEN: usize = 32;

fn cookie_key(config: &SessionConfig) -> Key {
    match config.secret.as_deref() {
        Some(secret) if secret.len() >= MIN_SECRET_LEN => Key::derive_from(secret.as_bytes()),
        Some(_) => {
            tracing::warn!(
                min_len = MIN_SECRET_LEN,
                "Session secret is too short; using a random signing key"
            );
            Key::generate()
        }
        None => {
            tracing::warn!("No session secret configured; using a random signing key");
            Key::generate()
        }
    }
}

/// Redirects with `302 Found`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
