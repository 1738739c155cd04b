//! Authentication routes for login, callback, and logout.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use rolegate_access::{SessionId, SessionRecord, normalize};
use serde::Deserialize;

use super::{
    AppState, found,
    oidc::OidcError,
    provider::ProviderUnavailable,
    session::{load_session, removal_cookie, session_cookie},
};

/// Query parameters for the OIDC callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
///
/// The per-login CSRF state, PKCE verifier and nonce are stored in the
/// caller's session, which is created if the request carries none.
pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let provider = state.provider.get().map_err(AuthError::ProviderUnavailable)?;

    let (id, mut record) = match load_session(&state, &jar)
        .await
        .map_err(|e| AuthError::Session(e.to_string()))?
    {
        Some(ctx) => (ctx.id, ctx.record),
        None => (
            SessionId::generate(),
            SessionRecord::new(state.session_config.duration()),
        ),
    };

    let (auth_url, auth_state) = provider.authorization_url();
    record.begin_login(auth_state);

    state
        .sessions
        .put(&id, record)
        .await
        .map_err(|e| AuthError::Session(e.to_string()))?;

    tracing::debug!(session_id = %id, "Redirecting to identity provider");

    Ok((jar.add(session_cookie(&state, &id)), found(&auth_url)))
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
///
/// On success the session is re-keyed: the authenticated record is stored
/// under a fresh identifier and the pre-login one is deleted.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let ctx = load_session(&state, &jar)
        .await
        .map_err(|e| AuthError::failed("session", e))?
        .ok_or_else(|| AuthError::failed("state", "callback without a session"))?;

    let old_id = ctx.id;
    let mut record = ctx.record;

    // The pending state is single use, whatever the outcome.
    let pending = record.take_pending_auth();
    state
        .sessions
        .put(&old_id, record)
        .await
        .map_err(|e| AuthError::failed("session", e))?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        return Err(AuthError::failed(
            "token_exchange",
            format!("provider returned error {error}: {description}"),
        ));
    }

    let pending =
        pending.ok_or_else(|| AuthError::failed("state", "no login in progress for session"))?;

    if query.state.as_deref() != Some(pending.csrf_token.as_str()) {
        return Err(AuthError::failed("state", "state parameter does not match"));
    }

    let code = query
        .code
        .ok_or_else(|| AuthError::failed("state", "callback without an authorization code"))?;

    let provider = state
        .provider
        .get()
        .map_err(|e| AuthError::failed("configuration", format!("provider {e:?}")))?;

    let tokens = provider.exchange_code(&code, &pending).await?;
    let claims = provider.fetch_userinfo(&tokens).await?;
    let userinfo = normalize(provider.config().claims_strategy(), &tokens, claims)
        .map_err(|e| AuthError::failed("claim_decoding", e))?;

    let new_id = SessionId::generate();
    let authenticated =
        SessionRecord::authenticated(tokens, userinfo, state.session_config.duration());
    state
        .sessions
        .put(&new_id, authenticated)
        .await
        .map_err(|e| AuthError::failed("session", e))?;

    if let Err(e) = state.sessions.delete(&old_id).await {
        tracing::warn!(error = %e, session_id = %old_id, "Failed to delete pre-login session");
    }

    tracing::info!(session_id = %new_id, "User authenticated");

    Ok((jar.add(session_cookie(&state, &new_id)), found("/dashboard")))
}

/// Logs out the user by deleting their session.
///
/// If the session held an ID token and the provider supports it, the browser
/// continues to the provider's end-session endpoint. The local session is
/// removed regardless.
pub async fn logout(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let mut id_token = None;

    match load_session(&state, &jar).await {
        Ok(Some(ctx)) => {
            id_token = ctx
                .record
                .token_set()
                .and_then(|tokens| tokens.id_token())
                .map(str::to_string);
            if let Err(e) = state.sessions.delete(&ctx.id).await {
                tracing::error!(error = %e, session_id = %ctx.id, "Failed to delete session");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Failed to load session for logout"),
    }

    let target = id_token
        .and_then(|token| match state.provider.get() {
            Ok(provider) => provider.end_session_url(&token),
            Err(reason) => {
                tracing::warn!(?reason, "Skipping federated logout");
                None
            }
        })
        .unwrap_or_else(|| "/".to_string());

    (jar.remove(removal_cookie(&state)), found(&target))
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    /// The identity provider has not been discovered.
    ProviderUnavailable(ProviderUnavailable),
    /// The login flow failed. The category and detail are logged only.
    Failed {
        category: &'static str,
        detail: String,
    },
    /// The session store failed outside the login flow.
    Session(String),
}

impl AuthError {
    fn failed(category: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Failed {
            category,
            detail: detail.to_string(),
        }
    }

    /// Short category label used in logs.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable(_) => "configuration",
            Self::Failed { category, .. } => *category,
            Self::Session(_) => "session",
        }
    }
}

impl From<OidcError> for AuthError {
    fn from(e: OidcError) -> Self {
        Self::Failed {
            category: e.category(),
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::ProviderUnavailable(reason) => {
                tracing::error!(?reason, "Identity provider unavailable");
                "Identity Provider unavailable"
            }
            Self::Failed { category, detail } => {
                tracing::error!(category = *category, error = %detail, "Authentication failed");
                "Authentication failed"
            }
            Self::Session(msg) => {
                tracing::error!(category = "session", error = %msg, "Session store error");
                "Internal server error"
            }
        };

        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}
