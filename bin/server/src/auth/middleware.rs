//! Authentication and role gates for Axum.
//!
//! Gates are plain `axum::middleware::from_fn` functions. Compose them with
//! the authentication gate outermost:
//!
//! ```ignore
//! Router::new()
//!     .route("/admin", get(admin))
//!     .route_layer(from_fn_with_state(state.rbac.gate("admin"), require_role))
//!     .route_layer(from_fn_with_state(state.clone(), require_authenticated))
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{DateTime, Utc};
use rolegate_access::{AuthorizationError, RoleGate, RoleSet, SessionId, TokenSet, UserInfo};

use super::{AppState, found, session::load_session};

/// The authenticated session, available to handlers behind
/// [`require_authenticated`] as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub id: SessionId,
    pub tokens: TokenSet,
    pub userinfo: UserInfo,
    pub signed_in_at: DateTime<Utc>,
}

impl AuthenticatedSession {
    /// Returns the roles held by the session.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        self.userinfo.roles()
    }
}

/// Lets the request through only if the session is authenticated.
///
/// A missing or unauthenticated session is redirected to `/login`.
pub async fn require_authenticated(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match load_session(&state, &jar).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let authenticated = session.and_then(|ctx| {
        let signed_in_at = ctx.record.created_at();
        match (ctx.record.token_set(), ctx.record.userinfo()) {
            (Some(tokens), Some(userinfo)) => Some(AuthenticatedSession {
                id: ctx.id,
                tokens: tokens.clone(),
                userinfo: userinfo.clone(),
                signed_in_at,
            }),
            _ => None,
        }
    });

    match authenticated {
        Some(authenticated) => {
            request.extensions_mut().insert(authenticated);
            next.run(request).await
        }
        None => {
            tracing::debug!(
                path = %request.uri().path(),
                reason = %AuthorizationError::NotAuthenticated,
                "Redirecting to login"
            );
            found("/login")
        }
    }
}

/// Lets the request through only if the session satisfies the gate.
///
/// Expects [`require_authenticated`] to have run first. It never redirects:
/// an authenticated user without the role gets a 403, and so does a request
/// that reached this gate without passing authentication.
pub async fn require_role(State(gate): State<RoleGate>, request: Request, next: Next) -> Response {
    let Some(session) = request.extensions().get::<AuthenticatedSession>() else {
        tracing::error!(
            role = gate.role(),
            "Role gate reached without an authenticated session"
        );
        return (StatusCode::FORBIDDEN, gate.denial_message().to_string()).into_response();
    };

    if gate.permits(session.roles()) {
        return next.run(request).await;
    }

    let denial = AuthorizationError::MissingRole {
        role: gate.role().to_string(),
    };
    tracing::warn!(
        session_id = %session.id,
        path = %request.uri().path(),
        reason = %denial,
        "Role gate denied request"
    );
    (StatusCode::FORBIDDEN, gate.denial_message().to_string()).into_response()
}
