//! Session cookie handling.
//!
//! The browser only ever holds a signed session identifier. Everything else
//! lives in the [`SessionStore`](rolegate_access::SessionStore).

use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use rolegate_access::{SessionId, SessionRecord, SessionStoreError};
use rootcause::Report;
use time::Duration as TimeDuration;

use super::AppState;

/// The session attached to a request, if any.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub record: SessionRecord,
}

impl SessionContext {
    /// Returns true if the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.record.is_authenticated()
    }
}

/// Reads the session identifier from the signed cookie.
///
/// A cookie with a bad signature is treated as absent.
#[must_use]
pub fn session_id(state: &AppState, jar: &SignedCookieJar) -> Option<SessionId> {
    jar.get(&state.session_config.cookie_name)
        .map(|cookie| SessionId::new(cookie.value().to_string()))
}

/// Loads the session referenced by the request's cookie.
///
/// Returns `None` when there is no cookie or the referenced session is gone.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn load_session(
    state: &AppState,
    jar: &SignedCookieJar,
) -> Result<Option<SessionContext>, Report<SessionStoreError>> {
    let Some(id) = session_id(state, jar) else {
        return Ok(None);
    };

    Ok(state
        .sessions
        .get(&id)
        .await?
        .map(|record| SessionContext { id, record }))
}

/// Builds the cookie that carries a session identifier.
#[must_use]
pub fn session_cookie(state: &AppState, id: &SessionId) -> Cookie<'static> {
    Cookie::build((
        state.session_config.cookie_name.clone(),
        id.as_str().to_string(),
    ))
    .path("/")
    .http_only(true)
    .secure(state.session_config.secure_cookies)
    .same_site(SameSite::Lax)
    .max_age(TimeDuration::seconds(
        state.session_config.duration().num_seconds(),
    ))
    .build()
}

/// Builds a cookie that clears the session identifier.
#[must_use]
pub fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.session_config.cookie_name.clone(), ""))
        .path("/")
        .http_only(true)
        .max_age(TimeDuration::ZERO)
        .build()
}
