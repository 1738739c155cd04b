//! Session records for browser sessions.
//!
//! A session record is keyed by an opaque [`SessionId`] carried in a signed
//! cookie. It moves through three shapes:
//! - empty, with a login in flight (`pending_auth` set)
//! - authenticated (`token_set` and `userinfo` set together)
//! - gone (deleted on logout or expiry)

use crate::claims::UserInfo;
use crate::role::RoleSet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key of a [`SessionRecord`].
///
/// This is the only value that travels in the cookie. The cookie signature,
/// not the id itself, is what keeps it from being forged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier read back from a cookie.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh identifier. ULIDs sort by creation time, which keeps
    /// log lines for one browser easy to follow.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tokens returned by the provider's token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    access_token: String,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Creates a token set holding only an access token.
    #[must_use]
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            id_token: None,
            token_type: None,
            expires_at: None,
        }
    }

    /// Sets the raw ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    /// Sets the token type (usually "Bearer").
    #[must_use]
    pub fn with_token_type(mut self, token_type: Option<String>) -> Self {
        self.token_type = token_type;
        self
    }

    /// Sets the access token expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the raw ID token, if one was issued.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Returns the token type, if reported.
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// Returns when the access token expires, if reported.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Per-login values that must survive the round trip to the provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// CSRF token echoed back as the `state` parameter.
    pub csrf_token: String,
    /// PKCE code verifier.
    pub pkce_verifier: String,
    /// Nonce expected in the ID token.
    pub nonce: String,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}

/// Server-side state of one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    token_set: Option<TokenSet>,
    userinfo: Option<UserInfo>,
    pending_auth: Option<AuthState>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates an empty, unauthenticated record valid for `duration`.
    ///
    /// A lifetime reaching past the representable range saturates.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_set: None,
            userinfo: None,
            pending_auth: None,
            created_at: now,
            expires_at: now
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Creates an authenticated record in one step.
    #[must_use]
    pub fn authenticated(token_set: TokenSet, userinfo: UserInfo, duration: Duration) -> Self {
        let mut record = Self::new(duration);
        record.token_set = Some(token_set);
        record.userinfo = Some(userinfo);
        record
    }

    /// Records a login in flight, replacing any earlier one.
    pub fn begin_login(&mut self, auth_state: AuthState) {
        self.pending_auth = Some(auth_state);
    }

    /// Removes and returns the pending login state.
    pub fn take_pending_auth(&mut self) -> Option<AuthState> {
        self.pending_auth.take()
    }

    /// Returns true if both the token set and the user info are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token_set.is_some() && self.userinfo.is_some()
    }

    /// Returns the token set, if authenticated.
    #[must_use]
    pub fn token_set(&self) -> Option<&TokenSet> {
        self.token_set.as_ref()
    }

    /// Returns the user info, if authenticated.
    #[must_use]
    pub fn userinfo(&self) -> Option<&UserInfo> {
        self.userinfo.as_ref()
    }

    /// Returns the roles held; empty when unauthenticated.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        match (&self.token_set, &self.userinfo) {
            (Some(_), Some(info)) => info.roles().clone(),
            _ => RoleSet::none(),
        }
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
