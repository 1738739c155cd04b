//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ConfigurationError`: Relying-party settings that cannot be used
//! - `ClaimsError`: Access token payloads that cannot be peeked
//! - `SessionStoreError`: Session storage failures
//! - `AuthorizationError`: Failed session or role checks

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Errors from building a relying-party configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A required setting was not provided.
    MissingField { field: &'static str },
    /// A setting was provided but is unusable.
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "missing required setting: {field}")
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid value for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Errors from peeking at the claims inside an access token.
///
/// These are flow errors: the identity provider handed back a token whose
/// shape we do not understand. They are kept apart from transport failures
/// so operators can tell the two situations apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// The token is not a three-segment compact JWS.
    NotCompactToken { segments: usize },
    /// The payload segment is not valid base64url.
    InvalidEncoding { reason: String },
    /// The payload segment is not valid JSON.
    InvalidJson { reason: String },
    /// The payload decoded to JSON that is not an object.
    NotAnObject,
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCompactToken { segments } => {
                write!(
                    f,
                    "access token is not a compact JWT: expected 3 segments, found {segments}"
                )
            }
            Self::InvalidEncoding { reason } => {
                write!(f, "access token payload is not base64url: {reason}")
            }
            Self::InvalidJson { reason } => {
                write!(f, "access token payload is not JSON: {reason}")
            }
            Self::NotAnObject => {
                write!(f, "access token payload is not a JSON object")
            }
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Errors from session storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// The backing store could not serve the request.
    Unavailable { reason: String },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "session store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for SessionStoreError {}

/// Errors from authorization checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The session carries no token set.
    NotAuthenticated,
    /// The session is authenticated but lacks the required role.
    MissingRole { role: String },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "session is not authenticated"),
            Self::MissingRole { role } => write!(f, "session lacks required role: {role}"),
        }
    }
}

impl std::error::Error for AuthorizationError {}
