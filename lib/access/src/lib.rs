//! Sessions, claims and role-based access control for the rolegate gateway.
//!
//! This crate provides:
//! - Relying-party configuration (`RelyingPartySettings`, `RelyingPartyConfig`)
//! - Claims normalization (`ClaimsStrategy`, `UserInfo`, the access token peek)
//! - Role checks (`RoleSet`, `RoleGate`, `RbacPolicy`)
//! - Session records and storage (`SessionRecord`, `SessionStore`)
//!
//! Nothing here performs network I/O; the server crate drives the OIDC flow
//! and hands the results to these types.
//!
//! # Example
//!
//! ```
//! use rolegate_access::{ClaimsStrategy, RbacPolicy, SessionRecord, TokenSet, normalize};
//! use chrono::Duration;
//! use serde_json::json;
//!
//! let userinfo = json!({ "sub": "u-1", "realm_access": { "roles": ["admin"] } });
//! let serde_json::Value::Object(userinfo) = userinfo else { unreachable!() };
//!
//! let tokens = TokenSet::new("opaque".to_string());
//! let info = normalize(ClaimsStrategy::RolesInUserinfo, &tokens, userinfo).unwrap();
//! let session = SessionRecord::authenticated(tokens, info, Duration::hours(1));
//!
//! let policy = RbacPolicy::default();
//! assert!(policy.gate("moderator").permits(&session.roles()));
//! ```

pub mod claims;
pub mod error;
pub mod relying_party;
pub mod role;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use claims::{ClaimsStrategy, UserInfo, normalize, peek_access_token_claims};
pub use error::{
    AuthorizationError, ClaimsError, ConfigurationError, Result, SessionStoreError,
};
pub use relying_party::{RelyingPartyConfig, RelyingPartySettings};
pub use role::{RbacPolicy, RoleGate, RoleSet};
pub use session::{AuthState, SessionId, SessionRecord, TokenSet};
pub use store::{InMemorySessionStore, SessionStore};
