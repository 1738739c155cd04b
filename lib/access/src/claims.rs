//! Claims normalization.
//!
//! Identity providers differ in where they put role assertions. Some return
//! `realm_access.roles` from the user-info endpoint, others only embed it in
//! the access token. [`normalize`] hides that difference behind a
//! [`ClaimsStrategy`] so the rest of the gateway only ever reads
//! [`UserInfo::roles`].

use crate::error::{ClaimsError, Result};
use crate::role::RoleSet;
use crate::session::TokenSet;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The claim that carries realm-level role assertions.
pub const REALM_ACCESS_CLAIM: &str = "realm_access";

/// Accepts both padded and unpadded base64url, since providers disagree.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where a tenant's identity provider places role claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimsStrategy {
    /// Roles are part of the user-info response.
    #[default]
    RolesInUserinfo,
    /// Roles are only present in the access token payload.
    RolesInAccessToken,
}

/// Normalized user-info claims.
///
/// Holds the provider's claims map as returned (after normalization) plus
/// the role set derived from `realm_access.roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    claims: Map<String, Value>,
    roles: RoleSet,
}

impl UserInfo {
    /// Builds user info from a claims map, deriving the role set.
    ///
    /// A missing or malformed `realm_access.roles` yields an empty role set;
    /// non-string entries are skipped.
    #[must_use]
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        let roles = roles_from_claims(&claims);
        Self { claims, roles }
    }

    /// Returns the normalized role set.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Returns the full claims map.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Returns a string claim by name.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Returns the subject identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// Returns the best available human-readable name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.string_claim("name")
            .or_else(|| self.string_claim("preferred_username"))
            .or_else(|| self.string_claim("email"))
    }

    /// Returns the email address, if provided.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.string_claim("email")
    }
}

fn roles_from_claims(claims: &Map<String, Value>) -> RoleSet {
    claims
        .get(REALM_ACCESS_CLAIM)
        .and_then(|v| v.get("roles"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Reads the claims payload of a compact JWT without verifying it.
///
/// This is a peek, not a validation. The token's signature, issuer, audience
/// and expiry are NOT checked. It must only be used on tokens that were just
/// received from the provider's token endpoint over a trusted channel, and
/// only to read display and role metadata.
///
/// # Errors
///
/// Returns an error if the token does not have exactly three segments, or
/// if the payload segment is not base64url-encoded JSON object.
pub fn peek_access_token_claims(token: &str) -> Result<Map<String, Value>, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::NotCompactToken {
            segments: segments.len(),
        }
        .into());
    }

    let payload = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|e| ClaimsError::InvalidEncoding {
            reason: e.to_string(),
        })?;

    let value: Value = serde_json::from_slice(&payload).map_err(|e| ClaimsError::InvalidJson {
        reason: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ClaimsError::NotAnObject.into()),
    }
}

/// Produces canonical user info from a token set and a user-info response.
///
/// With [`ClaimsStrategy::RolesInUserinfo`] the response is used as is.
/// With [`ClaimsStrategy::RolesInAccessToken`] the access token's
/// `realm_access` claim replaces whatever the response carried under that
/// name; if the token has none, the claim is removed and the role set is
/// empty.
///
/// # Errors
///
/// Returns an error if the access token has to be peeked and is malformed.
pub fn normalize(
    strategy: ClaimsStrategy,
    token_set: &TokenSet,
    mut userinfo: Map<String, Value>,
) -> Result<UserInfo, ClaimsError> {
    match strategy {
        ClaimsStrategy::RolesInUserinfo => {}
        ClaimsStrategy::RolesInAccessToken => {
            let mut token_claims = peek_access_token_claims(token_set.access_token())?;
            match token_claims.remove(REALM_ACCESS_CLAIM) {
                Some(realm_access) => {
                    userinfo.insert(REALM_ACCESS_CLAIM.to_string(), realm_access);
                }
                None => {
                    userinfo.remove(REALM_ACCESS_CLAIM);
                }
            }
        }
    }

    Ok(UserInfo::from_claims(userinfo))
}
