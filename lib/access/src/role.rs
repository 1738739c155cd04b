//! Role claims and role gates for access control.
//!
//! Roles come from the identity provider's `realm_access.roles` claim. A
//! [`RoleGate`] names the role a route requires together with the roles that
//! supersede it, so `admin` can satisfy a `moderator` check without the
//! provider having to assign both.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Set of role names held by a session.
///
/// An empty set grants nothing. Absence of a role claim is always
/// represented as the empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: BTreeSet<String>,
}

impl RoleSet {
    /// Creates an empty role set (no roles).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true if the set contains the given role.
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns true if no roles are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Iterates over the roles in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Returns the number of roles held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A single role requirement placed in front of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    role: String,
    superseded_by: Vec<String>,
    denial_message: String,
}

impl RoleGate {
    /// Creates a gate that only the exact role satisfies.
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        let role = role.into();
        let denial_message = format!("Forbidden: {role} role required");
        Self {
            role,
            superseded_by: Vec::new(),
            denial_message,
        }
    }

    /// Adds roles that also satisfy this gate.
    #[must_use]
    pub fn superseded_by<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for role in roles {
            let role = role.into();
            if role != self.role && !self.superseded_by.contains(&role) {
                self.superseded_by.push(role);
            }
        }
        self
    }

    /// Sets the message shown when the gate denies a request.
    #[must_use]
    pub fn with_denial_message(mut self, message: impl Into<String>) -> Self {
        self.denial_message = message.into();
        self
    }

    /// Returns the required role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Returns the roles that supersede the required role.
    #[must_use]
    pub fn superseding_roles(&self) -> &[String] {
        &self.superseded_by
    }

    /// Returns the message shown on denial.
    #[must_use]
    pub fn denial_message(&self) -> &str {
        &self.denial_message
    }

    /// Returns true if the role set satisfies this gate.
    #[must_use]
    pub fn permits(&self, roles: &RoleSet) -> bool {
        roles.contains(&self.role) || self.superseded_by.iter().any(|r| roles.contains(r))
    }
}

/// Role hierarchy configuration.
///
/// Maps a role to the roles that satisfy it in addition to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacPolicy {
    #[serde(default = "default_supersedes")]
    supersedes: HashMap<String, Vec<String>>,
}

fn default_supersedes() -> HashMap<String, Vec<String>> {
    HashMap::from([("moderator".to_string(), vec!["admin".to_string()])])
}

impl Default for RbacPolicy {
    fn default() -> Self {
        Self {
            supersedes: default_supersedes(),
        }
    }
}

impl RbacPolicy {
    /// Creates a policy from an explicit hierarchy.
    #[must_use]
    pub fn new(supersedes: HashMap<String, Vec<String>>) -> Self {
        Self { supersedes }
    }

    /// Builds the gate for a role, including any superseding roles.
    #[must_use]
    pub fn gate(&self, role: &str) -> RoleGate {
        let gate = RoleGate::new(role);
        match self.supersedes.get(role) {
            Some(superseding) => gate.superseded_by(superseding.iter().cloned()),
            None => gate,
        }
    }
}
