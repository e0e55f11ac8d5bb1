//! The identity collaborator, reduced to what the tracker consumes: the
//! current principal, or none.
//!
//! Sign-in UI, OAuth redirects, and session refresh belong to the host
//! application. The tracker only ever reads "who is signed in right now" to
//! scope storage keys, so that is the entire trait surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// The authenticated identity that scopes all storage paths.
///
/// Only the stable identifier matters (an email-like string in the ReadsAI
/// deployment); it is the namespace root for every document and artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Principal(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Principal(s.to_string())
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Principal(s)
    }
}

/// Supplier of the current principal.
///
/// Implementations wrap whatever auth SDK the host application uses. The
/// trait is read-only by design: the sync core never initiates sign-in or
/// sign-out.
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// The currently signed-in principal, or `None` when signed out.
    fn current_principal(&self) -> Option<Principal>;
}

/// An [`IdentityProvider`] holding a manually managed principal.
///
/// Used by the CLI (principal from a flag) and by tests that need to flip
/// between signed-in and signed-out states.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    principal: RwLock<Option<Principal>>,
}

impl StaticIdentity {
    /// Create a provider already signed in as `principal`.
    pub fn signed_in(principal: impl Into<Principal>) -> Self {
        Self {
            principal: RwLock::new(Some(principal.into())),
        }
    }

    /// Create a provider with nobody signed in.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replace the current principal.
    pub fn sign_in(&self, principal: impl Into<Principal>) {
        *self.principal.write().expect("identity lock poisoned") = Some(principal.into());
    }

    /// Clear the current principal.
    pub fn sign_out(&self) {
        *self.principal.write().expect("identity lock poisoned") = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.principal
            .read()
            .expect("identity lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_round_trip() {
        let identity = StaticIdentity::signed_out();
        assert_eq!(identity.current_principal(), None);

        identity.sign_in("alice@example.com");
        assert_eq!(
            identity.current_principal(),
            Some(Principal::new("alice@example.com"))
        );

        identity.sign_out();
        assert_eq!(identity.current_principal(), None);
    }

    #[test]
    fn principal_display_matches_id() {
        let p = Principal::new("bob@example.com");
        assert_eq!(p.to_string(), "bob@example.com");
        assert_eq!(p.as_str(), "bob@example.com");
    }
}
