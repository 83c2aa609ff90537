//! Who a cart belongs to.

use common::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Ownership context that selects the cart backend.
///
/// Guests get a session cart that disappears with the session; registered
/// users get a persistent cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartOwner {
    Guest(SessionId),
    User(UserId),
}

impl CartOwner {
    /// Resolves the owner for a request from the identity provider.
    pub fn resolve(identity: &impl IdentityProvider, session_id: SessionId) -> Self {
        match identity.current_user() {
            Some(user_id) => CartOwner::User(user_id),
            None => CartOwner::Guest(session_id),
        }
    }

    /// Returns the registered user, or `None` for a guest.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::Guest(_) => None,
            CartOwner::User(user_id) => Some(*user_id),
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::Guest(session_id) => write!(f, "guest:{session_id}"),
            CartOwner::User(user_id) => write!(f, "user:{user_id}"),
        }
    }
}

/// Source of the currently authenticated user.
pub trait IdentityProvider {
    /// Returns the authenticated user, or `None` for an anonymous client.
    fn current_user(&self) -> Option<UserId>;
}

impl IdentityProvider for Option<UserId> {
    fn current_user(&self) -> Option<UserId> {
        *self
    }
}
