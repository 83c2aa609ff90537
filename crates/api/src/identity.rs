//! Cart ownership resolved from request headers.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{SessionId, UserId};
use domain::{CartOwner, IdentityProvider};

use crate::error::ApiError;

/// Header carrying the client session id. Required on cart and checkout routes.
pub const SESSION_HEADER: &str = "x-session-id";

/// Header carrying the authenticated user id, set by the upstream
/// authentication layer. Absent for guests.
pub const USER_HEADER: &str = "x-user-id";

/// Identity as asserted by [`USER_HEADER`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentity {
    user_id: Option<UserId>,
}

impl HeaderIdentity {
    /// Reads the identity from request headers.
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        Ok(Self {
            user_id: optional_header(parts, USER_HEADER)?,
        })
    }
}

impl IdentityProvider for HeaderIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user_id
    }
}

/// Extractor yielding the owner of the cart a request acts on.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub CartOwner);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session_id: SessionId = optional_header(parts, SESSION_HEADER)?
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {SESSION_HEADER} header")))?;
        let identity = HeaderIdentity::from_parts(parts)?;
        Ok(Owner(CartOwner::resolve(&identity, session_id)))
    }
}

fn optional_header<T: FromStr>(parts: &Parts, name: &str) -> Result<Option<T>, ApiError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name} header")))
}
