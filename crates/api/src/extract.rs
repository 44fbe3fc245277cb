//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{CartIdentity, SessionId, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated user id (a UUID).
pub const USER_HEADER: &str = "x-user-id";

/// Header carrying the anonymous session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// The cart owner of a request. A user id wins over a session id.
#[derive(Debug, Clone)]
pub struct Identity(pub CartIdentity);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::BadRequest(format!("{name} header is not valid text"))),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = header(parts, USER_HEADER)? {
            let uuid = uuid::Uuid::parse_str(user)
                .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_HEADER}: {e}")))?;
            return Ok(Identity(CartIdentity::User(UserId::from_uuid(uuid))));
        }
        if let Some(session) = header(parts, SESSION_HEADER)? {
            return Ok(Identity(CartIdentity::Guest(SessionId::new(session))));
        }
        Err(ApiError::BadRequest(format!(
            "one of {USER_HEADER} or {SESSION_HEADER} is required"
        )))
    }
}
