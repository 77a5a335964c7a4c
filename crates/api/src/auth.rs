//! Bearer token extraction.
//!
//! Structural parse only: whatever follows `Bearer ` is handed to the downstream agent service
//! as-is. Validating the token itself belongs to a session/JWT layer out of scope here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::types::ErrorResponse;

pub struct BearerToken(pub String);

impl BearerToken {
    /// Parses a raw `Authorization` header value into a bearer token.
    pub fn parse(header_value: Option<&str>) -> Result<Self, AuthError> {
        let token = header_value
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        match token {
            Some(token) => Ok(Self(token.to_string())),
            None => Err(AuthError::MissingOrInvalid),
        }
    }
}

pub enum AuthError {
    MissingOrInvalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new("Missing or invalid Authorization header");
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Self::parse(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_bearer_header() {
        let token = BearerToken::parse(Some("Bearer abc123")).unwrap().0;
        assert_eq!(token, "abc123");
    }

    #[test]
    fn rejects_a_missing_header() {
        assert!(BearerToken::parse(None).is_err());
    }

    #[test]
    fn rejects_a_header_without_the_bearer_scheme() {
        assert!(BearerToken::parse(Some("abc123")).is_err());
    }

    #[test]
    fn rejects_an_empty_token() {
        assert!(BearerToken::parse(Some("Bearer ")).is_err());
    }
}
