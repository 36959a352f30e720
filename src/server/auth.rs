//! Bearer token authentication.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Authentication failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header, or an empty token
    #[error("Token is missing")]
    Missing,
    /// Bad signature, malformed token, or expired
    #[error("Token is invalid")]
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "message": self.to_string() }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity of the caller
    pub username: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
}

/// Verifies HS256 tokens against a shared secret
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for `secret`
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify an `Authorization` header value; the `Bearer ` prefix is optional
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Missing`] for an empty token and
    /// [`AuthError::Invalid`] for anything that fails HS256 verification.
    pub fn verify(&self, header: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            AuthError::Invalid
        })?;
        Ok(AuthenticatedUser {
            username: data.claims.username,
        })
    }
}

/// Caller identity extracted from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// `username` claim
    pub username: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
        let header = header.to_str().map_err(|_| AuthError::Invalid)?;
        Arc::<TokenVerifier>::from_ref(state).verify(header)
    }
}
