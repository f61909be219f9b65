//! Axum extractor for access-token authentication.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use crate::jwt::{Claims, JwtConfig};

/// Trait for state types that expose the credential configuration.
pub trait HasAuthState {
    fn jwt(&self) -> &JwtConfig;
}

/// Identity established from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    /// Claims from the access token
    pub claims: Claims,
}

impl AuthenticatedAccount {
    /// UUID of the authenticated account.
    pub fn account_uuid(&self) -> &str {
        &self.claims.sub
    }
}

/// Extractor for endpoints that require a valid access token, taken from the
/// access cookie or an `Authorization: Bearer` header. Purely signature and
/// expiry checks; no database round-trip.
pub struct ApiAuth(pub AuthenticatedAccount);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
            .or_else(|| bearer_token(parts))
            .ok_or(ApiAuthError {
                kind: AuthErrorKind::MissingToken,
            })?;

        let claims = state.jwt().verify_access(token).map_err(|e| {
            tracing::debug!(cause = %e, "Access token rejected");
            ApiAuthError {
                kind: AuthErrorKind::InvalidToken,
            }
        })?;

        Ok(ApiAuth(AuthenticatedAccount { claims }))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
