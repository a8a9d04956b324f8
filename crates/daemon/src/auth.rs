// SPDX-License-Identifier: MIT

//! Bearer/JWT authentication.
//! Tokens are HS256-signed against `FLWD_JWT_SECRET`; the `sub` claim
//! becomes the principal id and the space-separated `scope` claim becomes
//! its granted [`Scope`] set.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use flowd_core::{Principal, Scope};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    scope: String,
}

/// Extractor for an authenticated caller. Failing to extract this (no
/// header, malformed bearer, bad/expired signature) yields a `401` with
/// `WWW-Authenticate: Bearer`.
pub struct AuthenticatedPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    SharedState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared = SharedState::from_ref(state);
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?.trim();
        if token.is_empty() {
            return Err(ApiError::Unauthorized);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let key = DecodingKey::from_secret(shared.config.jwt_secret.as_bytes());
        let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            ApiError::Unauthorized
        })?;

        Ok(AuthenticatedPrincipal(Principal::from_claim_strings(data.claims.sub, &data.claims.scope)))
    }
}

/// Enforce that `principal` carries `scope`, else a `403`.
pub fn require_scope(principal: &Principal, scope: Scope) -> ApiResult<()> {
    if principal.has(scope) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(scope.as_str()))
    }
}
