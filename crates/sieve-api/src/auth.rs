//! Bearer token authentication.
//!
//! Requests carry an HS256 JWT validated against the configured secret,
//! audience, and issuer. The literal `devtoken` bearer resolves to a fixed
//! development principal when the bypass is enabled. A `tenant` claim, when
//! present, must match the tenant this process serves.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::handlers::ApiError;
use crate::AppState;

/// Claims accepted on the scoring endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Extractor that requires a valid bearer token.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    pub claims: Claims,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let claims = decode_token(&state.settings, token)?;

        if let Some(tenant) = &claims.tenant {
            if tenant != &state.settings.tenant_id {
                return Err(ApiError::Forbidden(format!(
                    "token is scoped to tenant {tenant}"
                )));
            }
        }

        Ok(RequireAuth { claims })
    }
}

fn decode_token(settings: &sieve_core::Settings, token: &str) -> Result<Claims, ApiError> {
    if token == "devtoken" {
        if settings.auth_dev_bypass {
            return Ok(Claims {
                sub: "dev-user".to_string(),
                tenant: None,
            });
        }
        return Err(ApiError::Unauthorized(
            "development bypass is disabled".to_string(),
        ));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[&settings.jwt_audience]);
    validation.set_issuer(&[&settings.jwt_issuer]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::Unauthorized(e.to_string()))
}
