//! Bearer credential extraction.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::error::RewardsError;
use crate::identity::OwnerId;

const AUTHORIZATION_BEARER_PREFIX: &str = "Bearer ";

/// The user behind the request's `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub OwnerId);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = extract_bearer_token(header)?;
        let owner = state.identity.resolve_credential(token)?;
        Ok(AuthUser(owner))
    }
}

fn extract_bearer_token(header: Option<&str>) -> Result<&str, RewardsError> {
    let header =
        header.ok_or_else(|| RewardsError::Unauthorized("missing authorization header".into()))?;
    let token = header
        .strip_prefix(AUTHORIZATION_BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RewardsError::Unauthorized("expected a bearer token".into()))?;
    Ok(token)
}
