//! Caller identity resolution.
//!
//! Registration and password handling live outside this service. The core
//! only needs to turn a bearer credential into an [`OwnerId`]; [`JwtIdentity`]
//! does that for HS256 tokens carrying a `user_id` claim.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RewardsError};

/// Maximum accepted credential length (8 KiB).
const MAX_CREDENTIAL_LENGTH: usize = 8192;

/// Opaque identity of a points owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Resolves bearer credentials to user identities.
pub trait Identity: Send + Sync {
    /// Fails with [`RewardsError::Unauthorized`] when the credential is not valid.
    fn resolve_credential(&self, credential: &str) -> Result<OwnerId>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    exp: usize,
    #[serde(default)]
    iat: Option<usize>,
}

/// HS256 JWT identity backed by a shared secret.
pub struct JwtIdentity {
    decoding: DecodingKey,
    encoding: EncodingKey,
    token_ttl: Duration,
}

impl JwtIdentity {
    pub fn new(secret: &str, token_ttl: Duration) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            token_ttl,
        }
    }

    /// Mint a token for `owner`, valid for the configured TTL.
    pub fn issue(&self, owner: &OwnerId) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: owner.as_str().to_string(),
            exp: (now + self.token_ttl).timestamp().max(0) as usize,
            iat: Some(now.timestamp().max(0) as usize),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| RewardsError::Unauthorized(format!("cannot sign token: {e}")))
    }
}

impl Identity for JwtIdentity {
    fn resolve_credential(&self, credential: &str) -> Result<OwnerId> {
        let credential = credential.trim();
        if credential.is_empty() || credential.len() > MAX_CREDENTIAL_LENGTH {
            return Err(RewardsError::Unauthorized("malformed credential".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(credential, &self.decoding, &validation)
            .map_err(|e| RewardsError::Unauthorized(format!("invalid token: {e}")))?;

        if data.claims.user_id.trim().is_empty() {
            return Err(RewardsError::Unauthorized("token has no user_id".into()));
        }
        Ok(OwnerId(data.claims.user_id))
    }
}
