use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Identity, Role},
};

/// Claims
///
/// Payload signed into every bearer token. `exp` is fixed at issuance
/// (`iat + ttl`) and never recomputed.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Role at issuance. Informational only; the authentication gate re-reads
    /// the role from the directory on every request.
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// TokenError
///
/// Verification has exactly one failure mode visible to callers. Bad signature,
/// malformed structure and expiry all land here so responses cannot be used as
/// an oracle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
}

/// TokenService
///
/// Issues and verifies HS256 tokens with a process-wide secret. Cheap to clone;
/// shared through `AppState`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, AppError> {
        self.issue_at(identity, Utc::now())
    }

    /// Signs a token as if issued at `now`.
    ///
    /// Claims are whole seconds, so `exp` is `now + ttl` rounded up: the token
    /// never expires before the full ttl has passed, and at most one second
    /// after.
    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AppError::internal("token ttl out of range"))?;
        let claims = Claims {
            sub: identity.id,
            role: identity.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp() + i64::from(expires_at.timestamp_subsec_nanos() > 0),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// verify_at
    ///
    /// Checks the signature, then requires `now < exp`. Expiry is enforced here
    /// rather than by `jsonwebtoken` so the boundary is exact (no leeway) and the
    /// clock is injectable.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            TokenError::Invalid
        })?;

        if now.timestamp() >= data.claims.exp {
            tracing::debug!(sub = %data.claims.sub, "token rejected: expired");
            return Err(TokenError::Invalid);
        }

        Ok(Identity {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }
}
