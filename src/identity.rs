//! Bearer credentials for `receiver-join`.
//!
//! Tokens are HS256 JWTs issued by `POST /login` and carry the handle they were
//! issued for. The presence registry only sees them through [`CredentialVerifier`].

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Checks a bearer credential presented for `claimed_handle` and returns the
/// handle the credential actually asserts.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credential: &str, claimed_handle: &str) -> Result<String, TokenError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub handle: String,
    /// Expiry, unix seconds
    pub exp: i64,
}

impl Claims {
    pub fn new(handle: impl Into<String>, ttl_secs: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(ttl_secs)).timestamp();
        Self { handle: handle.into(), exp }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Token generation failed: {0}")]
    Generation(String),
}

/// Issues and validates handle-bound tokens with a shared secret.
pub struct JwtAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl JwtAuthority {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn issue(&self, handle: &str) -> Result<String, TokenError> {
        self.issue_claims(&Claims::new(handle, self.ttl_secs))
    }

    pub fn issue_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::InvalidFormat(e.to_string()),
            })
    }
}

#[async_trait]
impl CredentialVerifier for JwtAuthority {
    // The claimed handle is compared by the registry, which owns the mismatch outcome.
    async fn verify(&self, credential: &str, _claimed_handle: &str) -> Result<String, TokenError> {
        self.validate(credential).map(|claims| claims.handle)
    }
}
