//! JWT minting for authenticating as the GitHub App itself.

use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppCredential;

/// GitHub rejects App JWTs older than this, so assertions are never reused.
pub const ASSERTION_LIFETIME_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("GitHub App private key is missing")]
    MissingKey,

    #[error("GitHub App private key is malformed: {0}")]
    MalformedKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign GitHub App JWT: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("system clock is before the unix epoch")]
    Clock,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
}

/// A signed App JWT. Lives for [`ASSERTION_LIFETIME_SECS`] at most.
#[derive(Clone)]
pub struct SignedAssertion {
    token: String,
    pub issuer: u64,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl SignedAssertion {
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("issuer", &self.issuer)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Source of the current unix time in seconds.
pub type Clock = fn() -> Result<u64, CredentialError>;

fn system_clock() -> Result<u64, CredentialError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.as_secs())
        .map_err(|_| CredentialError::Clock)
}

#[derive(Debug, Clone)]
pub struct CredentialMinter {
    credential: Arc<AppCredential>,
    clock: Clock,
}

impl CredentialMinter {
    pub fn new(credential: Arc<AppCredential>) -> Self {
        Self {
            credential,
            clock: system_clock,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn credential(&self) -> &AppCredential {
        &self.credential
    }

    pub fn mint(&self) -> Result<SignedAssertion, CredentialError> {
        self.mint_at((self.clock)()?)
    }

    pub fn mint_at(&self, issued_at: u64) -> Result<SignedAssertion, CredentialError> {
        let pem = self.credential.private_key_pem();
        if pem.trim().is_empty() {
            return Err(CredentialError::MissingKey);
        }
        let key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(CredentialError::MalformedKey)?;

        let claims = AssertionClaims {
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
            iss: self.credential.app_id.to_string(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(CredentialError::Signing)?;

        debug!(
            app_id = self.credential.app_id,
            exp = claims.exp,
            "minted GitHub App JWT"
        );

        Ok(SignedAssertion {
            token,
            issuer: self.credential.app_id,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
