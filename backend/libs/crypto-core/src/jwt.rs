//! Guest session tokens.
//!
//! A verified guest receives an access/refresh pair whose subject is the
//! canonical phone number. Tokens carry a `token_type` claim so a refresh token
//! can never be presented where an access token is expected, and the reverse.
//!
//! Two key setups are supported:
//!
//! - **RS256** when a PEM key pair is configured (preferred in production)
//! - **HS256** with a shared secret for single-service deployments and tests
//!
//! ```rust
//! use crypto_core::jwt::{JwtSigner, TokenLifetimes, TokenType};
//!
//! let signer = JwtSigner::hs256(b"local-secret", "guest-gate", TokenLifetimes::default()).unwrap();
//! let pair = signer.issue_pair("0512345678").unwrap();
//! let claims = signer.validate(&pair.access_token, TokenType::Access).unwrap();
//! assert_eq!(claims.sub, "0512345678");
//! ```
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims for a guest session
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Canonical phone number of the verified guest
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id, distinct for every issued token
    pub jti: String,
    pub iss: String,
    pub token_type: TokenType,
}

/// Token pair handed out after a successful verification or refresh
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),

    #[error("token expired")]
    Expired,

    #[error("token validation failed: {0}")]
    Validation(String),

    #[error("expected {expected} token, got {actual}")]
    WrongTokenType {
        expected: TokenType,
        actual: TokenType,
    },
}

// ============================================================================
// Signer
// ============================================================================

/// Issues and validates guest tokens with a fixed key, issuer and lifetimes.
#[derive(Clone)]
pub struct JwtSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetimes: TokenLifetimes,
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    /// Shared-secret signer. Empty secrets are rejected.
    pub fn hs256(
        secret: &[u8],
        issuer: impl Into<String>,
        lifetimes: TokenLifetimes,
    ) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidKey("HS256 secret must not be empty".into()));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            lifetimes,
        })
    }

    /// RSA signer built from PEM-encoded keys.
    pub fn rs256(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: impl Into<String>,
        lifetimes: TokenLifetimes,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding_key,
            decoding_key,
            issuer: issuer.into(),
            lifetimes,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn issue(&self, subject: &str, token_type: TokenType) -> Result<String, JwtError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.lifetimes.access,
            TokenType::Refresh => self.lifetimes.refresh,
        };

        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            token_type,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair, JwtError> {
        let access_token = self.issue(subject, TokenType::Access)?;
        let refresh_token = self.issue(subject, TokenType::Refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.lifetimes.access.num_seconds(),
        })
    }

    /// Verify signature, issuer and expiry (no leeway), then check the token type.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Validation(e.to_string()),
            }
        })?;

        if data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType {
                expected,
                actual: data.claims.token_type,
            });
        }

        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
