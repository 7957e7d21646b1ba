//! Signed session artifact carried in the session cookie.
//!
//! The cookie holds an HS256 JWT naming the session id and principal. Token
//! material never goes into the artifact; it lives in the token store under the
//! session id.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::session::Session;

/// Token type claim. Only session artifacts are issued here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Session,
}

/// JWT claims of a session artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session id, unique per artifact
    pub sid: String,
    /// Subject (user id)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of signing a session artifact.
#[derive(Debug, Clone)]
pub struct SessionTokenResult {
    /// The JWT token string
    pub token: String,
    /// Seconds until the artifact expires, for the cookie Max-Age
    pub duration: u64,
}

/// Signing configuration for session artifacts.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign the artifact for `session`. Expiry follows `session.expires_at`.
    pub fn issue_session_token(&self, session: &Session) -> Result<SessionTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let exp = u64::try_from(session.expires_at / 1000).map_err(|_| JwtError::TimeError)?;
        if exp <= now {
            return Err(JwtError::TimeError);
        }

        let claims = SessionClaims {
            sid: session.session_id.clone(),
            sub: session.user_id.clone(),
            token_type: TokenType::Session,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(SessionTokenResult {
            token,
            duration: exp - now,
        })
    }

    /// Validate and decode a session artifact.
    pub fn validate_session_token(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Session {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    /// System clock before the epoch, or an artifact that would already be expired
    #[error("System time error")]
    TimeError,
    #[error("Wrong token type")]
    WrongTokenType,
}
