// JWT token generation and validation service

use crate::auth::{clock::Clock, error::AuthError, models::Role};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Which of the two token families a token belongs to
///
/// The kinds are told apart by the secret they are signed with, never by
/// payload shape alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn other(self) -> Self {
        match self {
            TokenKind::Access => TokenKind::Refresh,
            TokenKind::Refresh => TokenKind::Access,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Refresh token claims
///
/// Carries the subject only; role and email are re-read from the store when
/// the token is redeemed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

trait Expiring {
    fn expires_at(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Token service for JWT operations
///
/// Stateless: verification depends only on the token string, the secret for
/// the expected kind and the injected clock.
pub struct TokenService {
    access_key: SigningKey,
    refresh_key: SigningKey,
    access_ttl: i64,  // in seconds
    refresh_ttl: i64, // in seconds
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new TokenService
    ///
    /// The two secrets must differ, otherwise a refresh token would verify as
    /// an access token.
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::TokenSigning("signing secrets must not be empty".to_string()));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::TokenSigning(
                "access and refresh signing secrets must differ".to_string(),
            ));
        }

        Ok(Self {
            access_key: SigningKey::from_secret(access_secret),
            refresh_key: SigningKey::from_secret(refresh_secret),
            access_ttl: ttl_secs(access_ttl),
            refresh_ttl: ttl_secs(refresh_ttl),
            clock,
        })
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        }
    }

    fn sign<C: Serialize>(&self, claims: &C, kind: TokenKind) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key(kind).encoding)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }

    /// Generate an access token
    pub fn issue_access_token(
        &self,
        subject_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let now = self.clock.now().timestamp();

        let claims = AccessClaims {
            sub: subject_id,
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.access_ttl,
            jti: Uuid::new_v4(),
        };

        self.sign(&claims, TokenKind::Access)
    }

    /// Generate a refresh token
    pub fn issue_refresh_token(&self, subject_id: Uuid) -> Result<String, AuthError> {
        let now = self.clock.now().timestamp();

        let claims = RefreshClaims {
            sub: subject_id,
            iat: now,
            exp: now + self.refresh_ttl,
            jti: Uuid::new_v4(),
        };

        self.sign(&claims, TokenKind::Refresh)
    }

    /// Generate both access and refresh tokens
    pub fn issue_token_pair(
        &self,
        subject_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(String, String), AuthError> {
        let access_token = self.issue_access_token(subject_id, email, role)?;
        let refresh_token = self.issue_refresh_token(subject_id)?;
        Ok((access_token, refresh_token))
    }

    /// Validate an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(token, TokenKind::Access)
    }

    /// Validate a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn validation() -> Validation {
        // Expiry is checked against the injected clock below, not the system time
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }

    fn verify<C>(&self, token: &str, kind: TokenKind) -> Result<C, AuthError>
    where
        C: DeserializeOwned + Expiring,
    {
        let validation = Self::validation();

        let claims = match decode::<C>(token, &self.key(kind).decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                // Distinguish a token of the other kind from a forged one
                let other = kind.other();
                let other_key = &self.key(other).decoding;
                return if decode::<serde_json::Value>(token, other_key, &validation).is_ok() {
                    debug!("{} token presented where {} token required", other, kind);
                    Err(AuthError::WrongKind)
                } else {
                    Err(AuthError::TokenMalformed)
                };
            }
            Err(e) => {
                debug!("Rejected {} token: {}", kind, e);
                return Err(AuthError::TokenMalformed);
            }
        };

        if self.clock.now().timestamp() > claims.expires_at() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
}
