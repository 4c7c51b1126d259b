// Authentication, authorization and rate-limit error types

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::models::Role;

/// Errors reported by the credential store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on email violated at write time
    #[error("duplicate key")]
    DuplicateKey,
    #[error("record not found")]
    NotFound,
    /// Connection or query failure; never retried inside the core
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Backend(e.to_string())
    }
}

/// Authentication and authorization error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already exists")]
    DuplicateEmail,

    /// Unknown email and wrong password share this variant
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    /// Password too short, or malformed input to a core operation
    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is malformed or has an invalid signature")]
    TokenMalformed,

    /// Access token presented as refresh token or the other way round
    #[error("Token is of the wrong kind")]
    WrongKind,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions: requires one of [{}]", join_roles(.required))]
    Forbidden { required: Vec<Role> },

    /// Stored password hash could not be parsed; escalate as an internal fault
    #[error("Stored password hash is corrupt: {0}")]
    CorruptHash(String),

    #[error("Too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Subject not found")]
    SubjectNotFound,

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Token signing error: {0}")]
    TokenSigning(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),
}

fn join_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateKey => AuthError::DuplicateEmail,
            StoreError::NotFound => AuthError::SubjectNotFound,
            StoreError::Backend(msg) => AuthError::Store(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect::<Vec<_>>();
        AuthError::Policy(format!("invalid fields: {}", fields.join(", ")))
    }
}

impl AuthError {
    /// Errors the caller must treat as an internal fault rather than a client mistake
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::CorruptHash(_)
                | AuthError::Store(_)
                | AuthError::TokenSigning(_)
                | AuthError::PasswordHash(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::AccountDisabled => StatusCode::FORBIDDEN,
            AuthError::Policy(_) => StatusCode::BAD_REQUEST,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::TokenMalformed => StatusCode::UNAUTHORIZED,
            AuthError::WrongKind => StatusCode::UNAUTHORIZED,
            AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::CorruptHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::SubjectNotFound => StatusCode::NOT_FOUND,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::TokenSigning(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to send to clients (no internal details)
    pub fn error_message(&self) -> String {
        if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_internal() {
            error!("Internal auth error: {}", self);
        } else if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            warn!("Request rejected: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }

        match &self {
            AuthError::RateLimited { retry_after_secs } => {
                let retry_after_secs = *retry_after_secs;
                let body = Json(json!({
                    "error": self.error_message(),
                    "retry_after": retry_after_secs,
                }));
                let mut response = (status, body).into_response();
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs),
                );
                response
            }
            _ => {
                let body = Json(json!({
                    "error": self.error_message(),
                }));
                (status, body).into_response()
            }
        }
    }
}
