use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Uniform response for bad email, unknown account, inactive account at
    /// the lookup stage, wrong password, or a stale token version. Callers
    /// must not be able to tell these apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Account inactive")]
    AccountInactive,

    #[error("Token revoked")]
    Revoked,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token malformed")]
    TokenMalformed,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Two-factor code required")]
    TwoFaRequired,

    #[error("Invalid two-factor code")]
    InvalidCode,

    #[error("Invalid backup code")]
    InvalidBackupCode,

    /// Password re-proof failed for a sensitive two-factor operation.
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Two-factor authentication already enabled")]
    AlreadyEnabled,

    #[error("Two-factor authentication not enabled")]
    NotEnabled,

    #[error("Invalid or expired password reset token")]
    InvalidResetToken,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// A required backing store (revocation store, directory) could not be
    /// reached. Verification fails closed on this.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Conversions from external error types
impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        AuthError::DependencyUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
            _ => AuthError::InvalidToken,
        }
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        tracing::error!("bcrypt error: {}", err);
        AuthError::Internal(err.to_string())
    }
}
