//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::queue::QueueError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("account already exists")]
    AccountExists,

    /// Form fields failed validation; carries every violated key.
    #[error("validation failed: {0:?}")]
    Validation(Vec<&'static str>),

    /// Reset token unknown or expired.
    #[error("invalid or expired reset token")]
    InvalidToken,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Email could not be queued.
    #[error("email queue error: {0}")]
    Queue(#[from] QueueError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Message keys sent to the client.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidEmail(_) => vec!["invalid_email"],
            Self::InvalidCredentials => vec!["invalid_credentials"],
            Self::AccountExists => vec!["account_exists"],
            Self::Validation(keys) => keys.clone(),
            Self::InvalidToken => vec!["invalid_token"],
            Self::Repository(_) | Self::Queue(_) | Self::PasswordHash => vec!["internal_error"],
        }
    }
}
