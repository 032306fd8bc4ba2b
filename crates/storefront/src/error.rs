//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error body has the same shape, a list of message keys:
//!
//! ```json
//! {"errors": ["invalid_first_name", "terms_not_accepted"]}
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::account::AccountError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::finalize::FinalizeError;
use crate::services::shop::ShopError;

/// Generic key for anything the client cannot act on.
pub const INTERNAL_ERROR: &str = "internal_error";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// Client input rejected; carries every violated key.
    #[error("Bad request: {0:?}")]
    BadRequest(Vec<&'static str>),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error. `key` is what the client sees.
    #[error("Internal error: {message}")]
    Internal { key: &'static str, message: String },
}

impl AppError {
    /// Internal error with the generic client key.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            key: INTERNAL_ERROR,
            message: message.into(),
        }
    }

    /// Single-key bad request.
    #[must_use]
    pub fn bad_request(key: &'static str) -> Self {
        Self::BadRequest(vec![key])
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message keys sent to the client.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        match self {
            Self::Database(_) => vec![INTERNAL_ERROR],
            Self::NotFound(key) | Self::Unauthorized(key) | Self::Internal { key, .. } => {
                vec![*key]
            }
            Self::BadRequest(keys) => keys.clone(),
            Self::RateLimited => vec!["too_many_requests"],
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Database(_) | Self::Internal { .. }) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        (self.status(), Json(json!({ "errors": self.keys() }))).into_response()
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::CartNotFound | CartError::ProductNotFound(_) => Self::NotFound(err.key()),
            CartError::InvalidQuantity(_) | CartError::InsufficientStock { .. } => {
                Self::bad_request(err.key())
            }
            CartError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized("invalid_credentials"),
            AuthError::InvalidEmail(_)
            | AuthError::AccountExists
            | AuthError::Validation(_)
            | AuthError::InvalidToken => Self::BadRequest(err.keys()),
            AuthError::Repository(e) => Self::Database(e),
            AuthError::Queue(_) | AuthError::PasswordHash => Self::internal(err.to_string()),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::AccountNotFound => Self::NotFound("account_not_found"),
            AccountError::AddressNotFound => Self::NotFound("shipping_address_not_found"),
            AccountError::Validation(_) | AccountError::InvalidOldPassword => {
                Self::BadRequest(err.keys())
            }
            AccountError::Repository(e) => Self::Database(e),
            AccountError::PasswordHash => Self::internal(err.to_string()),
        }
    }
}

impl From<FinalizeError> for AppError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::DraftNotFound => Self::NotFound("draft_order_not_found"),
            FinalizeError::Validation(_) | FinalizeError::AccountExists => {
                Self::BadRequest(err.keys())
            }
            FinalizeError::Repository(e) => Self::Database(e),
            FinalizeError::OrderNumberExhausted | FinalizeError::Auth(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<ShopError> for AppError {
    fn from(err: ShopError) -> Self {
        match err {
            ShopError::NotFound => Self::NotFound("not_found"),
            ShopError::Category(e) => Self::internal(e.to_string()),
            ShopError::Repository(e) => Self::Database(e),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
