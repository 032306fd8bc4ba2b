//! Request body extraction.
//!
//! [`JsonBody`] is `axum::Json` with its rejection routed through
//! [`AppError`], so a malformed body gets the usual 400 `{"errors": [...]}`
//! instead of axum's plain-text 415/422.

use axum::extract::{FromRequest, rejection::JsonRejection};

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                Self::bad_request("json_content_type_required")
            }
            _ => Self::bad_request("invalid_request_body"),
        }
    }
}
