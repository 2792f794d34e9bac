//! Request handlers.

pub mod analyze;
pub mod health;
pub mod models;

pub use analyze::*;
pub use health::*;
pub use models::*;

use axum::http::Uri;

use crate::error::ApiError;

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}
