pub mod authorize;
pub mod revoke;
pub mod token;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{error::OAuthError, models::AppState};

/// Protocol endpoints, mounted under `/oauth`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/token", post(token::token))
        .route("/revoke", post(revoke::revoke))
}

/// A non-empty form or query parameter, else `invalid_request`.
fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("{} is required", name)))
}
