use axum::{extract::State, Json};
use axum_extra::extract::{Form, WithRejection};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult, OAuthError},
    models::{AppState, RevokeRequest, RevokeResponse},
};

// POST /oauth/revoke - Token revocation (RFC 7009)
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    request_body(content = RevokeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked, or was already unusable", body = RevokeResponse),
        (status = 400, description = "Missing token", body = crate::error::ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    WithRejection(Form(req), _): WithRejection<Form<RevokeRequest>, AppError>,
) -> AppResult<Json<RevokeResponse>> {
    let token = req
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;

    // token_type_hint is advisory; both token classes are looked up.
    let success = state.tokens.revoke(token).await?;
    Ok(Json(RevokeResponse { success }))
}
