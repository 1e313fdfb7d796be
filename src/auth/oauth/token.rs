use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::{Form, WithRejection};
use std::sync::Arc;

use super::required;
use crate::{
    error::{AppError, AppResult, OAuthError, OAuthErrorKind},
    models::{AppState, TokenPair, TokenRequest, TokenResponse},
};

// POST /oauth/token - Token endpoint
#[utoipa::path(
    post,
    path = "/oauth/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token response", body = TokenResponse),
        (status = 400, description = "Token error", body = crate::error::ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn token(
    State(state): State<Arc<AppState>>,
    WithRejection(Form(req), _): WithRejection<Form<TokenRequest>, AppError>,
) -> AppResult<Response> {
    let client_id = required(&req.client_id, "client_id")?;
    if !state.clients.validate_client(client_id).await? {
        return Err(OAuthError::invalid_client("Unknown client").into());
    }

    let pair = match required(&req.grant_type, "grant_type")? {
        "authorization_code" => exchange_code(&state, client_id, &req).await?,
        "refresh_token" => {
            let refresh_token = required(&req.refresh_token, "refresh_token")?;
            state.tokens.rotate(refresh_token, client_id).await?
        }
        other => {
            return Err(OAuthError::new(
                OAuthErrorKind::UnsupportedGrantType,
                format!("Unsupported grant_type '{}'", other),
            )
            .into())
        }
    };

    let mut response = Json(TokenResponse::from(pair)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}

async fn exchange_code(
    state: &AppState,
    client_id: &str,
    req: &TokenRequest,
) -> AppResult<TokenPair> {
    let code = required(&req.code, "code")?;
    let code_verifier = required(&req.code_verifier, "code_verifier")?;
    let redirect_uri = required(&req.redirect_uri, "redirect_uri")?;

    state
        .codes
        .redeem(code, client_id, code_verifier, redirect_uri)
        .await
}
