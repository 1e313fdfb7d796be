use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::{Form, WithRejection};
use std::sync::Arc;
use tracing::{info, warn};

use super::required;
use crate::{
    auth::{codes::NewAuthorizationCode, middleware::check_shared_key, pkce, scopes::ScopeSet},
    error::{AppError, AppResult, OAuthError, OAuthErrorKind},
    models::{
        AppState, AuthorizeParams, ConsentForm, OAuthClient, OobCodeResponse,
        PendingAuthorization,
    },
};

/// Redirect URI for clients that cannot receive a redirect; the code is
/// returned in the response body instead.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

pub const CONSENT_KEY_HEADER: &str = "x-consent-key";

/// The consent UI authenticates the principal; only it may post decisions.
pub struct ConsentKey;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ConsentKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        check_shared_key(
            &parts.headers,
            CONSENT_KEY_HEADER,
            state.config.consent_api_key.as_deref(),
            "Consent submission",
        )?;
        Ok(ConsentKey)
    }
}

struct ValidatedRequest {
    client: OAuthClient,
    redirect_uri: String,
    scopes: ScopeSet,
    state: Option<String>,
    code_challenge: String,
}

async fn validate_request(state: &AppState, params: &AuthorizeParams) -> AppResult<ValidatedRequest> {
    if params.response_type.as_deref() != Some("code") {
        return Err(OAuthError::new(
            OAuthErrorKind::UnsupportedResponseType,
            "Only 'code' response type is supported",
        )
        .into());
    }

    let client_id = required(&params.client_id, "client_id")?;
    let redirect_uri = required(&params.redirect_uri, "redirect_uri")?;

    let scopes = ScopeSet::parse(params.scope.as_deref()).map_err(OAuthError::invalid_scope)?;

    if state.config.auto_register_clients && !state.clients.validate_client(client_id).await? {
        state
            .clients
            .auto_register(client_id, redirect_uri, &scopes)
            .await?;
    }

    let client = state
        .clients
        .find(client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;

    if !state.clients.validate_redirect_uri(client_id, redirect_uri).await? {
        warn!(client_id, "unregistered redirect_uri presented");
        return Err(OAuthError::invalid_request("Invalid redirect_uri").into());
    }

    let code_challenge = required(&params.code_challenge, "code_challenge")?;
    if params.code_challenge_method.as_deref() != Some(pkce::S256) {
        return Err(OAuthError::invalid_request("code_challenge_method must be S256").into());
    }

    if !state.clients.validate_scopes(client_id, &scopes).await? {
        return Err(OAuthError::invalid_scope("Requested scope exceeds the client's allowed scopes").into());
    }

    Ok(ValidatedRequest {
        client,
        redirect_uri: redirect_uri.to_string(),
        scopes,
        state: params.state.clone(),
        code_challenge: code_challenge.to_string(),
    })
}

// GET /oauth/authorize - validate the request and describe it for the consent UI
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Pending authorization", body = PendingAuthorization),
        (status = 400, description = "Invalid authorization request", body = crate::error::ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn authorize_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> AppResult<Json<PendingAuthorization>> {
    let request = validate_request(&state, &params).await?;

    Ok(Json(PendingAuthorization {
        client_id: request.client.client_id,
        client_name: request.client.name,
        redirect_uri: request.redirect_uri,
        scopes: request.scopes.into_vec(),
        state: request.state,
    }))
}

// POST /oauth/authorize - consent decision
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    request_body(content = ConsentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Out-of-band authorization code", body = OobCodeResponse),
        (status = 303, description = "Redirect with authorization code or access_denied"),
        (status = 400, description = "Invalid authorization request", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid consent key", body = crate::error::ErrorBody),
        (status = 403, description = "Out-of-band request denied, or consent submission disabled", body = crate::error::ErrorBody),
    ),
    security(("consent_key" = [])),
    tag = "oauth"
)]
pub async fn authorize_post(
    _consent: ConsentKey,
    State(state): State<Arc<AppState>>,
    WithRejection(Form(form), _): WithRejection<Form<ConsentForm>, AppError>,
) -> AppResult<Response> {
    let request = validate_request(&state, &form.authorize_params()).await?;
    let oob = request.redirect_uri == OOB_REDIRECT_URI;

    if form.approved != "true" {
        info!(client_id = %request.client.client_id, "authorization denied");
        if oob {
            return Err(OAuthError::new(
                OAuthErrorKind::AccessDenied,
                "The authorization request was denied",
            )
            .into());
        }
        return redirect_with(
            &request.redirect_uri,
            &[
                ("error", "access_denied"),
                ("error_description", "The authorization request was denied"),
            ],
            request.state.as_deref(),
        );
    }

    let principal_id = required(&form.principal_id, "principal_id")?;

    let code = state
        .codes
        .issue(NewAuthorizationCode {
            client_id: &request.client.client_id,
            principal_id,
            redirect_uri: &request.redirect_uri,
            code_challenge: &request.code_challenge,
            code_challenge_method: pkce::S256,
            scopes: &request.scopes,
        })
        .await?;

    if oob {
        return Ok(Json(OobCodeResponse {
            code,
            state: request.state,
        })
        .into_response());
    }

    redirect_with(
        &request.redirect_uri,
        &[("code", code.as_str())],
        request.state.as_deref(),
    )
}

fn redirect_with(
    redirect_uri: &str,
    pairs: &[(&str, &str)],
    state: Option<&str>,
) -> AppResult<Response> {
    let mut redirect_url = url::Url::parse(redirect_uri)
        .map_err(|_| OAuthError::invalid_request("Invalid redirect_uri"))?;

    {
        let mut query = redirect_url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state_param) = state {
            query.append_pair("state", state_param);
        }
    }

    Ok(Redirect::to(redirect_url.as_str()).into_response())
}
