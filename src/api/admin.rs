use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::{
    auth::{
        middleware::check_shared_key,
        scopes::{ScopeSet, DEFAULT_CLIENT_SCOPES, KNOWN_SCOPES},
    },
    error::{AppError, AppResult},
    models::{
        AppState, CreateOAuthClient, DeletedClient, NewClient, OAuthClientList, OAuthClientView,
        UpdateOAuthClient,
    },
};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Proof that the request carried the configured admin key.
pub struct AdminKey;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        check_shared_key(
            &parts.headers,
            ADMIN_KEY_HEADER,
            state.config.admin_api_key.as_deref(),
            "Admin API",
        )?;
        Ok(AdminKey)
    }
}

fn validate_redirect_uris(uris: &[String]) -> AppResult<()> {
    if uris.is_empty() {
        return Err(AppError::Validation(
            "At least one redirect URI is required".to_string(),
        ));
    }
    for uri in uris {
        url::Url::parse(uri)
            .map_err(|_| AppError::Validation(format!("Invalid redirect URI: {}", uri)))?;
    }
    Ok(())
}

fn validate_scope_list(scopes: Vec<String>) -> AppResult<ScopeSet> {
    let scopes = ScopeSet::from_vec(scopes);
    if scopes.is_empty() {
        return Err(AppError::Validation("At least one scope is required".to_string()));
    }
    if let Some(unknown) = scopes.iter().find(|s| !KNOWN_SCOPES.contains(s)) {
        return Err(AppError::Validation(format!("Unknown scope: {}", unknown)));
    }
    Ok(scopes)
}

// POST /admin/clients - Register an OAuth client
#[utoipa::path(
    post,
    path = "/admin/clients",
    request_body = CreateOAuthClient,
    responses(
        (status = 201, description = "OAuth client created", body = OAuthClientView),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 409, description = "Client id already registered", body = crate::error::ErrorBody),
    ),
    params(("X-Admin-Key" = String, Header, description = "Administrative API key")),
    tag = "admin"
)]
pub async fn create_client(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): WithRejection<Json<CreateOAuthClient>, AppError>,
) -> AppResult<(StatusCode, Json<OAuthClientView>)> {
    let client_id = req.client_id.trim();
    if client_id.is_empty() {
        return Err(AppError::Validation("client_id is required".to_string()));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    validate_redirect_uris(&req.redirect_uris)?;
    let allowed_scopes = validate_scope_list(
        req.allowed_scopes
            .unwrap_or_else(|| DEFAULT_CLIENT_SCOPES.iter().map(|s| s.to_string()).collect()),
    )?;

    let client = state
        .clients
        .register(NewClient {
            client_id: client_id.to_string(),
            name: req.name.trim().to_string(),
            redirect_uris: req.redirect_uris,
            allowed_scopes,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(client.to_view()?)))
}

// GET /admin/clients - List OAuth clients
#[utoipa::path(
    get,
    path = "/admin/clients",
    responses((status = 200, description = "Registered clients", body = OAuthClientList)),
    params(("X-Admin-Key" = String, Header, description = "Administrative API key")),
    tag = "admin"
)]
pub async fn list_clients(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<OAuthClientList>> {
    let clients = state
        .clients
        .list()
        .await?
        .iter()
        .map(|c| c.to_view())
        .collect::<Result<Vec<_>, _>>()?;
    let active_tokens = state.clients.active_token_count().await?;

    Ok(Json(OAuthClientList {
        clients,
        active_tokens,
    }))
}

// GET /admin/clients/{client_id}
#[utoipa::path(
    get,
    path = "/admin/clients/{client_id}",
    params(
        ("client_id" = String, Path, description = "Client identifier"),
        ("X-Admin-Key" = String, Header, description = "Administrative API key"),
    ),
    responses(
        (status = 200, description = "OAuth client", body = OAuthClientView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn get_client(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> AppResult<Json<OAuthClientView>> {
    let client = state
        .clients
        .find(&client_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(client.to_view()?))
}

// PUT /admin/clients/{client_id}
#[utoipa::path(
    put,
    path = "/admin/clients/{client_id}",
    request_body = UpdateOAuthClient,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
        ("X-Admin-Key" = String, Header, description = "Administrative API key"),
    ),
    responses(
        (status = 200, description = "Updated client", body = OAuthClientView),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn update_client(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateOAuthClient>, AppError>,
) -> AppResult<Json<OAuthClientView>> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::Validation("name must not be empty".to_string()))
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    if let Some(uris) = &req.redirect_uris {
        validate_redirect_uris(uris)?;
    }
    let allowed_scopes = req.allowed_scopes.map(validate_scope_list).transpose()?;

    let client = state
        .clients
        .update(&client_id, name, req.redirect_uris, allowed_scopes)
        .await?;
    Ok(Json(client.to_view()?))
}

// DELETE /admin/clients/{client_id} - revokes the client's tokens, then removes it
#[utoipa::path(
    delete,
    path = "/admin/clients/{client_id}",
    params(
        ("client_id" = String, Path, description = "Client identifier"),
        ("X-Admin-Key" = String, Header, description = "Administrative API key"),
    ),
    responses(
        (status = 200, description = "Client deleted", body = DeletedClient),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn delete_client(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> AppResult<Json<DeletedClient>> {
    let revoked_tokens = state.clients.delete(&client_id).await?;
    Ok(Json(DeletedClient {
        client_id,
        revoked_tokens,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_list_is_checked_against_catalog() {
        let ok = validate_scope_list(vec!["read".into(), "delete".into(), "read".into()]).unwrap();
        assert_eq!(ok.to_string(), "read delete");

        assert!(matches!(
            validate_scope_list(vec!["admin".into()]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(validate_scope_list(vec![]), Err(AppError::Validation(_))));
    }

    #[test]
    fn redirect_uris_must_be_present_and_absolute() {
        assert!(validate_redirect_uris(&["urn:ietf:wg:oauth:2.0:oob".into()]).is_ok());
        assert!(validate_redirect_uris(&["https://app.example/cb".into()]).is_ok());
        assert!(validate_redirect_uris(&[]).is_err());
        assert!(validate_redirect_uris(&["/relative".into()]).is_err());
    }
}
