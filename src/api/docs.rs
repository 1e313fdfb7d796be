use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use super::{
    admin,
    tools::{self, ToolCall, ToolResult, ToolView},
};
use crate::{
    auth::oauth::{authorize, revoke, token},
    error::ErrorBody,
    models::{
        ConsentForm, CreateOAuthClient, DeletedClient, OAuthClientList, OAuthClientView,
        OobCodeResponse, PendingAuthorization, RevokeRequest, RevokeResponse, TokenRequest,
        TokenResponse, UpdateOAuthClient,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        authorize::authorize_get,
        authorize::authorize_post,
        token::token,
        revoke::revoke,
        admin::create_client,
        admin::list_clients,
        admin::get_client,
        admin::update_client,
        admin::delete_client,
        tools::list_tools,
        tools::execute_tool,
    ),
    components(schemas(
        ErrorBody,
        ConsentForm,
        PendingAuthorization,
        OobCodeResponse,
        TokenRequest,
        TokenResponse,
        RevokeRequest,
        RevokeResponse,
        CreateOAuthClient,
        UpdateOAuthClient,
        OAuthClientView,
        OAuthClientList,
        DeletedClient,
        ToolView,
        ToolCall,
        ToolResult,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "oauth", description = "Authorization code flow with PKCE"),
        (name = "admin", description = "OAuth client administration"),
        (name = "tools", description = "Bearer-protected tool dispatch"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "admin_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Admin-Key"))),
        );
        components.add_security_scheme(
            "consent_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Consent-Key"))),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_protocol_endpoints() {
        let doc = ApiDoc::openapi();
        for path in ["/oauth/authorize", "/oauth/token", "/oauth/revoke", "/api/tools/{name}"] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }
}
