use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::scopes::ScopeSet;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct AuthorizationCode {
    pub id: String,
    pub code_hash: String,
    pub client_id: String,
    pub principal_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scopes: String, // JSON array as string
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A persisted access/refresh pair. Only digests of the token strings are stored.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct TokenRecord {
    pub id: String,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub client_id: String,
    pub principal_id: String,
    pub scopes: String, // JSON array as string
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// A freshly minted pair; the only place the plaintext tokens exist.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub principal_id: String,
    pub scopes: ScopeSet,
    pub expires_in: i64,
    pub refresh_token_expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// What a valid access token grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub principal_id: String,
    pub client_id: String,
    pub scopes: ScopeSet,
}

// OAuth2.0 Request/Response types

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    #[param(example = "code")]
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    #[param(example = "read write")]
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    #[param(example = "S256")]
    pub code_challenge_method: Option<String>,
}

/// Decision posted back by the consent screen.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentForm {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub principal_id: Option<String>,
    pub approved: String, // "true" or "false"
}

impl ConsentForm {
    pub fn authorize_params(&self) -> AuthorizeParams {
        AuthorizeParams {
            response_type: self.response_type.clone().or_else(|| Some("code".to_string())),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            code_challenge: self.code_challenge.clone(),
            code_challenge_method: self.code_challenge_method.clone(),
        }
    }
}

/// A validated authorization request awaiting the principal's decision.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
}

/// Returned instead of a redirect for the out-of-band redirect URI.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OobCodeResponse {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    // Authorization code grant
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    // Refresh token grant
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub refresh_token_expires_in: i64,
    pub scope: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
            refresh_token: pair.refresh_token,
            refresh_token_expires_in: pair.refresh_token_expires_in,
            scope: pair.scopes.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub success: bool,
}
