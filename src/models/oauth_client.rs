use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::auth::scopes::ScopeSet;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct OAuthClient {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub redirect_uris: String,  // JSON array as string
    pub allowed_scopes: String, // JSON array as string
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn to_view(&self) -> Result<OAuthClientView, serde_json::Error> {
        Ok(OAuthClientView {
            client_id: self.client_id.clone(),
            name: self.name.clone(),
            redirect_uris: self.get_redirect_uris()?,
            allowed_scopes: self.get_allowed_scopes()?.into_vec(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn get_redirect_uris(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.redirect_uris)
    }

    pub fn get_allowed_scopes(&self) -> Result<ScopeSet, serde_json::Error> {
        ScopeSet::from_json(&self.allowed_scopes)
    }
}

/// Fields of a client as written by the registry.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_id: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: ScopeSet,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthClientView {
    #[schema(example = "c1")]
    pub client_id: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOAuthClient {
    #[schema(example = "c1")]
    pub client_id: String,
    #[schema(example = "Desktop assistant")]
    pub name: String,
    #[schema(example = json!(["urn:ietf:wg:oauth:2.0:oob"]))]
    pub redirect_uris: Vec<String>,
    #[schema(example = json!(["read", "write"]))]
    pub allowed_scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOAuthClient {
    pub name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub allowed_scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthClientList {
    pub clients: Vec<OAuthClientView>,
    pub active_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedClient {
    pub client_id: String,
    pub revoked_tokens: u64,
}
