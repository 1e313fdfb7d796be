use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    auth::scopes::ScopeSet,
    clock::SharedClock,
    error::{AppError, AppResult},
    models::{NewClient, OAuthClient},
};

/// Registered OAuth clients: lookup, validation and administration.
#[derive(Clone)]
pub struct ClientRegistry {
    pool: SqlitePool,
    clock: SharedClock,
}

impl ClientRegistry {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    pub async fn find(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        let client = sqlx::query_as::<_, OAuthClient>(
            "SELECT * FROM oauth_clients WHERE client_id = ?1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to load oauth client");
            AppError::from(e)
        })?;

        Ok(client)
    }

    pub async fn validate_client(&self, client_id: &str) -> AppResult<bool> {
        Ok(self.find(client_id).await?.is_some())
    }

    /// Exact string membership in the client's registered URIs.
    pub async fn validate_redirect_uri(&self, client_id: &str, uri: &str) -> AppResult<bool> {
        let Some(client) = self.find(client_id).await? else {
            return Ok(false);
        };
        Ok(client.get_redirect_uris()?.iter().any(|allowed| allowed == uri))
    }

    pub async fn validate_scopes(&self, client_id: &str, requested: &ScopeSet) -> AppResult<bool> {
        let Some(client) = self.find(client_id).await? else {
            return Ok(false);
        };
        Ok(requested.is_subset_of(&client.get_allowed_scopes()?))
    }

    pub async fn register(&self, client: NewClient) -> AppResult<OAuthClient> {
        if self.find(&client.client_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Client '{}' already exists",
                client.client_id
            )));
        }

        let now = self.clock.now();
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO oauth_clients
               (id, client_id, name, redirect_uris, allowed_scopes, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        )
        .bind(&id)
        .bind(&client.client_id)
        .bind(&client.name)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(client.allowed_scopes.to_json()?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict(
                format!("Client '{}' already exists", client.client_id),
            ),
            e => {
                error!(error = %e, client_id = %client.client_id, "failed to insert oauth client");
                AppError::from(e)
            }
        })?;

        info!(client_id = %client.client_id, "registered oauth client");
        self.find(&client.client_id).await?.ok_or(AppError::NotFound)
    }

    /// First-use provisioning. A concurrent registration of the same id wins
    /// silently; the existing row is kept.
    pub async fn auto_register(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &ScopeSet,
    ) -> AppResult<()> {
        let now = self.clock.now();
        let result = sqlx::query(
            r#"INSERT INTO oauth_clients
               (id, client_id, name, redirect_uris, allowed_scopes, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(client_id) DO NOTHING"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(client_id)
        .bind(client_id)
        .bind(serde_json::to_string(&[redirect_uri])?)
        .bind(scopes.to_json()?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to auto-register oauth client");
            AppError::from(e)
        })?;

        if result.rows_affected() > 0 {
            info!(client_id, "auto-registered oauth client");
        }
        Ok(())
    }

    pub async fn list(&self) -> AppResult<Vec<OAuthClient>> {
        let clients = sqlx::query_as::<_, OAuthClient>(
            "SELECT * FROM oauth_clients ORDER BY created_at DESC, client_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    pub async fn update(
        &self,
        client_id: &str,
        name: Option<String>,
        redirect_uris: Option<Vec<String>>,
        allowed_scopes: Option<ScopeSet>,
    ) -> AppResult<OAuthClient> {
        let existing = self.find(client_id).await?.ok_or(AppError::NotFound)?;

        let name = name.unwrap_or(existing.name);
        let redirect_uris = match redirect_uris {
            Some(uris) => serde_json::to_string(&uris)?,
            None => existing.redirect_uris,
        };
        let allowed_scopes = match allowed_scopes {
            Some(scopes) => scopes.to_json()?,
            None => existing.allowed_scopes,
        };

        sqlx::query(
            r#"UPDATE oauth_clients
               SET name = ?1, redirect_uris = ?2, allowed_scopes = ?3, updated_at = ?4
               WHERE client_id = ?5"#,
        )
        .bind(&name)
        .bind(&redirect_uris)
        .bind(&allowed_scopes)
        .bind(self.clock.now())
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        info!(client_id, "updated oauth client");
        self.find(client_id).await?.ok_or(AppError::NotFound)
    }

    /// Unrevoked, unexpired access tokens across all clients.
    pub async fn active_token_count(&self) -> AppResult<i64> {
        // expires_at is RFC 3339 UTC text, which orders chronologically.
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM oauth_tokens WHERE revoked_at IS NULL AND expires_at > ?1",
        )
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Revokes every live token of the client, drops its unredeemed codes and
    /// removes the client. Returns the number of revoked token pairs.
    pub async fn delete(&self, client_id: &str) -> AppResult<u64> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = ?1 WHERE client_id = ?2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM authorization_codes WHERE client_id = ?1 AND used_at IS NULL")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM oauth_clients WHERE client_id = ?1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound);
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, client_id, "failed to commit client deletion");
            AppError::from(e)
        })?;

        info!(client_id, revoked_tokens = revoked, "deleted oauth client");
        Ok(revoked)
    }
}
