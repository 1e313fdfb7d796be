use chrono::Duration;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        scopes::ScopeSet,
        tokens::{generate_access_token, generate_refresh_token, hash_token},
    },
    clock::SharedClock,
    config::TokenConfig,
    error::{AppError, AppResult, OAuthError},
    models::{TokenInfo, TokenPair, TokenRecord},
};

/// Issues, validates, rotates and revokes access/refresh token pairs.
#[derive(Clone)]
pub struct TokenService {
    pool: SqlitePool,
    clock: SharedClock,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(pool: SqlitePool, clock: SharedClock, config: TokenConfig) -> Self {
        Self {
            pool,
            clock,
            config,
        }
    }

    pub async fn issue(
        &self,
        client_id: &str,
        principal_id: &str,
        scopes: &ScopeSet,
    ) -> AppResult<TokenPair> {
        let mut conn = self.pool.acquire().await?;
        self.insert_pair(&mut conn, client_id, principal_id, scopes)
            .await
    }

    /// Mints a pair and stores its digests on `conn`, which may be an open
    /// transaction owned by the caller.
    pub(crate) async fn insert_pair(
        &self,
        conn: &mut SqliteConnection,
        client_id: &str,
        principal_id: &str,
        scopes: &ScopeSet,
    ) -> AppResult<TokenPair> {
        let now = self.clock.now();
        let access_token = generate_access_token();
        let refresh_token = generate_refresh_token();
        let expires_at = now + Duration::seconds(self.config.access_token_ttl_secs);
        let refresh_token_expires_at = now + Duration::seconds(self.config.refresh_token_ttl_secs);

        sqlx::query(
            r#"INSERT INTO oauth_tokens
               (id, access_token_hash, refresh_token_hash, client_id, principal_id, scopes,
                expires_at, refresh_token_expires_at, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(hash_token(&access_token))
        .bind(hash_token(&refresh_token))
        .bind(client_id)
        .bind(principal_id)
        .bind(scopes.to_json()?)
        .bind(expires_at)
        .bind(refresh_token_expires_at)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to store token pair");
            AppError::from(e)
        })?;

        info!(client_id, principal_id, scope = %scopes, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            client_id: client_id.to_string(),
            principal_id: principal_id.to_string(),
            scopes: scopes.clone(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token_expires_in: self.config.refresh_token_ttl_secs,
            expires_at,
            refresh_token_expires_at,
            created_at: now,
        })
    }

    pub async fn validate(&self, access_token: &str) -> AppResult<TokenInfo> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT * FROM oauth_tokens WHERE access_token_hash = ?1",
        )
        .bind(hash_token(access_token))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up access token");
            AppError::from(e)
        })?
        .ok_or_else(|| OAuthError::invalid_token("Token not found"))?;

        if record.revoked_at.is_some() {
            return Err(OAuthError::invalid_token("Token has been revoked").into());
        }
        if self.clock.now() > record.expires_at {
            return Err(OAuthError::invalid_token("Token has expired").into());
        }

        Ok(TokenInfo {
            principal_id: record.principal_id,
            client_id: record.client_id,
            scopes: ScopeSet::from_json(&record.scopes)?,
        })
    }

    /// Exchanges a refresh token for a new pair. The presented pair is
    /// revoked in the same transaction that stores its replacement.
    pub async fn rotate(&self, refresh_token: &str, client_id: &str) -> AppResult<TokenPair> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT * FROM oauth_tokens WHERE refresh_token_hash = ?1",
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up refresh token");
            AppError::from(e)
        })?
        .ok_or_else(|| OAuthError::invalid_grant("Invalid refresh token"))?;

        if record.client_id != client_id {
            warn!(client_id, "refresh token presented by another client");
            return Err(OAuthError::invalid_client("Client ID mismatch").into());
        }
        if record.revoked_at.is_some() {
            warn!(client_id, "revoked refresh token presented");
            return Err(OAuthError::invalid_grant("Refresh token has been revoked").into());
        }
        let now = self.clock.now();
        if now > record.refresh_token_expires_at {
            return Err(OAuthError::invalid_grant("Refresh token has expired").into());
        }

        let scopes = ScopeSet::from_json(&record.scopes)?;

        let mut tx = self.pool.begin().await?;
        let revoked = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(&record.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to revoke rotated token pair");
            AppError::from(e)
        })?
        .rows_affected();

        if revoked == 0 {
            // Lost the race against a concurrent rotation or revocation.
            tx.rollback().await?;
            warn!(client_id, "refresh token already rotated");
            return Err(OAuthError::invalid_grant("Refresh token has been revoked").into());
        }

        let pair = self
            .insert_pair(&mut tx, &record.client_id, &record.principal_id, &scopes)
            .await?;
        tx.commit().await.map_err(|e| {
            error!(error = %e, client_id, "failed to commit token rotation");
            AppError::from(e)
        })?;

        Ok(pair)
    }

    /// Revokes the pair owning `token`, given either its access or refresh
    /// string. Unknown and already-revoked tokens still succeed.
    pub async fn revoke(&self, token: &str) -> AppResult<bool> {
        let hash = hash_token(token);
        let result = sqlx::query(
            r#"UPDATE oauth_tokens SET revoked_at = ?1
               WHERE (access_token_hash = ?2 OR refresh_token_hash = ?2) AND revoked_at IS NULL"#,
        )
        .bind(self.clock.now())
        .bind(&hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revoke token");
            AppError::from(e)
        })?;

        if result.rows_affected() > 0 {
            info!("revoked token pair");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::MockClock, error::OAuthErrorKind, test_support::memory_pool};
    use std::sync::Arc;

    async fn service() -> (TokenService, MockClock) {
        let clock = MockClock::new();
        let service = TokenService::new(
            memory_pool().await,
            Arc::new(clock.clone()),
            TokenConfig::default(),
        );
        (service, clock)
    }

    fn kind(err: AppError) -> OAuthErrorKind {
        err.oauth_kind().expect("expected an oauth error")
    }

    #[tokio::test]
    async fn issued_access_token_validates() {
        let (service, _) = service().await;
        let scopes = ScopeSet::from_vec(["read", "write"]);
        let pair = service.issue("c1", "user-1", &scopes).await.unwrap();

        assert_eq!(pair.expires_in, 3600);
        assert_eq!(pair.refresh_token_expires_in, 2_592_000);

        let info = service.validate(&pair.access_token).await.unwrap();
        assert_eq!(
            info,
            TokenInfo {
                principal_id: "user-1".into(),
                client_id: "c1".into(),
                scopes,
            }
        );
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let (service, _) = service().await;
        let pair = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        let err = service.validate(&pair.refresh_token).await.unwrap_err();
        assert_eq!(kind(err), OAuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn access_token_expires() {
        let (service, clock) = service().await;
        let pair = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        clock.advance(Duration::seconds(3600));
        assert!(service.validate(&pair.access_token).await.is_ok());

        clock.advance(Duration::seconds(1));
        let err = service.validate(&pair.access_token).await.unwrap_err();
        assert_eq!(kind(err), OAuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn rotation_revokes_the_old_pair() {
        let (service, _) = service().await;
        let old = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        let new = service.rotate(&old.refresh_token, "c1").await.unwrap();
        assert_ne!(new.access_token, old.access_token);
        assert_ne!(new.refresh_token, old.refresh_token);
        assert_eq!(new.principal_id, "user-1");
        assert_eq!(new.scopes.to_string(), "read");

        let again = service.rotate(&old.refresh_token, "c1").await.unwrap_err();
        assert_eq!(kind(again), OAuthErrorKind::InvalidGrant);

        let stale = service.validate(&old.access_token).await.unwrap_err();
        assert_eq!(kind(stale), OAuthErrorKind::InvalidToken);
        assert!(service.validate(&new.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn rotation_checks_client_and_expiry() {
        let (service, clock) = service().await;
        let pair = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        let wrong_client = service.rotate(&pair.refresh_token, "c2").await.unwrap_err();
        assert_eq!(kind(wrong_client), OAuthErrorKind::InvalidClient);

        let unknown = service.rotate("tgr_nope", "c1").await.unwrap_err();
        assert_eq!(kind(unknown), OAuthErrorKind::InvalidGrant);

        clock.advance(Duration::seconds(2_592_001));
        let expired = service.rotate(&pair.refresh_token, "c1").await.unwrap_err();
        assert_eq!(kind(expired), OAuthErrorKind::InvalidGrant);
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_accepts_either_token() {
        let (service, _) = service().await;
        let first = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();
        let second = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        assert!(service.revoke(&first.access_token).await.unwrap());
        assert!(service.revoke(&first.access_token).await.unwrap());
        assert!(service.revoke("tga_unknown").await.unwrap());
        assert!(service.validate(&first.access_token).await.is_err());

        assert!(service.revoke(&second.refresh_token).await.unwrap());
        assert!(service.validate(&second.access_token).await.is_err());
        let err = service.rotate(&second.refresh_token, "c1").await.unwrap_err();
        assert_eq!(kind(err), OAuthErrorKind::InvalidGrant);
    }

    #[tokio::test]
    async fn storage_failures_stay_server_side() {
        let (service, _) = service().await;
        let pair = service.issue("c1", "user-1", &ScopeSet::from_vec(["read"])).await.unwrap();

        service.pool.close().await;

        let failures = [
            service.validate(&pair.access_token).await.unwrap_err(),
            service.rotate(&pair.refresh_token, "c1").await.unwrap_err(),
            service.revoke(&pair.access_token).await.unwrap_err(),
            service
                .issue("c1", "user-1", &ScopeSet::from_vec(["read"]))
                .await
                .unwrap_err(),
        ];
        for err in failures {
            assert!(err.is_server_failure(), "{err}");
            assert_eq!(err.oauth_kind(), None);
        }
    }
}
