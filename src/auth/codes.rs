use chrono::Duration;
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        pkce,
        scopes::ScopeSet,
        token_service::TokenService,
        tokens::{generate_authorization_code, hash_token},
    },
    clock::SharedClock,
    error::{AppError, AppResult, OAuthError},
    models::{AuthorizationCode, TokenPair},
};

/// Parameters bound into an authorization code at consent time.
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode<'a> {
    pub client_id: &'a str,
    pub principal_id: &'a str,
    pub redirect_uri: &'a str,
    pub code_challenge: &'a str,
    pub code_challenge_method: &'a str,
    pub scopes: &'a ScopeSet,
}

/// Single-use, short-lived authorization codes.
#[derive(Clone)]
pub struct AuthorizationCodes {
    pool: SqlitePool,
    clock: SharedClock,
    ttl_secs: i64,
    tokens: TokenService,
}

impl AuthorizationCodes {
    pub fn new(pool: SqlitePool, clock: SharedClock, ttl_secs: i64, tokens: TokenService) -> Self {
        Self {
            pool,
            clock,
            ttl_secs,
            tokens,
        }
    }

    /// Persists a fresh code and returns its plaintext, which is never stored.
    pub async fn issue(&self, request: NewAuthorizationCode<'_>) -> AppResult<String> {
        if request.code_challenge_method != pkce::S256 {
            return Err(OAuthError::invalid_request("Only S256 code_challenge_method is supported").into());
        }

        let code = generate_authorization_code();
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.ttl_secs);

        sqlx::query(
            r#"INSERT INTO authorization_codes
               (id, code_hash, client_id, principal_id, redirect_uri, code_challenge,
                code_challenge_method, scopes, expires_at, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(hash_token(&code))
        .bind(request.client_id)
        .bind(request.principal_id)
        .bind(request.redirect_uri)
        .bind(request.code_challenge)
        .bind(request.code_challenge_method)
        .bind(request.scopes.to_json()?)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, client_id = request.client_id, "failed to store authorization code");
            AppError::from(e)
        })?;

        info!(
            client_id = request.client_id,
            principal_id = request.principal_id,
            scope = %request.scopes,
            "issued authorization code"
        );
        Ok(code)
    }

    /// Exchanges a code for a token pair. Succeeds at most once per code.
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> AppResult<TokenPair> {
        let record = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code_hash = ?1",
        )
        .bind(hash_token(code))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to look up authorization code");
            AppError::from(e)
        })?
        .ok_or_else(|| OAuthError::invalid_grant("Invalid authorization code"))?;

        if record.used_at.is_some() {
            warn!(client_id, "authorization code replayed");
            return Err(OAuthError::invalid_grant("Authorization code already used").into());
        }
        let now = self.clock.now();
        if now > record.expires_at {
            return Err(OAuthError::invalid_grant("Authorization code expired").into());
        }
        if record.client_id != client_id {
            warn!(client_id, "authorization code presented by another client");
            return Err(OAuthError::invalid_client("Client ID mismatch").into());
        }
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant("Redirect URI mismatch").into());
        }
        if !pkce::verify(
            code_verifier,
            &record.code_challenge,
            &record.code_challenge_method,
        ) {
            warn!(client_id, "pkce verification failed");
            return Err(OAuthError::invalid_grant("Invalid code verifier").into());
        }

        let scopes = ScopeSet::from_json(&record.scopes)?;

        let mut tx = self.pool.begin().await?;
        let marked = sqlx::query(
            "UPDATE authorization_codes SET used_at = ?1 WHERE id = ?2 AND used_at IS NULL",
        )
        .bind(now)
        .bind(&record.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, client_id, "failed to mark authorization code used");
            AppError::from(e)
        })?
        .rows_affected();

        if marked == 0 {
            tx.rollback().await?;
            warn!(client_id, "authorization code redeemed concurrently");
            return Err(OAuthError::invalid_grant("Authorization code already used").into());
        }

        let pair = self
            .tokens
            .insert_pair(&mut tx, &record.client_id, &record.principal_id, &scopes)
            .await?;
        tx.commit().await.map_err(|e| {
            error!(error = %e, client_id, "failed to commit code redemption");
            AppError::from(e)
        })?;

        Ok(pair)
    }
}
