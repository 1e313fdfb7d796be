use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    api::tools::ToolRegistry,
    auth::{
        clients::ClientRegistry, codes::AuthorizationCodes, middleware::AuthorizationGate,
        rate_limit::RateLimiter, token_service::TokenService,
    },
    clock::SharedClock,
    config::AppConfig,
};

mod oauth_client;
mod rate_limit;
mod token;

pub use oauth_client::*;
pub use rate_limit::*;
pub use token::*;

pub type Db = SqlitePool;

/// Everything a request handler needs, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: Db,
    pub config: Arc<AppConfig>,
    pub clients: ClientRegistry,
    pub codes: AuthorizationCodes,
    pub tokens: TokenService,
    pub gate: AuthorizationGate,
    pub rate_limiter: RateLimiter,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(pool: Db, config: AppConfig, clock: SharedClock) -> Self {
        let tokens = TokenService::new(pool.clone(), clock.clone(), config.tokens.clone());
        let codes = AuthorizationCodes::new(
            pool.clone(),
            clock.clone(),
            config.tokens.auth_code_ttl_secs,
            tokens.clone(),
        );
        let clients = ClientRegistry::new(pool.clone(), clock.clone());
        let rate_limiter = RateLimiter::new(pool.clone(), clock, config.rate_limit.clone());
        let gate = AuthorizationGate::new(tokens.clone());

        Self {
            pool,
            config: Arc::new(config),
            clients,
            codes,
            tokens,
            gate,
            rate_limiter,
            tools: Arc::new(ToolRegistry::builtin()),
        }
    }
}
