use std::{env, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Lifetimes of issued credentials, in seconds.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub auth_code_ttl_secs: i64,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            auth_code_ttl_secs: 600,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 2_592_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_minute: i64,
    pub per_hour: i64,
    pub retention_secs: i64,
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 50,
            per_hour: 1000,
            retention_secs: 86_400,
            prune_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub tokens: TokenConfig,
    pub rate_limit: RateLimitConfig,
    /// Register unknown clients on first authorize request, trusting the
    /// redirect URI and scopes that request presents. Off unless opted in.
    pub auto_register_clients: bool,
    /// Shared secret for `/admin`; the admin API rejects everything when unset.
    pub admin_api_key: Option<String>,
    /// Shared secret the consent UI presents when posting a decision;
    /// consent submissions are refused when unset.
    pub consent_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://./toolgate.db?mode=rwc".to_string(),
            database_max_connections: 5,
            tokens: TokenConfig::default(),
            rate_limit: RateLimitConfig::default(),
            auto_register_clients: false,
            admin_api_key: None,
            consent_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_var("APP_PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            tokens: TokenConfig {
                auth_code_ttl_secs: parse_var(
                    "AUTH_CODE_TTL_SECS",
                    defaults.tokens.auth_code_ttl_secs,
                )?,
                access_token_ttl_secs: parse_var(
                    "ACCESS_TOKEN_TTL_SECS",
                    defaults.tokens.access_token_ttl_secs,
                )?,
                refresh_token_ttl_secs: parse_var(
                    "REFRESH_TOKEN_TTL_SECS",
                    defaults.tokens.refresh_token_ttl_secs,
                )?,
            },
            rate_limit: RateLimitConfig {
                per_minute: parse_var("RATE_LIMIT_PER_MINUTE", defaults.rate_limit.per_minute)?,
                per_hour: parse_var("RATE_LIMIT_PER_HOUR", defaults.rate_limit.per_hour)?,
                retention_secs: parse_var(
                    "RATE_LIMIT_RETENTION_SECS",
                    defaults.rate_limit.retention_secs,
                )?,
                prune_interval_secs: parse_var(
                    "RATE_LIMIT_PRUNE_INTERVAL_SECS",
                    defaults.rate_limit.prune_interval_secs,
                )?,
            },
            auto_register_clients: parse_bool("AUTO_REGISTER_CLIENTS", false)?,
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            consent_api_key: env::var("CONSENT_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value }),
        },
        Err(_) => Ok(default),
    }
}
