use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolgate_api::{
    api,
    auth::rate_limit::RateLimiter,
    clock::SystemClock,
    config::AppConfig,
    models::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = env::var("RUST_LOG")
        .unwrap_or_else(|_| "toolgate_api=info,axum=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    if config.auto_register_clients {
        tracing::warn!("auto-registration of unknown OAuth clients is enabled");
    }
    if config.admin_api_key.is_none() {
        tracing::info!("ADMIN_API_KEY not set, client administration is disabled");
    }
    if config.consent_api_key.is_none() {
        tracing::warn!("CONSENT_API_KEY not set, consent decisions will be refused");
    }

    let port = config.port;
    let prune_every = Duration::from_secs(config.rate_limit.prune_interval_secs.max(1));
    let state = Arc::new(AppState::new(pool, config, Arc::new(SystemClock)));

    tokio::spawn(prune_rate_limits(state.rate_limiter.clone(), prune_every));

    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, "toolgate-api listening");

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn prune_rate_limits(limiter: RateLimiter, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match limiter.prune().await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "pruned expired rate limit windows"),
            // Already logged by the limiter; the next tick retries.
            Err(_) => {}
        }
    }
}
