use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// A migrated in-memory database. A single connection that never idles out
/// keeps the database alive for the whole test.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
