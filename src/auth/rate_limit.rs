use sqlx::SqlitePool;
use tracing::{debug, error};

use crate::{
    clock::SharedClock,
    config::RateLimitConfig,
    error::{AppError, AppResult},
    models::{RateLimitStatus, WindowClass},
};

/// Fixed-window request counters, one short and one long window per
/// identifier.
#[derive(Clone)]
pub struct RateLimiter {
    pool: SqlitePool,
    clock: SharedClock,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(pool: SqlitePool, clock: SharedClock, config: RateLimitConfig) -> Self {
        Self {
            pool,
            clock,
            config,
        }
    }

    fn ceiling(&self, window: WindowClass) -> i64 {
        match window {
            WindowClass::Short => self.config.per_minute,
            WindowClass::Long => self.config.per_hour,
        }
    }

    /// Checks the short window, then the long one. The first window at or
    /// over its ceiling decides.
    pub async fn is_limited(&self, identifier: &str) -> AppResult<RateLimitStatus> {
        let now = self.clock.now().timestamp();

        for window in WindowClass::ALL {
            let start = window.window_start(now);
            let count: Option<i64> = sqlx::query_scalar(
                r#"SELECT request_count FROM rate_limits
                   WHERE identifier = ?1 AND window_type = ?2 AND window_start = ?3"#,
            )
            .bind(identifier)
            .bind(window.as_str())
            .bind(start)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, identifier, "failed to read rate limit window");
                AppError::from(e)
            })?;

            let current = count.unwrap_or(0);
            let limit = self.ceiling(window);
            if current >= limit {
                return Ok(RateLimitStatus {
                    limited: true,
                    reason: Some(format!("{} requests per {}", limit, window.as_str())),
                    retry_after: Some(start + window.size_secs() - now),
                    limit: Some(limit),
                    current: Some(current),
                });
            }
        }

        Ok(RateLimitStatus::allowed())
    }

    /// Counts one request against both current windows.
    pub async fn record(&self, identifier: &str) -> AppResult<()> {
        let now = self.clock.now().timestamp();

        for window in WindowClass::ALL {
            sqlx::query(
                r#"INSERT INTO rate_limits (identifier, window_type, window_start, request_count, last_request)
                   VALUES (?1, ?2, ?3, 1, ?4)
                   ON CONFLICT(identifier, window_type, window_start)
                   DO UPDATE SET request_count = request_count + 1, last_request = excluded.last_request"#,
            )
            .bind(identifier)
            .bind(window.as_str())
            .bind(window.window_start(now))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, identifier, "failed to record request");
                AppError::from(e)
            })?;
        }

        Ok(())
    }

    /// Drops windows that started before the retention horizon.
    pub async fn prune(&self) -> AppResult<u64> {
        let cutoff = self.clock.now().timestamp() - self.config.retention_secs;
        let deleted = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to prune rate limit windows");
                AppError::from(e)
            })?
            .rows_affected();

        debug!(deleted, "pruned rate limit windows");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::MockClock, models::RateLimitWindow, test_support::memory_pool};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    async fn limiter(per_minute: i64, per_hour: i64) -> (RateLimiter, MockClock) {
        // 10s into a minute that is itself 10 minutes into an hour.
        let clock = MockClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 10).unwrap());
        let config = RateLimitConfig {
            per_minute,
            per_hour,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(memory_pool().await, Arc::new(clock.clone()), config);
        (limiter, clock)
    }

    #[tokio::test]
    async fn short_window_ceiling() {
        let (limiter, clock) = limiter(3, 1000).await;

        for _ in 0..3 {
            assert!(!limiter.is_limited("user:a").await.unwrap().limited);
            limiter.record("user:a").await.unwrap();
        }

        let status = limiter.is_limited("user:a").await.unwrap();
        assert!(status.limited);
        assert_eq!(status.retry_after, Some(50));
        assert_eq!(status.limit, Some(3));
        assert_eq!(status.current, Some(3));
        assert_eq!(status.reason.as_deref(), Some("3 requests per minute"));

        assert!(!limiter.is_limited("user:b").await.unwrap().limited);

        clock.advance(Duration::seconds(50));
        assert!(!limiter.is_limited("user:a").await.unwrap().limited);
    }

    #[tokio::test]
    async fn long_window_reports_its_own_retry_after() {
        let (limiter, clock) = limiter(100, 2).await;

        limiter.record("ip:10.0.0.1").await.unwrap();
        clock.advance(Duration::seconds(60));
        limiter.record("ip:10.0.0.1").await.unwrap();

        let status = limiter.is_limited("ip:10.0.0.1").await.unwrap();
        assert!(status.limited);
        assert_eq!(status.reason.as_deref(), Some("2 requests per hour"));
        // 12:11:10 -> 13:00:00
        assert_eq!(status.retry_after, Some(48 * 60 + 50));
    }

    #[tokio::test]
    async fn prune_drops_only_windows_past_retention() {
        let (limiter, clock) = limiter(50, 1000).await;
        limiter.record("user:old").await.unwrap();

        clock.advance(Duration::hours(25));
        limiter.record("user:new").await.unwrap();

        assert_eq!(limiter.prune().await.unwrap(), 2);
        assert_eq!(limiter.prune().await.unwrap(), 0);

        limiter.record("user:new").await.unwrap();
        let windows = sqlx::query_as::<_, RateLimitWindow>(
            "SELECT * FROM rate_limits WHERE identifier = 'user:new' ORDER BY window_type",
        )
        .fetch_all(&limiter.pool)
        .await
        .unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].window_type, "hour");
        assert_eq!(windows[1].window_type, "minute");
        assert!(windows.iter().all(|w| w.request_count == 2));
        assert_eq!(windows[1].window_start % 60, 0);
    }
}
