use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The two fixed windows every identifier is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowClass {
    Short,
    Long,
}

impl WindowClass {
    pub const ALL: [WindowClass; 2] = [WindowClass::Short, WindowClass::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowClass::Short => "minute",
            WindowClass::Long => "hour",
        }
    }

    pub fn size_secs(&self) -> i64 {
        match self {
            WindowClass::Short => 60,
            WindowClass::Long => 3600,
        }
    }

    /// Start of the aligned window containing `now` (unix seconds).
    pub fn window_start(&self, now: i64) -> i64 {
        let size = self.size_secs();
        now.div_euclid(size) * size
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RateLimitWindow {
    pub identifier: String,
    pub window_type: String,
    pub window_start: i64,
    pub request_count: i64,
    pub last_request: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limited: bool,
    pub reason: Option<String>,
    pub retry_after: Option<i64>,
    pub limit: Option<i64>,
    pub current: Option<i64>,
}

impl RateLimitStatus {
    pub fn allowed() -> Self {
        Self {
            limited: false,
            reason: None,
            retry_after: None,
            limit: None,
            current: None,
        }
    }
}
