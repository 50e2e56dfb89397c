use std::time::Duration;

use crate::calendar::current_iso_week;
use crate::model::Caller;

const DEFAULT_USER: &str = "director@example.com";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Binary configuration, read from `WEEKBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Booking API root. `None` runs against the in-process demo backend.
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub user: String,
    pub admin: bool,
    pub year: i32,
    pub timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_url: get("WEEKBOOK_API_URL"),
            token: get("WEEKBOOK_TOKEN"),
            user: get("WEEKBOOK_USER").unwrap_or_else(|| DEFAULT_USER.into()),
            admin: get("WEEKBOOK_ADMIN")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            year: get("WEEKBOOK_YEAR")
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| current_iso_week().0),
            timeout: Duration::from_millis(
                get("WEEKBOOK_TIMEOUT_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            metrics_port: get("WEEKBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }

    pub fn caller(&self) -> Caller {
        if self.admin {
            Caller::admin(self.user.clone())
        } else {
            Caller::director(self.user.clone())
        }
    }
}
