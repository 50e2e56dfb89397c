//! The REST boundary. Everything behind [`BookingApi`] is an external
//! collaborator: the engine only sees settled `Result`s.

mod http;
pub mod memory;

pub use http::HttpBookingApi;
pub use memory::{InMemoryApi, InMemoryBackend};

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection, timeout or TLS failure; no response was received.
    Transport(String),
    /// Unexpected status with whatever reason the body carried.
    Status { status: u16, reason: Option<String> },
    /// Validation or conflict rejection (400/409/422), reason verbatim.
    Rejected(String),
    /// 401/403, reason verbatim.
    Forbidden(String),
    NotFound,
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Transport(e) => write!(f, "transport error: {e}"),
            ApiError::Status { status, reason: Some(r) } => write!(f, "HTTP {status}: {r}"),
            ApiError::Status { status, reason: None } => write!(f, "HTTP {status}"),
            ApiError::Rejected(reason) => write!(f, "{reason}"),
            ApiError::Forbidden(reason) => write!(f, "forbidden: {reason}"),
            ApiError::NotFound => write!(f, "not found"),
            ApiError::Decode(e) => write!(f, "invalid response body: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Classify a non-success response. `body` is the raw response text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let reason = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| rejection_reason(&v));
        match status {
            400 | 409 | 422 => {
                ApiError::Rejected(reason.unwrap_or_else(|| format!("request rejected ({status})")))
            }
            401 | 403 => ApiError::Forbidden(reason.unwrap_or_else(|| "permission denied".into())),
            404 => ApiError::NotFound,
            _ => ApiError::Status { status, reason },
        }
    }
}

/// Pull the human-readable reason out of an error body.
///
/// Looks at `non_field_errors`, then `detail`, then `error`, then the first
/// field error (`"week": ["..."]` becomes `"week: ..."`).
pub fn rejection_reason(body: &serde_json::Value) -> Option<String> {
    fn first_message(v: &serde_json::Value) -> Option<String> {
        match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items.iter().find_map(first_message),
            serde_json::Value::Object(map) => map
                .get("non_field_errors")
                .and_then(first_message)
                .or_else(|| map.values().find_map(first_message)),
            _ => None,
        }
    }

    let obj = match body {
        serde_json::Value::Object(obj) => obj,
        other => return first_message(other),
    };
    for key in ["non_field_errors", "detail", "error"] {
        if let Some(msg) = obj.get(key).and_then(first_message) {
            return Some(msg);
        }
    }
    obj.iter()
        .find_map(|(field, v)| first_message(v).map(|msg| format!("{field}: {msg}")))
}

/// Contract of the booking backend, one method per endpoint.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// `GET /regions/`
    async fn regions(&self) -> Result<Vec<Region>, ApiError>;

    /// `GET /bookings/my/`
    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError>;

    /// `GET /bookings/`, every booking when called by an admin.
    async fn all_bookings(&self) -> Result<Vec<BookingRecord>, ApiError>;

    /// `GET /weeks/availability/?region_id=&year=`
    async fn week_availability(&self, region: RegionId, year: i32) -> Result<RegionWeeks, ApiError>;

    /// `POST /bookings/`
    async fn create_booking(&self, booking: &NewBooking) -> Result<BookingRecord, ApiError>;

    /// `PATCH /bookings/{id}/`
    async fn update_booking(
        &self,
        id: BookingId,
        changes: &BookingChanges,
    ) -> Result<BookingRecord, ApiError>;

    /// `DELETE /bookings/{id}/`
    async fn delete_booking(&self, id: BookingId) -> Result<(), ApiError>;

    /// `GET /coverage/my/`
    async fn my_coverage(&self) -> Result<CoverageReport, ApiError>;

    /// `GET /admin/coverage/`
    async fn admin_coverage(&self) -> Result<Vec<CoverageReport>, ApiError>;
}
