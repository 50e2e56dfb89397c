use crate::api::ApiError;
use crate::model::{BookingId, RegionId, Week};

#[derive(Debug)]
pub enum EngineError {
    NoRegions,
    InvalidTarget(&'static str),
    SlotTaken { region: RegionId, week: Week },
    WeekLocked { week: Week },
    PermissionDenied(String),
    /// Server-side rejection, reason verbatim.
    Rejected(String),
    UnknownBooking(BookingId),
    Api(ApiError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoRegions => write!(f, "no regions loaded"),
            EngineError::InvalidTarget(msg) => write!(f, "invalid target: {msg}"),
            EngineError::SlotTaken { region, week } => {
                write!(f, "region {region} is already booked for week {week}")
            }
            EngineError::WeekLocked { week } => {
                write!(f, "week {week} is already booked on another region")
            }
            EngineError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            EngineError::Rejected(reason) => write!(f, "{reason}"),
            EngineError::UnknownBooking(id) => write!(f, "unknown booking: {id}"),
            EngineError::Api(e) => write!(f, "API error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ApiError> for EngineError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Rejected(reason) => EngineError::Rejected(reason),
            ApiError::Forbidden(reason) => EngineError::PermissionDenied(reason),
            other => EngineError::Api(other),
        }
    }
}

impl EngineError {
    /// True for rejections decided without a server round trip.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidTarget(_)
                | EngineError::SlotTaken { .. }
                | EngineError::WeekLocked { .. }
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NoRegions => "no_regions",
            EngineError::InvalidTarget(_) => "invalid_target",
            EngineError::SlotTaken { .. } => "slot_taken",
            EngineError::WeekLocked { .. } => "week_locked",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::Rejected(_) => "rejected",
            EngineError::UnknownBooking(_) => "unknown_booking",
            EngineError::Api(_) => "api_error",
        }
    }
}
