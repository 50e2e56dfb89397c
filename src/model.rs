use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::*;

pub type RegionId = u32;
pub type BookingId = u64;
/// Email address, the identity the backend reports in `booked_by` and `user_email`.
pub type UserId = String;
pub type Week = u8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
}

/// One booking occupies exactly one (region, year, week) slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: BookingId,
    pub region: RegionId,
    pub region_name: Option<String>,
    pub year: i32,
    pub week: Week,
    pub owner: UserId,
    pub created_at: Option<DateTime<Utc>>,
}

/// Who holds a (region, week) cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BookedBy {
    Free,
    /// Occupied, holder withheld from a non-admin viewer.
    Anonymous,
    By(UserId),
}

impl BookedBy {
    pub fn is_free(&self) -> bool {
        matches!(self, BookedBy::Free)
    }

    pub fn holder(&self) -> Option<&str> {
        match self {
            BookedBy::By(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_held_by(&self, user: &str) -> bool {
        self.holder() == Some(user)
    }
}

/// The identity the engine reconciles on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub email: UserId,
    pub is_admin: bool,
}

impl Caller {
    pub fn director(email: impl Into<UserId>) -> Self {
        Self {
            email: email.into(),
            is_admin: false,
        }
    }

    pub fn admin(email: impl Into<UserId>) -> Self {
        Self {
            email: email.into(),
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub distinct_regions_count: u32,
    pub total_regions: u32,
    /// Percentage in `[0, 100]`.
    pub coverage_rate: f64,
}

impl CoverageRecord {
    /// Counts must match exactly; rates within the backend's rounding.
    pub fn agrees_with(&self, other: &CoverageRecord) -> bool {
        self.distinct_regions_count == other.distinct_regions_count
            && self.total_regions == other.total_regions
            && (self.coverage_rate - other.coverage_rate).abs() <= COVERAGE_RATE_TOLERANCE
    }
}

// ── Wire records ─────────────────────────────────────────────────

/// Listings arrive either as a bare array or as a paginated page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Page {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        self.into_page().0
    }

    /// Items of this page and the link to the following one, if any.
    pub fn into_page(self) -> (Vec<T>, Option<String>) {
        match self {
            Listing::Plain(items) => (items, None),
            Listing::Page { results, next } => (results, next),
        }
    }
}

/// Booking as the backend serializes it. Detail responses carry `region`;
/// list responses may only carry `region_name`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRecord {
    pub id: BookingId,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub region: Option<RegionId>,
    #[serde(default)]
    pub region_name: Option<String>,
    pub year: i32,
    pub week: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl BookingRecord {
    /// Resolve into a domain booking. Returns `None` when the region or the
    /// owner cannot be determined, or the week is out of range.
    pub fn resolve(self, regions: &[Region], fallback_owner: Option<&str>) -> Option<Booking> {
        let region = match self.region {
            Some(id) => id,
            None => {
                let name = self.region_name.as_deref()?;
                regions.iter().find(|r| r.name == name)?.id
            }
        };
        let owner = self
            .user_email
            .or_else(|| fallback_owner.map(str::to_owned))?;
        let week = Week::try_from(self.week).ok()?;
        if !(MIN_WEEK..=MAX_WEEK).contains(&week) {
            return None;
        }
        let region_name = self
            .region_name
            .or_else(|| regions.iter().find(|r| r.id == region).map(|r| r.name.clone()));
        Some(Booking {
            id: self.id,
            region,
            region_name,
            year: self.year,
            week,
            owner,
            created_at: self.created_at,
        })
    }
}

/// `booked_by` is `null`, absent, `true`, or an email depending on the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawBookedBy {
    Flag(bool),
    Email(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeekStatus {
    pub week: u32,
    pub is_available: bool,
    #[serde(default)]
    pub booked_by: Option<RawBookedBy>,
}

impl WeekStatus {
    pub fn occupant(&self) -> BookedBy {
        if self.is_available {
            return BookedBy::Free;
        }
        match &self.booked_by {
            Some(RawBookedBy::Email(email)) if !email.is_empty() => BookedBy::By(email.clone()),
            _ => BookedBy::Anonymous,
        }
    }
}

/// Body of `GET /weeks/availability/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionWeeks {
    #[serde(default)]
    pub region_id: Option<RegionId>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub weeks: Vec<WeekStatus>,
}

/// Body of `GET /coverage/my/` and each entry of `GET /admin/coverage/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoverageReport {
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(flatten)]
    pub record: CoverageRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBooking {
    pub region: RegionId,
    pub year: i32,
    pub week: Week,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookingChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<Week>,
}

impl BookingChanges {
    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.year.is_none() && self.week.is_none()
    }
}
