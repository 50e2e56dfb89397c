// ── Validation limits ────────────────────────────────────────────

/// Earliest year the backend accepts a booking for.
pub const MIN_YEAR: i32 = 2000;

/// Latest year the backend accepts a booking for.
pub const MAX_YEAR: i32 = 2100;

pub const MIN_WEEK: u8 = 1;

/// ISO years have 52 or 53 weeks; the per-year bound comes from `calendar::weeks_in_year`.
pub const MAX_WEEK: u8 = 53;

/// Upper bound on regions fetched in one reconciliation round.
pub const MAX_REGIONS: usize = 256;

/// Rates reported by the backend are rounded to two decimals.
pub const COVERAGE_RATE_TOLERANCE: f64 = 0.01;

/// Pages followed for one paginated listing before giving up.
pub const MAX_PAGES: usize = 100;
