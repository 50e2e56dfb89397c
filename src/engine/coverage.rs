use std::collections::{BTreeMap, BTreeSet};

use crate::model::*;

/// Distinct regions touched out of `total_regions`, as a percentage in `[0, 100]`.
pub fn compute_coverage(bookings: &[Booking], total_regions: u32) -> CoverageRecord {
    let distinct: BTreeSet<RegionId> = bookings.iter().map(|b| b.region).collect();
    let distinct_regions_count = distinct.len() as u32;
    let coverage_rate = if total_regions == 0 {
        0.0
    } else {
        (distinct_regions_count as f64 / total_regions as f64 * 100.0).clamp(0.0, 100.0)
    };
    CoverageRecord {
        distinct_regions_count,
        total_regions,
        coverage_rate,
    }
}

/// Arithmetic mean of individual rates; 0 for an empty list.
pub fn average_rate<'a>(records: impl IntoIterator<Item = &'a CoverageRecord>) -> f64 {
    let (sum, n) = records
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), r| (sum + r.coverage_rate, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Admin summary. `average_rate` is the mean of each director's own rate;
/// `pooled` is the coverage of all bookings together. They answer different
/// questions and are never substituted for one another.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetCoverage {
    pub per_director: BTreeMap<UserId, CoverageRecord>,
    pub average_rate: f64,
    pub pooled: CoverageRecord,
}

/// Directors are the booking owners plus `roster`, so a director without
/// any booking still counts as 0%.
pub fn fleet_coverage(bookings: &[Booking], roster: &[UserId], total_regions: u32) -> FleetCoverage {
    let mut by_owner: BTreeMap<UserId, Vec<Booking>> = roster
        .iter()
        .map(|d| (d.clone(), Vec::new()))
        .collect();
    for b in bookings {
        by_owner.entry(b.owner.clone()).or_default().push(b.clone());
    }
    let per_director: BTreeMap<UserId, CoverageRecord> = by_owner
        .into_iter()
        .map(|(owner, owned)| (owner, compute_coverage(&owned, total_regions)))
        .collect();
    FleetCoverage {
        average_rate: average_rate(per_director.values()),
        pooled: compute_coverage(bookings, total_regions),
        per_director,
    }
}

/// Colour band of a coverage rate in the summary widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageBand {
    High,
    Good,
    Fair,
    Low,
}

pub fn coverage_band(rate: f64) -> CoverageBand {
    if rate >= 80.0 {
        CoverageBand::High
    } else if rate >= 50.0 {
        CoverageBand::Good
    } else if rate >= 30.0 {
        CoverageBand::Fair
    } else {
        CoverageBand::Low
    }
}
