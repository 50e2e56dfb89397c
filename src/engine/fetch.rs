use futures::future::join_all;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::calendar::weeks_in_year;
use crate::limits::MIN_WEEK;
use crate::model::*;
use crate::observability;

use super::Engine;

/// One region's availability. `weeks: None` means the fetch failed and the
/// region's availability is unknown for this round.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFragment {
    pub region: RegionId,
    pub weeks: Option<Vec<WeekStatus>>,
}

/// Every branch of one reconciliation round, all settled.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRound {
    Director {
        own: Result<Vec<Booking>, ApiError>,
        regions: Vec<RegionFragment>,
    },
    Admin {
        all: Result<Vec<Booking>, ApiError>,
        /// Directors the backend knows about, with or without bookings.
        roster: Vec<UserId>,
    },
}

impl Engine {
    /// Fan out one request per region (directors), or fetch every booking
    /// and the director roster (admins), and wait for every branch to settle.
    pub(super) async fn fetch_round(&self, regions: &[Region], year: i32) -> FetchRound {
        if self.caller.is_admin {
            let (all, reports) = tokio::join!(self.api.all_bookings(), self.api.admin_coverage());
            let all = all.map(|records| resolve_records(records, regions, None));
            if let Err(e) = &all {
                warn!("all-bookings fetch failed: {e}");
            }
            let roster = match reports {
                Ok(reports) => reports.into_iter().filter_map(|r| r.user_email).collect(),
                Err(e) => {
                    // Directors without bookings drop out of the average.
                    warn!("director roster fetch failed, averaging over owners only: {e}");
                    Vec::new()
                }
            };
            return FetchRound::Admin { all, roster };
        }

        let own = async {
            self.api
                .my_bookings()
                .await
                .map(|records| resolve_records(records, regions, Some(self.caller.email.as_str())))
        };
        let per_region = join_all(regions.iter().map(|r| self.fetch_region(r.id, year)));
        let (own, fragments) = tokio::join!(own, per_region);

        if let Err(e) = &own {
            warn!("own-bookings fetch failed for {}: {e}", self.caller.email);
        }
        FetchRound::Director {
            own,
            regions: fragments,
        }
    }

    async fn fetch_region(&self, region: RegionId, year: i32) -> RegionFragment {
        match self.api.week_availability(region, year).await {
            Ok(body) if body.region_id.is_some_and(|id| id != region) => {
                warn!(
                    "availability for region {region} answered for region {:?}, ignoring",
                    body.region_id
                );
                metrics::counter!(observability::REGION_FETCH_FAILURES_TOTAL, "reason" => "mismatch")
                    .increment(1);
                RegionFragment { region, weeks: None }
            }
            Ok(body) if body.year.is_some_and(|y| y != year) => {
                warn!(
                    "availability for region {region} answered for year {:?}, expected {year}",
                    body.year
                );
                metrics::counter!(observability::REGION_FETCH_FAILURES_TOTAL, "reason" => "mismatch")
                    .increment(1);
                RegionFragment { region, weeks: None }
            }
            Ok(body) => {
                let last = weeks_in_year(year) as u32;
                let weeks: Vec<WeekStatus> = body
                    .weeks
                    .into_iter()
                    .filter(|w| (MIN_WEEK as u32..=last).contains(&w.week))
                    .collect();
                debug!("region {region}: {} weeks", weeks.len());
                RegionFragment {
                    region,
                    weeks: Some(weeks),
                }
            }
            Err(e) => {
                warn!("availability fetch failed for region {region}: {e}");
                metrics::counter!(observability::REGION_FETCH_FAILURES_TOTAL, "reason" => "request")
                    .increment(1);
                RegionFragment { region, weeks: None }
            }
        }
    }
}

/// Resolve wire records, dropping (and logging) any that cannot be placed.
pub(super) fn resolve_records(
    records: Vec<BookingRecord>,
    regions: &[Region],
    fallback_owner: Option<&str>,
) -> Vec<Booking> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id;
        match record.resolve(regions, fallback_owner) {
            Some(booking) => out.push(booking),
            None => warn!("skipping unresolvable booking record {id}"),
        }
    }
    out
}
