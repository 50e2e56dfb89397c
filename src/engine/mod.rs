mod conflict;
mod coverage;
mod error;
mod fetch;
mod merge;
mod mutations;

pub use coverage::{
    average_rate, compute_coverage, coverage_band, fleet_coverage, CoverageBand, FleetCoverage,
};
pub use error::EngineError;
pub use fetch::{FetchRound, RegionFragment};
pub use merge::{booked_by, merge, Merged, UserWeeklyLock, WeekAvailability};

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::api::BookingApi;
use crate::limits::*;
use crate::model::*;
use crate::observability;

/// Everything one reconciliation round produced. Published whole and never
/// mutated afterwards; consumers hold it as `Arc<Snapshot>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// 0 for the initial empty snapshot.
    pub round: u64,
    pub year: i32,
    pub availability: WeekAvailability,
    pub locks: UserWeeklyLock,
    pub bookings: Vec<Booking>,
    pub degraded_regions: Vec<RegionId>,
    /// Banner text when the bookings branch failed; locks are empty then.
    pub bookings_error: Option<String>,
    /// Caller's coverage (directors) or pooled coverage of every booking (admins).
    pub coverage: CoverageRecord,
    /// Admins only.
    pub fleet: Option<FleetCoverage>,
}

impl Snapshot {
    fn empty(year: i32) -> Self {
        Self {
            round: 0,
            year,
            availability: WeekAvailability::new(),
            locks: UserWeeklyLock::new(),
            bookings: Vec::new(),
            degraded_regions: Vec::new(),
            bookings_error: None,
            coverage: compute_coverage(&[], 0),
            fleet: None,
        }
    }

    pub fn booked_by(&self, region: RegionId, week: Week) -> BookedBy {
        booked_by(&self.availability, region, week)
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn is_degraded(&self, region: RegionId) -> bool {
        self.degraded_regions.contains(&region)
    }
}

#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Published(Arc<Snapshot>),
    /// A newer round was started before this one settled.
    Discarded { round: u64 },
}

impl RoundOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RoundOutcome::Published(_))
    }
}

/// Local coverage compared with the backend's authoritative figure.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageCheck {
    pub user: UserId,
    pub local: CoverageRecord,
    pub remote: CoverageRecord,
    pub agrees: bool,
}

pub struct Engine {
    api: Arc<dyn BookingApi>,
    caller: Caller,
    year: AtomicI32,
    regions: RwLock<Arc<Vec<Region>>>,
    round_seq: AtomicU64,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
}

impl Engine {
    pub fn new(api: Arc<dyn BookingApi>, caller: Caller, year: i32) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty(year)));
        Self {
            api,
            caller,
            year: AtomicI32::new(year),
            regions: RwLock::new(Arc::new(Vec::new())),
            round_seq: AtomicU64::new(0),
            snapshot_tx,
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn year(&self) -> i32 {
        self.year.load(Ordering::SeqCst)
    }

    /// Switch the displayed year. In-flight rounds for the old year are discarded.
    pub fn set_year(&self, year: i32) -> Result<(), EngineError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(EngineError::InvalidTarget("year out of range"));
        }
        self.year.store(year, Ordering::SeqCst);
        self.invalidate();
        Ok(())
    }

    /// Fetch the region directory once; later calls return the cached list.
    pub async fn load_regions(&self) -> Result<Arc<Vec<Region>>, EngineError> {
        {
            let cached = self.regions.read().await;
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }
        let mut regions = self.api.regions().await?;
        regions.sort_by_key(|r| r.id);
        regions.dedup_by_key(|r| r.id);
        if regions.is_empty() {
            return Err(EngineError::NoRegions);
        }
        if regions.len() > MAX_REGIONS {
            warn!(
                "directory lists {} regions, keeping the first {MAX_REGIONS}",
                regions.len()
            );
            regions.truncate(MAX_REGIONS);
        }
        let regions = Arc::new(regions);
        *self.regions.write().await = regions.clone();
        info!("loaded {} regions", regions.len());
        Ok(regions)
    }

    pub async fn regions(&self) -> Arc<Vec<Region>> {
        self.regions.read().await.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Follow published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Discard every round still in flight. Returns the new high-water mark.
    pub fn invalidate(&self) -> u64 {
        self.round_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run one full fetch + merge round for the displayed year.
    ///
    /// The merge only runs after every branch has settled. The result is
    /// published unless a newer round was started meanwhile.
    pub async fn reconcile(&self) -> Result<RoundOutcome, EngineError> {
        let round = self.round_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let year = self.year();
        let regions = self.regions().await;
        if regions.is_empty() {
            return Err(EngineError::NoRegions);
        }

        let started = Instant::now();
        let fetched = self.fetch_round(&regions, year).await;
        let merged = merge(&fetched, &self.caller, year);
        let snapshot = Arc::new(self.build_snapshot(round, year, merged, &regions));
        metrics::histogram!(observability::ROUND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if self.publish(snapshot.clone()) {
            debug!(
                "round {round} published: {} occupied cells, {} locked weeks, {} degraded regions",
                snapshot.availability.len(),
                snapshot.locks.len(),
                snapshot.degraded_regions.len()
            );
            metrics::counter!(observability::ROUNDS_TOTAL, "outcome" => "published").increment(1);
            Ok(RoundOutcome::Published(snapshot))
        } else {
            debug!("round {round} discarded as stale");
            metrics::counter!(observability::ROUNDS_TOTAL, "outcome" => "discarded").increment(1);
            Ok(RoundOutcome::Discarded { round })
        }
    }

    fn build_snapshot(&self, round: u64, year: i32, merged: Merged, regions: &[Region]) -> Snapshot {
        let total = regions.len() as u32;
        let (coverage, fleet) = if self.caller.is_admin {
            let fleet = fleet_coverage(&merged.bookings, &merged.roster, total);
            (fleet.pooled, Some(fleet))
        } else {
            (compute_coverage(&merged.bookings, total), None)
        };
        Snapshot {
            round,
            year,
            availability: merged.availability,
            locks: merged.locks,
            bookings: merged.bookings,
            degraded_regions: merged.degraded_regions,
            bookings_error: merged.bookings_error,
            coverage,
            fleet,
        }
    }

    /// Replace the published snapshot if `snapshot` is still the newest round.
    fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        self.snapshot_tx.send_if_modified(|current| {
            let latest = self.round_seq.load(Ordering::SeqCst);
            if snapshot.round != latest || current.round >= snapshot.round {
                return false;
            }
            *current = snapshot;
            true
        })
    }

    /// Compare locally computed coverage with the backend's figures.
    /// Directors get one entry; admins one per director the backend reports.
    pub async fn verify_coverage(&self) -> Result<Vec<CoverageCheck>, EngineError> {
        let snapshot = self.snapshot();
        let checks = if self.caller.is_admin {
            let total = self.regions().await.len() as u32;
            let remote = self.api.admin_coverage().await?;
            remote
                .into_iter()
                .filter_map(|report| {
                    let user = report.user_email?;
                    let local = snapshot
                        .fleet
                        .as_ref()
                        .and_then(|f| f.per_director.get(&user).copied())
                        .unwrap_or_else(|| compute_coverage(&[], total));
                    Some(CoverageCheck {
                        agrees: local.agrees_with(&report.record),
                        user,
                        local,
                        remote: report.record,
                    })
                })
                .collect::<Vec<_>>()
        } else {
            let report = self.api.my_coverage().await?;
            vec![CoverageCheck {
                user: self.caller.email.clone(),
                local: snapshot.coverage,
                remote: report.record,
                agrees: snapshot.coverage.agrees_with(&report.record),
            }]
        };
        for check in checks.iter().filter(|c| !c.agrees) {
            warn!(
                "coverage mismatch for {}: local {}/{} ({:.2}%), backend {}/{} ({:.2}%)",
                check.user,
                check.local.distinct_regions_count,
                check.local.total_regions,
                check.local.coverage_rate,
                check.remote.distinct_regions_count,
                check.remote.total_regions,
                check.remote.coverage_rate,
            );
        }
        Ok(checks)
    }
}
