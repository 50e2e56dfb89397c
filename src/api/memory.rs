//! In-process backend that enforces the same rules as the booking server:
//! one booking per (region, year, week), one region per director per week,
//! owner-or-admin mutation, and admins never book. Used by the test suites
//! and the binary's offline mode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use tokio::sync::Notify;
use tracing::warn;

use crate::limits::*;
use crate::model::*;

use super::{ApiError, BookingApi};

type Slot = (RegionId, i32, Week);

/// Holds one `my_bookings` call open until released. The response is
/// captured before the hold, so a released call returns stale data.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Resolves once the held call has captured its response.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub struct InMemoryBackend {
    regions: Vec<Region>,
    bookings: DashMap<BookingId, Booking>,
    slots: DashMap<Slot, BookingId>,
    directors: DashSet<UserId>,
    next_id: AtomicU64,
    /// Serializes check-then-insert across `bookings` and `slots`.
    write_lock: tokio::sync::Mutex<()>,
    failing_regions: DashSet<RegionId>,
    fail_own_bookings: AtomicBool,
    own_bookings_gate: Mutex<Option<Arc<Gate>>>,
}

impl InMemoryBackend {
    pub fn new(regions: Vec<Region>) -> Arc<Self> {
        Arc::new(Self {
            regions,
            bookings: DashMap::new(),
            slots: DashMap::new(),
            directors: DashSet::new(),
            next_id: AtomicU64::new(1),
            write_lock: tokio::sync::Mutex::new(()),
            failing_regions: DashSet::new(),
            fail_own_bookings: AtomicBool::new(false),
            own_bookings_gate: Mutex::new(None),
        })
    }

    /// Regions named after the mission axes, with a few bookings already
    /// held by other directors in `year`.
    pub async fn demo(year: i32) -> Arc<Self> {
        let names = [
            "Dakar",
            "Thiès",
            "Saint-Louis",
            "Kaolack",
            "Ziguinchor",
            "Tambacounda",
            "Louga",
        ];
        let regions = names
            .iter()
            .enumerate()
            .map(|(i, name)| Region {
                id: i as RegionId + 1,
                name: (*name).to_string(),
            })
            .collect();
        let backend = Self::new(regions);
        let seed = [
            ("awa.diop@example.com", 1, 3),
            ("awa.diop@example.com", 4, 11),
            ("moussa.fall@example.com", 2, 3),
            ("moussa.fall@example.com", 6, 20),
        ];
        for (owner, region, week) in seed {
            if let Err(e) = backend
                .create(&Caller::director(owner), &NewBooking { region, year, week })
                .await
            {
                warn!("demo booking for {owner} (region {region}, week {week}) not seeded: {e}");
            }
        }
        backend
    }

    /// An API session acting as `caller`. Directors join the coverage roster.
    pub fn session(self: &Arc<Self>, caller: Caller) -> InMemoryApi {
        if !caller.is_admin {
            self.directors.insert(caller.email.clone());
        }
        InMemoryApi {
            backend: self.clone(),
            caller,
        }
    }

    pub fn fail_region(&self, region: RegionId) {
        self.failing_regions.insert(region);
    }

    pub fn heal_region(&self, region: RegionId) {
        self.failing_regions.remove(&region);
    }

    pub fn fail_own_bookings(&self, fail: bool) {
        self.fail_own_bookings.store(fail, Ordering::SeqCst);
    }

    /// Hold the next `my_bookings` call open until the returned gate is released.
    pub fn hold_next_own_bookings(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        if let Ok(mut slot) = self.own_bookings_gate.lock() {
            *slot = Some(gate.clone());
        }
        gate
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn bookings_of(&self, owner: &str) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }

    fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    fn validate(&self, region: RegionId, year: i32, week: Week) -> Result<(), ApiError> {
        if !(MIN_WEEK..=MAX_WEEK).contains(&week) {
            return Err(ApiError::Rejected(format!(
                "week: ISO week must be between {MIN_WEEK} and {MAX_WEEK}."
            )));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ApiError::Rejected(format!(
                "year: year must be between {MIN_YEAR} and {MAX_YEAR}."
            )));
        }
        if self.region(region).is_none() {
            return Err(ApiError::Rejected(format!(
                "region: invalid pk \"{region}\" - object does not exist."
            )));
        }
        Ok(())
    }

    /// Slot and exclusivity checks for `owner` taking `slot`, ignoring `moving`.
    fn check_free(&self, owner: &str, slot: Slot, moving: Option<BookingId>) -> Result<(), ApiError> {
        let (region, year, week) = slot;
        if let Some(holder) = self.slots.get(&slot)
            && Some(*holder.value()) != moving
        {
            let name = self.region(region).map(|r| r.name.as_str()).unwrap_or("?");
            return Err(ApiError::Rejected(format!(
                "Region ({name}) is already booked for ISO week {week} of {year}."
            )));
        }
        let clash = self.bookings.iter().any(|e| {
            let b = e.value();
            b.owner == owner && b.year == year && b.week == week && Some(b.id) != moving
        });
        if clash {
            return Err(ApiError::Rejected(format!(
                "You already hold a region for ISO week {week} of {year}."
            )));
        }
        Ok(())
    }

    pub async fn create(&self, caller: &Caller, new: &NewBooking) -> Result<Booking, ApiError> {
        if caller.is_admin {
            return Err(ApiError::Forbidden(
                "administrators cannot create bookings".into(),
            ));
        }
        self.validate(new.region, new.year, new.week)?;
        let _guard = self.write_lock.lock().await;
        let slot = (new.region, new.year, new.week);
        self.check_free(&caller.email, slot, None)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let booking = Booking {
            id,
            region: new.region,
            region_name: self.region(new.region).map(|r| r.name.clone()),
            year: new.year,
            week: new.week,
            owner: caller.email.clone(),
            created_at: Some(Utc::now()),
        };
        self.slots.insert(slot, id);
        self.bookings.insert(id, booking.clone());
        self.directors.insert(caller.email.clone());
        Ok(booking)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: BookingId,
        changes: &BookingChanges,
    ) -> Result<Booking, ApiError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .bookings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(ApiError::NotFound)?;
        if !caller.is_admin && current.owner != caller.email {
            return Err(ApiError::NotFound);
        }
        let region = changes.region.unwrap_or(current.region);
        let year = changes.year.unwrap_or(current.year);
        let week = changes.week.unwrap_or(current.week);
        self.validate(region, year, week)?;
        let slot = (region, year, week);
        self.check_free(&current.owner, slot, Some(id))?;

        let updated = Booking {
            region,
            region_name: self.region(region).map(|r| r.name.clone()),
            year,
            week,
            ..current.clone()
        };
        self.slots.remove(&(current.region, current.year, current.week));
        self.slots.insert(slot, id);
        self.bookings.insert(id, updated.clone());
        Ok(updated)
    }

    pub async fn delete(&self, caller: &Caller, id: BookingId) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .bookings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(ApiError::NotFound)?;
        if !caller.is_admin && current.owner != caller.email {
            return Err(ApiError::Forbidden(
                "only the owner or an administrator may delete a booking".into(),
            ));
        }
        self.slots.remove(&(current.region, current.year, current.week));
        self.bookings.remove(&id);
        Ok(())
    }

    fn coverage_of(&self, owner: &str) -> CoverageReport {
        let mut regions: Vec<RegionId> = self
            .bookings
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.value().region)
            .collect();
        regions.sort_unstable();
        regions.dedup();
        let total = self.regions.len() as u32;
        let rate = if total > 0 {
            (regions.len() as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        CoverageReport {
            user_email: Some(owner.to_string()),
            record: CoverageRecord {
                distinct_regions_count: regions.len() as u32,
                total_regions: total,
                coverage_rate: rate,
            },
        }
    }
}

fn to_record(b: Booking) -> BookingRecord {
    BookingRecord {
        id: b.id,
        user_email: Some(b.owner),
        region: Some(b.region),
        region_name: b.region_name,
        year: b.year,
        week: b.week as u32,
        created_at: b.created_at,
    }
}

/// A [`BookingApi`] session against an [`InMemoryBackend`].
#[derive(Clone)]
pub struct InMemoryApi {
    backend: Arc<InMemoryBackend>,
    caller: Caller,
}

impl InMemoryApi {
    pub fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }
}

#[async_trait]
impl BookingApi for InMemoryApi {
    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        Ok(self.backend.regions.clone())
    }

    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        if self.caller.is_admin {
            return Err(ApiError::Forbidden("directors only".into()));
        }
        let records: Vec<BookingRecord> = self
            .backend
            .bookings_of(&self.caller.email)
            .into_iter()
            .map(to_record)
            .collect();
        let gate = self
            .backend
            .own_bookings_gate
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.backend.fail_own_bookings.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                reason: Some("bookings service unavailable".into()),
            });
        }
        Ok(records)
    }

    async fn all_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        let mut all: Vec<Booking> = self
            .backend
            .bookings
            .iter()
            .map(|e| e.value().clone())
            .filter(|b| self.caller.is_admin || b.owner == self.caller.email)
            .collect();
        all.sort_by_key(|b| b.id);
        Ok(all.into_iter().map(to_record).collect())
    }

    async fn week_availability(&self, region: RegionId, year: i32) -> Result<RegionWeeks, ApiError> {
        if self.backend.failing_regions.contains(&region) {
            return Err(ApiError::Status {
                status: 500,
                reason: Some("internal server error".into()),
            });
        }
        let name = self
            .backend
            .region(region)
            .map(|r| r.name.clone())
            .ok_or_else(|| ApiError::Rejected("invalid parameters".into()))?;
        let weeks = (MIN_WEEK..=MAX_WEEK)
            .map(|week| {
                let holder = self
                    .backend
                    .slots
                    .get(&(region, year, week))
                    .and_then(|id| self.backend.bookings.get(id.value()).map(|b| b.owner.clone()));
                WeekStatus {
                    week: week as u32,
                    is_available: holder.is_none(),
                    booked_by: holder
                        .filter(|_| self.caller.is_admin)
                        .map(RawBookedBy::Email),
                }
            })
            .collect();
        Ok(RegionWeeks {
            region_id: Some(region),
            region_name: Some(name),
            year: Some(year),
            weeks,
        })
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<BookingRecord, ApiError> {
        self.backend.create(&self.caller, booking).await.map(to_record)
    }

    async fn update_booking(
        &self,
        id: BookingId,
        changes: &BookingChanges,
    ) -> Result<BookingRecord, ApiError> {
        self.backend
            .update(&self.caller, id, changes)
            .await
            .map(to_record)
    }

    async fn delete_booking(&self, id: BookingId) -> Result<(), ApiError> {
        self.backend.delete(&self.caller, id).await
    }

    async fn my_coverage(&self) -> Result<CoverageReport, ApiError> {
        if self.caller.is_admin {
            return Err(ApiError::Forbidden("directors only".into()));
        }
        Ok(self.backend.coverage_of(&self.caller.email))
    }

    async fn admin_coverage(&self) -> Result<Vec<CoverageReport>, ApiError> {
        if !self.caller.is_admin {
            return Err(ApiError::Forbidden("administrators only".into()));
        }
        let mut directors: Vec<UserId> = self.backend.directors.iter().map(|d| d.key().clone()).collect();
        directors.sort();
        Ok(directors
            .iter()
            .map(|d| self.backend.coverage_of(d))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Arc<InMemoryBackend> {
        InMemoryBackend::new(vec![
            Region { id: 1, name: "Dakar".into() },
            Region { id: 2, name: "Thiès".into() },
        ])
    }

    #[tokio::test]
    async fn demo_seeds_every_booking() {
        let backend = InMemoryBackend::demo(2026).await;
        assert_eq!(backend.booking_count(), 4);
        assert_eq!(backend.bookings_of("awa.diop@example.com").len(), 2);
    }

    #[tokio::test]
    async fn slot_is_unique() {
        let be = backend();
        let a = be.session(Caller::director("a@x.com"));
        let b = be.session(Caller::director("b@x.com"));
        a.create_booking(&NewBooking { region: 1, year: 2026, week: 10 })
            .await
            .unwrap();
        let err = b
            .create_booking(&NewBooking { region: 1, year: 2026, week: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m.contains("already booked")));
    }

    #[tokio::test]
    async fn director_holds_one_region_per_week() {
        let be = backend();
        let a = be.session(Caller::director("a@x.com"));
        a.create_booking(&NewBooking { region: 1, year: 2026, week: 10 })
            .await
            .unwrap();
        let err = a
            .create_booking(&NewBooking { region: 2, year: 2026, week: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m.contains("already hold")));
        // Same week of another year is fine.
        a.create_booking(&NewBooking { region: 2, year: 2027, week: 10 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn admin_cannot_create() {
        let be = backend();
        let admin = be.session(Caller::admin("root@x.com"));
        let err = admin
            .create_booking(&NewBooking { region: 1, year: 2026, week: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn availability_hides_holder_from_directors() {
        let be = backend();
        let a = be.session(Caller::director("a@x.com"));
        a.create_booking(&NewBooking { region: 2, year: 2026, week: 5 })
            .await
            .unwrap();

        let b = be.session(Caller::director("b@x.com"));
        let weeks = b.week_availability(2, 2026).await.unwrap().weeks;
        assert_eq!(weeks.len(), 53);
        assert_eq!(weeks[4].occupant(), BookedBy::Anonymous);

        let admin = be.session(Caller::admin("root@x.com"));
        let weeks = admin.week_availability(2, 2026).await.unwrap().weeks;
        assert_eq!(weeks[4].occupant(), BookedBy::By("a@x.com".into()));
    }

    #[tokio::test]
    async fn only_owner_or_admin_deletes() {
        let be = backend();
        let a = be.session(Caller::director("a@x.com"));
        let rec = a
            .create_booking(&NewBooking { region: 1, year: 2026, week: 2 })
            .await
            .unwrap();
        let b = be.session(Caller::director("b@x.com"));
        assert!(matches!(
            b.delete_booking(rec.id).await,
            Err(ApiError::Forbidden(_))
        ));
        let admin = be.session(Caller::admin("root@x.com"));
        admin.delete_booking(rec.id).await.unwrap();
        assert_eq!(be.booking_count(), 0);
    }

    #[tokio::test]
    async fn update_moves_slot() {
        let be = backend();
        let a = be.session(Caller::director("a@x.com"));
        let rec = a
            .create_booking(&NewBooking { region: 1, year: 2026, week: 2 })
            .await
            .unwrap();
        let moved = a
            .update_booking(rec.id, &BookingChanges { week: Some(3), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(moved.week, 3);
        // The old slot is free again.
        let b = be.session(Caller::director("b@x.com"));
        b.create_booking(&NewBooking { region: 1, year: 2026, week: 2 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn coverage_rounds_to_two_decimals() {
        let be = InMemoryBackend::new(
            (1..=7)
                .map(|id| Region { id, name: format!("R{id}") })
                .collect(),
        );
        let a = be.session(Caller::director("a@x.com"));
        a.create_booking(&NewBooking { region: 1, year: 2026, week: 1 })
            .await
            .unwrap();
        let report = a.my_coverage().await.unwrap();
        assert_eq!(report.record.coverage_rate, 14.29);
    }
}
