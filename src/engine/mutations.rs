use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::model::*;
use crate::observability;

use super::conflict::{check_target, validate_target};
use super::{Engine, EngineError, Snapshot};

impl Engine {
    /// Book `region` for `week` of the displayed year as the caller.
    pub async fn create(&self, region: RegionId, week: Week) -> Result<Booking, EngineError> {
        let result = self.create_inner(region, week).await;
        record_mutation("create", &result);
        result
    }

    async fn create_inner(&self, region: RegionId, week: Week) -> Result<Booking, EngineError> {
        if self.caller.is_admin {
            return Err(EngineError::PermissionDenied(
                "administrators cannot create bookings".into(),
            ));
        }
        let year = self.year();
        let regions = self.regions().await;
        if regions.is_empty() {
            return Err(EngineError::NoRegions);
        }
        validate_target(&regions, year, week, region)?;
        if let Err(e) = check_target(&self.snapshot(), &self.caller, region, year, week, None) {
            self.refresh().await;
            return Err(e);
        }

        let request = NewBooking { region, year, week };
        let sent = self.api.create_booking(&request).await;
        self.refresh().await;

        let record = sent?;
        let id = record.id;
        info!("{} booked region {region} for week {week} of {year} (#{id})", self.caller.email);
        Ok(record
            .resolve(&regions, Some(self.caller.email.as_str()))
            .unwrap_or_else(|| Booking {
                id,
                region,
                region_name: None,
                year,
                week,
                owner: self.caller.email.clone(),
                created_at: None,
            }))
    }

    /// Move a booking to another cell. Directors may only move their own.
    pub async fn update(&self, id: BookingId, changes: BookingChanges) -> Result<Booking, EngineError> {
        let result = self.update_inner(id, changes).await;
        record_mutation("update", &result);
        result
    }

    async fn update_inner(&self, id: BookingId, changes: BookingChanges) -> Result<Booking, EngineError> {
        if changes.is_empty() {
            return Err(EngineError::InvalidTarget("nothing to change"));
        }
        let regions = self.regions().await;
        if regions.is_empty() {
            return Err(EngineError::NoRegions);
        }
        let snapshot = self.snapshot();
        let current = self.owned_booking(&snapshot, id)?;

        if let Some(current) = &current {
            let region = changes.region.unwrap_or(current.region);
            let year = changes.year.unwrap_or(current.year);
            let week = changes.week.unwrap_or(current.week);
            validate_target(&regions, year, week, region)?;
            if let Err(e) = check_target(&snapshot, &self.caller, region, year, week, Some(current)) {
                self.refresh().await;
                return Err(e);
            }
        } else if let (Some(region), Some(year), Some(week)) = (changes.region, changes.year, changes.week) {
            // A booking this snapshot does not list: ranges only.
            validate_target(&regions, year, week, region)?;
        }

        let sent = self.api.update_booking(id, &changes).await;
        self.refresh().await;

        let record = sent.map_err(|e| unknown_if_missing(e, id))?;
        let owner = current.as_ref().map(|b| b.owner.as_str()).unwrap_or(self.caller.email.as_str());
        let fallback = current.clone();
        info!("{} moved booking #{id}", self.caller.email);
        record
            .resolve(&regions, Some(owner))
            .or(fallback)
            .ok_or(EngineError::UnknownBooking(id))
    }

    /// Cancel a booking. Directors may only cancel their own.
    pub async fn delete(&self, id: BookingId) -> Result<(), EngineError> {
        let result = self.delete_inner(id).await;
        record_mutation("delete", &result);
        result
    }

    async fn delete_inner(&self, id: BookingId) -> Result<(), EngineError> {
        self.owned_booking(&self.snapshot(), id)?;

        let sent = self.api.delete_booking(id).await;
        self.refresh().await;

        sent.map_err(|e| unknown_if_missing(e, id))?;
        info!("{} cancelled booking #{id}", self.caller.email);
        Ok(())
    }

    /// The booking as the latest snapshot knows it. Directors must own it;
    /// admins may act on bookings the snapshot does not list.
    ///
    /// Without a loaded own-bookings list (no round yet, or the branch
    /// failed) a director's booking is unknown locally and the server decides.
    fn owned_booking(&self, snapshot: &Snapshot, id: BookingId) -> Result<Option<Booking>, EngineError> {
        let found = snapshot.bookings.iter().find(|b| b.id == id).cloned();
        if self.caller.is_admin {
            return Ok(found);
        }
        match found {
            Some(b) if b.owner == self.caller.email => Ok(Some(b)),
            None if snapshot.round == 0 || snapshot.bookings_error.is_some() => {
                debug!("booking {id} unknown locally, own bookings not loaded");
                Ok(None)
            }
            _ => Err(EngineError::PermissionDenied(format!(
                "booking {id} is not one of your bookings"
            ))),
        }
    }

    /// Reconcile after a server call or a conflict refusal. A failure is
    /// logged and never replaces the operation's own result.
    async fn refresh(&self) {
        if let Err(e) = self.reconcile().await {
            warn!("reconciliation after mutation failed: {e}");
        }
    }
}

fn unknown_if_missing(e: ApiError, id: BookingId) -> EngineError {
    match e {
        ApiError::NotFound => EngineError::UnknownBooking(id),
        other => other.into(),
    }
}

fn record_mutation<T>(op: &'static str, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::MUTATIONS_TOTAL, "op" => op, "status" => status).increment(1);
}
