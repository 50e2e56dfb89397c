use crate::calendar::weeks_in_year;
use crate::limits::*;
use crate::model::*;

use super::{EngineError, Snapshot};

pub(crate) fn validate_target(
    regions: &[Region],
    year: i32,
    week: Week,
    region: RegionId,
) -> Result<(), EngineError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EngineError::InvalidTarget("year out of range"));
    }
    if week < MIN_WEEK || week > weeks_in_year(year) {
        return Err(EngineError::InvalidTarget("week out of range"));
    }
    if !regions.iter().any(|r| r.id == region) {
        return Err(EngineError::InvalidTarget("unknown region"));
    }
    Ok(())
}

/// Reject a target cell the latest snapshot already shows as unusable.
/// `moving` is the booking being updated; its own cell and week never
/// count against it.
pub(crate) fn check_target(
    snapshot: &Snapshot,
    caller: &Caller,
    region: RegionId,
    year: i32,
    week: Week,
    moving: Option<&Booking>,
) -> Result<(), EngineError> {
    // Only the displayed year is known locally; the backend decides the rest.
    if year != snapshot.year {
        return Ok(());
    }

    let is_own_cell = moving.is_some_and(|b| b.region == region && b.week == week && b.year == year);
    if !is_own_cell && !snapshot.booked_by(region, week).is_free() {
        return Err(EngineError::SlotTaken { region, week });
    }

    let same_week_as_moving = moving.is_some_and(|b| b.week == week && b.year == year);
    if same_week_as_moving {
        return Ok(());
    }

    if caller.is_admin {
        // Admin acting on someone else's booking: that owner's lock applies.
        if let Some(moving) = moving {
            let clash = snapshot.bookings.iter().any(|b| {
                b.id != moving.id && b.owner == moving.owner && b.year == year && b.week == week
            });
            if clash {
                return Err(EngineError::WeekLocked { week });
            }
        }
    } else if snapshot.locks.contains(&week) {
        return Err(EngineError::WeekLocked { week });
    }
    Ok(())
}
