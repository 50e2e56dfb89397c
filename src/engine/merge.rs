use std::collections::{BTreeMap, BTreeSet};

use crate::model::*;
use crate::week_key::WeekKey;

use super::fetch::{FetchRound, RegionFragment};

// ── Reconciliation ────────────────────────────────────────────────

/// Occupied cells only; an absent key is free.
pub type WeekAvailability = BTreeMap<WeekKey, BookedBy>;

/// Weeks of the displayed year in which the caller already holds a region.
pub type UserWeeklyLock = BTreeSet<Week>;

#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub availability: WeekAvailability,
    pub locks: UserWeeklyLock,
    /// The caller's own bookings (directors) or every booking (admins), all years.
    pub bookings: Vec<Booking>,
    /// Regions whose availability fetch failed this round, ascending.
    pub degraded_regions: Vec<RegionId>,
    /// Set when the own-bookings (or all-bookings) branch failed.
    pub bookings_error: Option<String>,
    /// Admins: every known director, sorted and deduplicated. Empty for directors.
    pub roster: Vec<UserId>,
}

pub fn booked_by(availability: &WeekAvailability, region: RegionId, week: Week) -> BookedBy {
    availability
        .get(&WeekKey::encode(region, week))
        .cloned()
        .unwrap_or(BookedBy::Free)
}

/// Fold one settled round into a single availability map and lock set.
///
/// Directors: own bookings first (never overwritten), then each region's
/// unavailable weeks that are not already present. Admins: every booking as-is,
/// no lock set. Output depends only on the input, never on arrival order.
pub fn merge(round: &FetchRound, caller: &Caller, year: i32) -> Merged {
    match round {
        FetchRound::Admin { all, roster } => merge_admin(all, roster, year),
        FetchRound::Director { own, regions } => merge_director(own, regions, caller, year),
    }
}

fn merge_admin(
    all: &Result<Vec<Booking>, crate::api::ApiError>,
    roster: &[UserId],
    year: i32,
) -> Merged {
    let mut availability = WeekAvailability::new();
    let (bookings, bookings_error) = match all {
        Ok(bookings) => (sorted(bookings), None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    for b in bookings.iter().filter(|b| b.year == year) {
        availability
            .entry(WeekKey::encode(b.region, b.week))
            .or_insert_with(|| BookedBy::By(b.owner.clone()));
    }
    Merged {
        availability,
        locks: UserWeeklyLock::new(),
        bookings,
        degraded_regions: Vec::new(),
        bookings_error,
        roster: roster
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

fn merge_director(
    own: &Result<Vec<Booking>, crate::api::ApiError>,
    regions: &[RegionFragment],
    caller: &Caller,
    year: i32,
) -> Merged {
    let mut availability = WeekAvailability::new();
    let mut locks = UserWeeklyLock::new();

    // Step 1: own bookings seed the map and the lock set.
    let (bookings, bookings_error) = match own {
        Ok(bookings) => (sorted(bookings), None),
        // Never guess lock membership from other feeds.
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    for b in bookings.iter().filter(|b| b.year == year) {
        availability.insert(
            WeekKey::encode(b.region, b.week),
            BookedBy::By(caller.email.clone()),
        );
        locks.insert(b.week);
    }

    // Step 2: other holders, only where the cell is still empty.
    let mut fragments: Vec<&RegionFragment> = regions.iter().collect();
    fragments.sort_by_key(|f| f.region);
    let mut degraded_regions = Vec::new();
    for fragment in fragments {
        let Some(weeks) = &fragment.weeks else {
            degraded_regions.push(fragment.region);
            continue;
        };
        for status in weeks {
            let occupant = status.occupant();
            if occupant.is_free() {
                continue;
            }
            let Ok(week) = Week::try_from(status.week) else { continue };
            availability
                .entry(WeekKey::encode(fragment.region, week))
                .or_insert(occupant);
        }
    }
    degraded_regions.dedup();

    Merged {
        availability,
        locks,
        bookings,
        degraded_regions,
        bookings_error,
        roster: Vec::new(),
    }
}

fn sorted(bookings: &[Booking]) -> Vec<Booking> {
    let mut out = bookings.to_vec();
    out.sort_by(|a, b| {
        (a.year, a.week, a.region, a.id).cmp(&(b.year, b.week, b.region, b.id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    const ME: &str = "me@x.com";

    fn booking(id: BookingId, region: RegionId, week: Week, owner: &str) -> Booking {
        Booking {
            id,
            region,
            region_name: None,
            year: 2026,
            week,
            owner: owner.into(),
            created_at: None,
        }
    }

    fn taken(week: u32, by: Option<&str>) -> WeekStatus {
        WeekStatus {
            week,
            is_available: false,
            booked_by: by.map(|e| RawBookedBy::Email(e.into())),
        }
    }

    fn free(week: u32) -> WeekStatus {
        WeekStatus {
            week,
            is_available: true,
            booked_by: None,
        }
    }

    fn fragment(region: RegionId, weeks: Vec<WeekStatus>) -> RegionFragment {
        RegionFragment {
            region,
            weeks: Some(weeks),
        }
    }

    #[test]
    fn own_bookings_seed_map_and_locks() {
        let round = FetchRound::Director {
            own: Ok(vec![booking(1, 3, 10, ME)]),
            regions: vec![fragment(3, vec![taken(10, None)]), fragment(7, vec![free(10)])],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert_eq!(booked_by(&merged.availability, 3, 10), BookedBy::By(ME.into()));
        assert_eq!(booked_by(&merged.availability, 7, 10), BookedBy::Free);
        assert!(merged.locks.contains(&10));
        assert_eq!(merged.locks.len(), 1);
    }

    #[test]
    fn stale_region_feed_never_overwrites_own_cell() {
        // The region feed reports our own cell as someone else's.
        let round = FetchRound::Director {
            own: Ok(vec![booking(1, 3, 10, ME)]),
            regions: vec![fragment(3, vec![taken(10, Some("other@x.com"))])],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert_eq!(booked_by(&merged.availability, 3, 10), BookedBy::By(ME.into()));
    }

    #[test]
    fn anonymous_sentinel_when_holder_withheld() {
        let round = FetchRound::Director {
            own: Ok(vec![]),
            regions: vec![fragment(2, vec![taken(4, None), taken(5, Some("b@x.com"))])],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert_eq!(booked_by(&merged.availability, 2, 4), BookedBy::Anonymous);
        assert_eq!(booked_by(&merged.availability, 2, 5), BookedBy::By("b@x.com".into()));
    }

    #[test]
    fn other_years_do_not_lock() {
        let mut old = booking(1, 3, 10, ME);
        old.year = 2025;
        let round = FetchRound::Director {
            own: Ok(vec![old]),
            regions: vec![],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert!(merged.locks.is_empty());
        assert!(merged.availability.is_empty());
        assert_eq!(merged.bookings.len(), 1);
    }

    #[test]
    fn failed_region_is_degraded_not_fatal() {
        let round = FetchRound::Director {
            own: Ok(vec![]),
            regions: vec![
                RegionFragment { region: 5, weeks: None },
                fragment(1, vec![taken(1, None)]),
            ],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert_eq!(merged.degraded_regions, vec![5]);
        assert_eq!(booked_by(&merged.availability, 1, 1), BookedBy::Anonymous);
        assert!(merged.bookings_error.is_none());
    }

    #[test]
    fn own_bookings_failure_leaves_locks_empty() {
        let round = FetchRound::Director {
            own: Err(ApiError::Transport("timeout".into())),
            regions: vec![fragment(1, vec![taken(8, None)])],
        };
        let merged = merge(&round, &Caller::director(ME), 2026);
        assert!(merged.locks.is_empty());
        assert_eq!(merged.bookings_error.as_deref(), Some("transport error: timeout"));
        assert_eq!(booked_by(&merged.availability, 1, 8), BookedBy::Anonymous);
    }

    #[test]
    fn fragment_order_does_not_matter() {
        let a = fragment(1, vec![taken(2, Some("a@x.com"))]);
        let b = fragment(2, vec![taken(2, None), taken(3, Some("b@x.com"))]);
        let own = Ok(vec![booking(9, 4, 3, ME)]);
        let forward = FetchRound::Director {
            own: own.clone(),
            regions: vec![a.clone(), b.clone()],
        };
        let backward = FetchRound::Director {
            own,
            regions: vec![b, a],
        };
        let caller = Caller::director(ME);
        assert_eq!(merge(&forward, &caller, 2026), merge(&backward, &caller, 2026));
    }

    #[test]
    fn admin_sees_every_owner_without_locks() {
        let round = FetchRound::Admin {
            all: Ok(vec![
                booking(1, 1, 10, "a@x.com"),
                booking(2, 2, 10, "b@x.com"),
                booking(3, 2, 11, "a@x.com"),
            ]),
            roster: vec!["c@x.com".into(), "a@x.com".into(), "c@x.com".into()],
        };
        let merged = merge(&round, &Caller::admin("root@x.com"), 2026);
        assert_eq!(merged.availability.len(), 3);
        assert_eq!(booked_by(&merged.availability, 2, 10), BookedBy::By("b@x.com".into()));
        assert!(merged.locks.is_empty());
        assert_eq!(merged.roster, vec!["a@x.com".to_string(), "c@x.com".to_string()]);
    }

    #[test]
    fn admin_failure_surfaces_error() {
        let round = FetchRound::Admin {
            all: Err(ApiError::Status { status: 500, reason: None }),
            roster: Vec::new(),
        };
        let merged = merge(&round, &Caller::admin("root@x.com"), 2026);
        assert!(merged.availability.is_empty());
        assert_eq!(merged.bookings_error.as_deref(), Some("HTTP 500"));
    }
}
