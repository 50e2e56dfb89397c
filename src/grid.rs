//! Region × week grid as the booking table shows it.

use crate::calendar::{week_label, weeks_in_year};
use crate::engine::{booked_by, Snapshot, UserWeeklyLock, WeekAvailability};
use crate::limits::MIN_WEEK;
use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Available,
    Mine,
    OtherDirector,
    /// The caller already holds another region that week; the cell itself
    /// may be free or held by someone else.
    BlockedElsewhere,
    AdminOccupied,
}

impl CellState {
    pub fn is_clickable(self) -> bool {
        self == CellState::Available
    }

    /// One-character glyph for the text grid.
    pub fn glyph(self) -> char {
        match self {
            CellState::Available => '.',
            CellState::Mine => '#',
            CellState::OtherDirector => 'x',
            CellState::BlockedElsewhere => '-',
            CellState::AdminOccupied => '@',
        }
    }
}

pub fn cell_state(
    availability: &WeekAvailability,
    locks: &UserWeeklyLock,
    caller: &Caller,
    region: RegionId,
    week: Week,
) -> CellState {
    let occupant = booked_by(availability, region, week);
    if caller.is_admin {
        return if occupant.is_free() {
            CellState::Available
        } else {
            CellState::AdminOccupied
        };
    }
    if occupant.is_held_by(&caller.email) {
        CellState::Mine
    } else if locks.contains(&week) {
        CellState::BlockedElsewhere
    } else if !occupant.is_free() {
        CellState::OtherDirector
    } else {
        CellState::Available
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub week: Week,
    pub state: CellState,
    /// Holder's email, when the viewer is allowed to see it.
    pub occupant: Option<UserId>,
}

impl Cell {
    pub fn is_clickable(&self) -> bool {
        self.state.is_clickable()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub region: RegionId,
    pub name: String,
    /// Availability could not be fetched this round.
    pub degraded: bool,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridStats {
    pub booked: usize,
    pub available: usize,
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub year: i32,
    pub week_labels: Vec<String>,
    pub rows: Vec<GridRow>,
    pub stats: GridStats,
}

impl Grid {
    /// Rows follow `regions` order; `region_filter` keeps a single region.
    pub fn build(
        snapshot: &Snapshot,
        regions: &[Region],
        caller: &Caller,
        region_filter: Option<RegionId>,
    ) -> Self {
        let year = snapshot.year;
        let weeks = MIN_WEEK..=weeks_in_year(year);
        let week_labels = weeks.clone().map(|w| week_label(year, w)).collect();

        let mut booked = 0;
        let mut total = 0;
        let rows: Vec<GridRow> = regions
            .iter()
            .filter(|r| region_filter.is_none_or(|id| id == r.id))
            .map(|r| {
                let cells: Vec<Cell> = weeks
                    .clone()
                    .map(|week| {
                        let state =
                            cell_state(&snapshot.availability, &snapshot.locks, caller, r.id, week);
                        let occupant = snapshot.booked_by(r.id, week);
                        Cell {
                            week,
                            state,
                            occupant: occupant.holder().map(str::to_owned),
                        }
                    })
                    .collect();
                total += cells.len();
                booked += cells
                    .iter()
                    .filter(|c| !snapshot.booked_by(r.id, c.week).is_free())
                    .count();
                GridRow {
                    region: r.id,
                    name: r.name.clone(),
                    degraded: snapshot.is_degraded(r.id),
                    cells,
                }
            })
            .collect();

        let occupancy_rate = if total == 0 {
            0.0
        } else {
            booked as f64 / total as f64 * 100.0
        };
        Self {
            year,
            week_labels,
            rows,
            stats: GridStats {
                booked,
                available: total - booked,
                occupancy_rate,
            },
        }
    }

    /// Plain-text rendering: one line per region, one glyph per week.
    pub fn render(&self) -> String {
        let width = self.rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);
        let mut out = String::new();
        for row in &self.rows {
            let glyphs: String = row.cells.iter().map(|c| c.state.glyph()).collect();
            let marker = if row.degraded { " (unavailable)" } else { "" };
            out.push_str(&format!("{:<width$} {glyphs}{marker}\n", row.name));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compute_coverage;
    use crate::week_key::WeekKey;

    const ME: &str = "me@x.com";

    fn snapshot(cells: &[(RegionId, Week, BookedBy)], locks: &[Week]) -> Snapshot {
        Snapshot {
            round: 1,
            year: 2026,
            availability: cells
                .iter()
                .map(|(r, w, b)| (WeekKey::encode(*r, *w), b.clone()))
                .collect(),
            locks: locks.iter().copied().collect(),
            bookings: Vec::new(),
            degraded_regions: vec![2],
            bookings_error: None,
            coverage: compute_coverage(&[], 2),
            fleet: None,
        }
    }

    fn regions() -> Vec<Region> {
        vec![
            Region { id: 1, name: "Dakar".into() },
            Region { id: 2, name: "Thiès".into() },
        ]
    }

    #[test]
    fn director_cell_states() {
        let snap = snapshot(
            &[
                (1, 10, BookedBy::By(ME.into())),
                (2, 11, BookedBy::Anonymous),
            ],
            &[10],
        );
        let me = Caller::director(ME);
        let state = |r, w| cell_state(&snap.availability, &snap.locks, &me, r, w);
        assert_eq!(state(1, 10), CellState::Mine);
        assert_eq!(state(2, 10), CellState::BlockedElsewhere);
        assert_eq!(state(2, 11), CellState::OtherDirector);
        assert_eq!(state(1, 11), CellState::Available);
        assert!(state(1, 11).is_clickable());
        assert!(!state(2, 10).is_clickable());
    }

    #[test]
    fn admin_sees_occupied_cells() {
        let snap = snapshot(&[(1, 10, BookedBy::By("d@x.com".into()))], &[]);
        let admin = Caller::admin("root@x.com");
        assert_eq!(
            cell_state(&snap.availability, &snap.locks, &admin, 1, 10),
            CellState::AdminOccupied
        );
        assert_eq!(
            cell_state(&snap.availability, &snap.locks, &admin, 1, 11),
            CellState::Available
        );
    }

    #[test]
    fn grid_covers_every_week_of_the_year() {
        let snap = snapshot(
            &[
                (1, 10, BookedBy::By(ME.into())),
                (2, 11, BookedBy::Anonymous),
            ],
            &[10],
        );
        let grid = Grid::build(&snap, &regions(), &Caller::director(ME), None);
        assert_eq!(grid.week_labels.len(), 53);
        assert_eq!(grid.rows.len(), 2);
        assert!(grid.rows[1].degraded);
        assert_eq!(grid.stats.booked, 2);
        assert_eq!(grid.stats.available, 104);
        assert!((grid.stats.occupancy_rate - 200.0 / 106.0).abs() < 1e-9);
        assert_eq!(grid.rows[0].cells[9].occupant.as_deref(), Some(ME));
        assert_eq!(grid.rows[1].cells[10].occupant, None);
    }

    #[test]
    fn filter_keeps_one_region() {
        let snap = snapshot(&[], &[]);
        let grid = Grid::build(&snap, &regions(), &Caller::director(ME), Some(2));
        assert_eq!(grid.rows.len(), 1);
        assert_eq!(grid.rows[0].name, "Thiès");
        assert_eq!(grid.stats.occupancy_rate, 0.0);
        assert!(grid.render().contains("(unavailable)"));
    }
}
