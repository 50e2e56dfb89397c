//! ISO-8601 week arithmetic. Weeks start on Monday; week 1 is the week
//! containing the year's first Thursday.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::model::Week;

/// Number of ISO weeks in `year` (52 or 53). December 28th always falls in
/// the last ISO week of its year.
pub fn weeks_in_year(year: i32) -> Week {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week() as Week)
        .unwrap_or(52)
}

/// Monday and Sunday of ISO `week` of `year`, or `None` if the week does not exist.
pub fn week_dates(year: i32, week: Week) -> Option<(NaiveDate, NaiveDate)> {
    let monday = NaiveDate::from_isoywd_opt(year, week as u32, Weekday::Mon)?;
    Some((monday, monday + Duration::days(6)))
}

/// ISO (year, week) of today in UTC. Early January days may belong to the
/// previous ISO year and late December days to the next.
pub fn current_iso_week() -> (i32, Week) {
    let iso = Utc::now().date_naive().iso_week();
    (iso.year(), iso.week() as Week)
}

/// "Week 10: 2 Mar - 8 Mar 2026"
pub fn week_label(year: i32, week: Week) -> String {
    match week_dates(year, week) {
        Some((monday, sunday)) => format!(
            "Week {week}: {} - {} {year}",
            monday.format("%-d %b"),
            sunday.format("%-d %b"),
        ),
        None => format!("Week {week} {year}"),
    }
}
