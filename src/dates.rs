//! Date arithmetic for the weekly ledger window.
//!
//! Day keys are plain `NaiveDate`s taken from the *local* calendar. The
//! original UI once derived the day key through a UTC-normalizing
//! date-to-string conversion and shifted entries across midnight for
//! anyone west of Greenwich; `today_key` must always be built from local
//! date components.

use chrono::{Datelike, Days, Local, NaiveDate};

/// Day-of-week abbreviations, Monday first.
pub const DAY_NAMES_SHORT: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// The current day key in the local calendar.
pub fn today_key() -> NaiveDate {
    Local::now().date_naive()
}

/// The Monday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// The 7 consecutive days starting at `start`.
pub fn week_days(start: NaiveDate) -> [NaiveDate; 7] {
    std::array::from_fn(|i| start + Days::new(i as u64))
}

/// Move a week start by `delta_days`, clamped so the result never enters
/// a week after the one containing `today`.
pub fn advance(start: NaiveDate, delta_days: i64, today: NaiveDate) -> NaiveDate {
    let moved = if delta_days >= 0 {
        start + Days::new(delta_days as u64)
    } else {
        start - Days::new(delta_days.unsigned_abs())
    };
    let moved = week_start(moved);
    let ceiling = week_start(today);
    if moved > ceiling { ceiling } else { moved }
}

/// Short human-readable date, e.g. "24 Aug".
pub fn format_short(date: NaiveDate) -> String {
    format!("{} {}", date.day(), date.format("%b"))
}

/// Day-of-week abbreviation with Monday at index 0.
pub fn day_name_short(date: NaiveDate) -> &'static str {
    DAY_NAMES_SHORT[date.weekday().num_days_from_monday() as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_start_is_stable_across_the_week() {
        // 2025-11-24 is a Monday.
        let monday = d(2025, 11, 24);
        for offset in 0..7 {
            let day = monday + Days::new(offset);
            assert_eq!(week_start(day), monday, "offset {offset}");
        }
        assert_eq!(week_start(d(2025, 12, 1)), d(2025, 12, 1));
    }

    #[test]
    fn week_days_are_consecutive_from_monday() {
        let days = week_days(d(2025, 11, 24));
        assert_eq!(days[0], d(2025, 11, 24));
        assert_eq!(days[6], d(2025, 11, 30));
        for pair in days.windows(2) {
            assert_eq!(pair[1], pair[0] + Days::new(1));
        }
    }

    #[test]
    fn advance_moves_backwards_freely() {
        let today = d(2025, 11, 26);
        let start = week_start(today);
        assert_eq!(advance(start, -7, today), d(2025, 11, 17));
        assert_eq!(advance(d(2025, 11, 17), -7, today), d(2025, 11, 10));
    }

    #[test]
    fn advance_never_passes_the_current_week() {
        let today = d(2025, 11, 26);
        let this_week = week_start(today);
        assert_eq!(advance(this_week, 7, today), this_week);
        assert_eq!(advance(d(2025, 11, 17), 7, today), this_week);
        assert_eq!(advance(d(2025, 11, 17), 700, today), this_week);
    }

    #[test]
    fn day_names_are_monday_anchored() {
        assert_eq!(day_name_short(d(2025, 11, 24)), "Mon");
        assert_eq!(day_name_short(d(2025, 11, 30)), "Sun");
    }

    #[test]
    fn short_format_has_day_and_month() {
        assert_eq!(format_short(d(2025, 8, 3)), "3 Aug");
    }
}
