//! Week-level totals over the active 7-day window.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::ledger::round_kcal;
use crate::models::{DailyLedger, WeekSummary};

/// Sum whatever subset of the window has materialized data. Days the store
/// subscription has not delivered yet simply contribute zero; that is the
/// normal state right after opening a week, not an error.
pub fn rollup(ledgers: &HashMap<NaiveDate, DailyLedger>) -> WeekSummary {
    let mut summary = ledgers
        .values()
        .map(DailyLedger::reconciled)
        .fold(WeekSummary::default(), |mut acc, day| {
            acc.consumed_total += day.consumed_total;
            acc.expended_total += day.expended_total;
            acc
        });
    summary.consumed_total = round_kcal(summary.consumed_total);
    summary.expended_total = round_kcal(summary.expended_total);
    summary.net_balance = round_kcal(summary.consumed_total - summary.expended_total);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryKind, LogEntry};
    use chrono::Utc;

    fn day(date: NaiveDate, consumed: f64, expended: f64) -> DailyLedger {
        let mut ledger = DailyLedger::empty("valentin", date);
        if consumed > 0.0 {
            ledger = ledger
                .append(entry(consumed), EntryKind::Consumption, date)
                .unwrap();
        }
        if expended > 0.0 {
            ledger = ledger
                .append(entry(expended), EntryKind::Expenditure, date)
                .unwrap();
        }
        ledger
    }

    fn entry(kcal: f64) -> LogEntry {
        LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            description: "x".into(),
            kcal,
            protein_g: None,
            carb_g: None,
            fat_g: None,
            fiber_g: None,
            processing_level: None,
        }
    }

    #[test]
    fn sums_only_materialized_days() {
        let d1 = NaiveDate::from_ymd_opt(2025, 11, 24).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 11, 25).unwrap();
        let mut week = HashMap::new();
        week.insert(d1, day(d1, 1800.0, 300.0));
        week.insert(d2, day(d2, 2100.5, 0.0));

        let summary = rollup(&week);
        assert_eq!(summary.consumed_total, 3900.5);
        assert_eq!(summary.expended_total, 300.0);
        assert_eq!(summary.net_balance, 3600.5);
    }

    #[test]
    fn empty_window_is_all_zeros() {
        assert_eq!(rollup(&HashMap::new()), WeekSummary::default());
    }
}
