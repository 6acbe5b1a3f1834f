//! Mutation and reconciliation of a day's ledger.
//!
//! Appends and removals return a new ledger rather than mutating in place:
//! the store write and the subscription echo both carry whole documents,
//! so value semantics keep the provisional and authoritative copies from
//! aliasing each other.
//!
//! Invariant after every mutation: each total equals the rounded kcal sum
//! of its log. `reconciled` re-derives both totals from scratch for reads,
//! which also repairs a ledger recovered from a partial write.

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{DailyLedger, EntryKind, LogEntry};

/// Round a kcal total to two decimals, matching the store's precision.
pub(crate) fn round_kcal(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn log_total(log: &[LogEntry]) -> f64 {
    round_kcal(log.iter().map(|e| e.kcal).sum())
}

impl DailyLedger {
    /// A zero-valued ledger for one (person, day).
    pub fn empty(person_id: impl Into<String>, date: NaiveDate) -> Self {
        DailyLedger {
            person_id: person_id.into(),
            date,
            ..DailyLedger::default()
        }
    }

    fn log(&self, kind: EntryKind) -> &[LogEntry] {
        match kind {
            EntryKind::Consumption => &self.consumption_log,
            EntryKind::Expenditure => &self.expenditure_log,
        }
    }

    fn guard_today(&self, today: NaiveDate) -> Result<()> {
        if self.date != today {
            return Err(Error::InvalidOperation(format!(
                "ledger for {} is read-only; only today ({today}) accepts changes",
                self.date
            )));
        }
        Ok(())
    }

    /// Append `entry` to the given log, incrementing the matching total.
    ///
    /// Rejects entries with a non-finite or negative kcal value, an empty
    /// description, or an id already present in the target log. Only the
    /// ledger dated `today` may be mutated; callers that opened an append
    /// before midnight pass the day they opened it with.
    pub fn append(&self, entry: LogEntry, kind: EntryKind, today: NaiveDate) -> Result<Self> {
        self.guard_today(today)?;
        if !entry.kcal.is_finite() || entry.kcal < 0.0 {
            return Err(Error::Validation(format!(
                "kcal must be a finite non-negative number, got {}",
                entry.kcal
            )));
        }
        if entry.description.trim().is_empty() {
            return Err(Error::Validation("description is empty".into()));
        }
        if self.log(kind).iter().any(|e| e.id == entry.id) {
            return Err(Error::Validation(format!(
                "duplicate id {:?} in {} log",
                entry.id,
                kind.label()
            )));
        }

        let mut next = self.clone();
        match kind {
            EntryKind::Consumption => {
                next.consumed_total = round_kcal(next.consumed_total + entry.kcal);
                next.consumption_log.push(entry);
            }
            EntryKind::Expenditure => {
                next.expended_total = round_kcal(next.expended_total + entry.kcal);
                next.expenditure_log.push(entry);
            }
        }
        Ok(next)
    }

    /// Remove the entry with `entry_id` from the given log, decrementing
    /// the matching total (floored at zero). Removing an id that is not
    /// present is a no-op, so retries and double-clicks are harmless.
    pub fn remove(&self, kind: EntryKind, entry_id: &str, today: NaiveDate) -> Result<Self> {
        self.guard_today(today)?;
        let Some(entry) = self.log(kind).iter().find(|e| e.id == entry_id) else {
            return Ok(self.clone());
        };
        let kcal = entry.kcal;

        let mut next = self.clone();
        match kind {
            EntryKind::Consumption => {
                next.consumption_log.retain(|e| e.id != entry_id);
                next.consumed_total = round_kcal((next.consumed_total - kcal).max(0.0));
            }
            EntryKind::Expenditure => {
                next.expenditure_log.retain(|e| e.id != entry_id);
                next.expended_total = round_kcal((next.expended_total - kcal).max(0.0));
            }
        }
        Ok(next)
    }

    /// A copy with both totals recomputed from their logs. Aggregation
    /// reads go through this instead of trusting the stored counters.
    pub fn reconciled(&self) -> Self {
        let mut next = self.clone();
        next.consumed_total = log_total(&next.consumption_log);
        next.expended_total = log_total(&next.expenditure_log);
        next
    }

    /// Consumed minus expended, from recomputed totals.
    pub fn net_balance(&self) -> f64 {
        let r = self.reconciled();
        round_kcal(r.consumed_total - r.expended_total)
    }

    pub fn is_empty(&self) -> bool {
        self.consumption_log.is_empty() && self.expenditure_log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 26).unwrap()
    }

    fn entry(id: &str, kcal: f64) -> LogEntry {
        LogEntry {
            id: id.into(),
            timestamp: Utc::now(),
            description: "toast with avocado".into(),
            kcal,
            protein_g: None,
            carb_g: None,
            fat_g: None,
            fiber_g: None,
            processing_level: None,
        }
    }

    #[test]
    fn append_increments_the_matching_total() {
        let ledger = DailyLedger::empty("valentin", today());
        let ledger = ledger
            .append(entry("a", 350.5), EntryKind::Consumption, today())
            .unwrap();
        let ledger = ledger
            .append(entry("b", 200.0), EntryKind::Expenditure, today())
            .unwrap();
        assert_eq!(ledger.consumed_total, 350.5);
        assert_eq!(ledger.expended_total, 200.0);
        assert_eq!(ledger.consumption_log.len(), 1);
        assert_eq!(ledger.expenditure_log.len(), 1);
    }

    #[test]
    fn append_rejects_bad_kcal() {
        let ledger = DailyLedger::empty("valentin", today());
        for kcal in [f64::NAN, f64::INFINITY, -1.0] {
            let err = ledger
                .append(entry("a", kcal), EntryKind::Consumption, today())
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "kcal {kcal}");
        }
    }

    #[test]
    fn append_rejects_duplicate_id_in_same_log() {
        let ledger = DailyLedger::empty("valentin", today())
            .append(entry("a", 100.0), EntryKind::Consumption, today())
            .unwrap();
        let err = ledger
            .append(entry("a", 50.0), EntryKind::Consumption, today())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // The same id in the other log is a different namespace.
        ledger
            .append(entry("a", 50.0), EntryKind::Expenditure, today())
            .unwrap();
    }

    #[test]
    fn mutation_is_rejected_off_today() {
        let tomorrow = today().succ_opt().unwrap();
        let future = DailyLedger::empty("valentin", tomorrow);
        let err = future
            .append(entry("a", 100.0), EntryKind::Consumption, today())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));

        let yesterday = today().pred_opt().unwrap();
        let past = DailyLedger::empty("valentin", yesterday);
        assert!(past.remove(EntryKind::Consumption, "a", today()).is_err());

        // An append opened before a midnight crossover completes against
        // the day it was opened with.
        let still_open = DailyLedger::empty("valentin", yesterday);
        assert!(still_open
            .append(entry("a", 100.0), EntryKind::Consumption, yesterday)
            .is_ok());
    }

    #[test]
    fn removal_is_idempotent() {
        let ledger = DailyLedger::empty("valentin", today())
            .append(entry("a", 300.0), EntryKind::Consumption, today())
            .unwrap()
            .append(entry("b", 150.0), EntryKind::Consumption, today())
            .unwrap();

        let once = ledger.remove(EntryKind::Consumption, "a", today()).unwrap();
        let twice = once.remove(EntryKind::Consumption, "a", today()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.consumed_total, 150.0);
        assert_eq!(twice.consumption_log.len(), 1);
    }

    #[test]
    fn removal_floors_the_total_at_zero() {
        // A ledger recovered with a drifted counter must not go negative.
        let mut ledger = DailyLedger::empty("valentin", today())
            .append(entry("a", 100.0), EntryKind::Consumption, today())
            .unwrap();
        ledger.consumed_total = 40.0;
        let after = ledger.remove(EntryKind::Consumption, "a", today()).unwrap();
        assert_eq!(after.consumed_total, 0.0);
    }

    #[test]
    fn totals_reconcile_after_any_sequence() {
        let mut ledger = DailyLedger::empty("valentin", today());
        for (i, kcal) in [120.3, 410.0, 95.55, 230.0].iter().enumerate() {
            ledger = ledger
                .append(entry(&format!("c{i}"), *kcal), EntryKind::Consumption, today())
                .unwrap();
        }
        ledger = ledger
            .append(entry("e0", 310.2), EntryKind::Expenditure, today())
            .unwrap();
        ledger = ledger.remove(EntryKind::Consumption, "c1", today()).unwrap();

        let reconciled = ledger.reconciled();
        assert_eq!(ledger.consumed_total, reconciled.consumed_total);
        assert_eq!(ledger.expended_total, reconciled.expended_total);
        assert_eq!(reconciled.consumed_total, round_kcal(120.3 + 95.55 + 230.0));
        assert_eq!(ledger.net_balance(), round_kcal(445.85 - 310.2));
    }
}
