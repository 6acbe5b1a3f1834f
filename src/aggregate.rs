//! Macro aggregation over a day's consumption log.
//!
//! Pure fold, recomputed on every read. The ultra-processed figure is a
//! kcal sum over entries classified `ultraprocessed`, not a count of
//! such entries.

use crate::models::{LogEntry, MacroTotals, ProcessingLevel};

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Fold a consumption log into macro totals, one decimal of precision.
/// Missing macro fields contribute zero; an empty log yields all zeros.
pub fn aggregate(log: &[LogEntry]) -> MacroTotals {
    let mut totals = log.iter().fold(MacroTotals::default(), |mut acc, entry| {
        acc.protein_g += entry.protein_g.unwrap_or(0.0);
        acc.carb_g += entry.carb_g.unwrap_or(0.0);
        acc.fat_g += entry.fat_g.unwrap_or(0.0);
        acc.fiber_g += entry.fiber_g.unwrap_or(0.0);
        if entry.processing_level == Some(ProcessingLevel::Ultraprocessed) {
            acc.ultraprocessed_kcal += entry.kcal;
        }
        acc
    });
    totals.protein_g = round1(totals.protein_g);
    totals.carb_g = round1(totals.carb_g);
    totals.fat_g = round1(totals.fat_g);
    totals.fiber_g = round1(totals.fiber_g);
    totals.ultraprocessed_kcal = round1(totals.ultraprocessed_kcal);
    totals
}
