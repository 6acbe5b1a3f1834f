//! Meal-slot classification.
//!
//! A timestamp maps to a coarse meal slot through a table of half-open
//! hour intervals. The table is configuration: deployments disagree on
//! boundaries (dinner until 22 vs 23), so it is validated once at
//! construction instead of being hard-coded at call sites.

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Coarse time-of-day bucket used for log labeling and for selecting the
/// coaching-prompt variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
    Other,
}

impl MealSlot {
    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Breakfast",
            MealSlot::Lunch => "Lunch",
            MealSlot::Snack => "Snack",
            MealSlot::Dinner => "Dinner",
            MealSlot::Other => "Other",
        }
    }
}

/// One half-open interval `[start, end)` of local hours.
#[derive(Copy, Clone, Debug)]
pub struct MealBand {
    pub start: u32,
    pub end: u32,
    pub slot: MealSlot,
}

/// A validated meal-time table covering every hour of the day exactly once.
#[derive(Clone, Debug)]
pub struct MealSchedule {
    bands: Vec<MealBand>,
}

impl MealSchedule {
    /// Build a schedule, rejecting tables with gaps, overlaps, or hours
    /// outside `[0, 24)`.
    pub fn new(mut bands: Vec<MealBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::Configuration("meal table is empty".into()));
        }
        bands.sort_by_key(|b| b.start);
        let mut cursor = 0;
        for band in &bands {
            if band.start >= band.end || band.end > 24 {
                return Err(Error::Configuration(format!(
                    "meal band [{}, {}) is not a valid hour interval",
                    band.start, band.end
                )));
            }
            if band.start != cursor {
                let kind = if band.start > cursor { "gap" } else { "overlap" };
                return Err(Error::Configuration(format!(
                    "meal table has a {kind} at hour {}",
                    band.start.min(cursor)
                )));
            }
            cursor = band.end;
        }
        if cursor != 24 {
            return Err(Error::Configuration(format!(
                "meal table has a gap from hour {cursor} to 24"
            )));
        }
        Ok(Self { bands })
    }

    /// Classify a local-clock hour.
    pub fn classify_hour(&self, hour: u32) -> MealSlot {
        self.bands
            .iter()
            .find(|b| hour >= b.start && hour < b.end)
            .map(|b| b.slot)
            .unwrap_or(MealSlot::Other)
    }

    /// Classify a timestamp by its local hour.
    pub fn classify(&self, at: DateTime<Local>) -> MealSlot {
        self.classify_hour(at.hour())
    }
}

impl Default for MealSchedule {
    fn default() -> Self {
        let bands = vec![
            MealBand { start: 0, end: 6, slot: MealSlot::Other },
            MealBand { start: 6, end: 12, slot: MealSlot::Breakfast },
            MealBand { start: 12, end: 15, slot: MealSlot::Lunch },
            MealBand { start: 15, end: 18, slot: MealSlot::Snack },
            MealBand { start: 18, end: 22, slot: MealSlot::Dinner },
            MealBand { start: 22, end: 24, slot: MealSlot::Other },
        ];
        // The built-in table is valid by inspection.
        Self { bands }
    }
}
