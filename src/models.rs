use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::meals::MealSlot;

/// One member of the fixed roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub display_name: String,
    /// Store user id this person's documents live under.
    pub store_user_id: String,
}

/// NOVA-inspired food classification tier. Unknown absorbs anything the
/// inference service invents outside the contract.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingLevel {
    Natural,
    Processed,
    Ultraprocessed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One atomic consumption or expenditure event. Immutable once created;
/// removed only by id. Macro fields are present on consumption entries and
/// absent on expenditure entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub kcal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carb_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    #[serde(
        default,
        rename = "processingLevel",
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_level: Option<ProcessingLevel>,
}

/// Which of a day's two logs an operation targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Consumption,
    Expenditure,
}

impl EntryKind {
    pub fn label(self) -> &'static str {
        match self {
            EntryKind::Consumption => "consumption",
            EntryKind::Expenditure => "expenditure",
        }
    }
}

/// The append-only record for one (person, day). The stored totals are a
/// cache: aggregation always recomputes them from the logs, and
/// [`crate::ledger`] keeps them reconciled on every mutation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLedger {
    #[serde(skip)]
    pub person_id: String,
    #[serde(skip)]
    pub date: NaiveDate,
    pub consumed_total: f64,
    pub expended_total: f64,
    pub consumption_log: Vec<LogEntry>,
    pub expenditure_log: Vec<LogEntry>,
}

/// Macro and quality totals derived from one day's consumption log.
/// Never persisted; recomputed on every read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub ultraprocessed_kcal: f64,
}

/// Per-nutrient progress against a target. For calories `remaining` is
/// clamped at zero; for everything else it keeps its sign so a renderer
/// can report "exceeded by N".
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct NutrientProgress {
    pub target: f64,
    pub actual: f64,
    pub remaining: f64,
}

/// The full goal-progress picture for one day.
#[derive(Clone, Debug, Serialize)]
pub struct DayGoals {
    pub calories: NutrientProgress,
    pub protein: NutrientProgress,
    pub carbs: NutrientProgress,
    pub fat: NutrientProgress,
    pub fiber: NutrientProgress,
    /// Informational only; the target is always zero.
    pub ultraprocessed_kcal: f64,
}

/// Week-level totals over whatever part of the window is materialized.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct WeekSummary {
    pub consumed_total: f64,
    pub expended_total: f64,
    pub net_balance: f64,
}

/// A persisted coaching analysis, the most recent one for its day.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoachAnalysis {
    pub text: String,
    pub slot: MealSlot,
    pub timestamp: DateTime<Utc>,
}

/// A named list of preferred foods carried verbatim into coach prompts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoodPreferenceGroup {
    pub name: String,
    pub items: Vec<String>,
}

/// Lifestyle attributes the coach uses for tone and recovery advice.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Lifestyle {
    /// 1 (relaxed) to 10 (overwhelmed).
    pub stress_level: u8,
    pub bedtime: String,
    pub wake_time: String,
    pub weekly_cooking_time: String,
    pub training_type: String,
    pub training_schedule: String,
    #[serde(default)]
    pub food_preferences: Vec<FoodPreferenceGroup>,
}

impl Lifestyle {
    /// All preferred foods flattened into one list for prompt text.
    pub fn flattened_preferences(&self) -> Vec<&str> {
        self.food_preferences
            .iter()
            .flat_map(|g| g.items.iter().map(String::as_str))
            .collect()
    }
}

/// Per-person nutrition targets. Static reference data; editing happens
/// outside this crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub age: u32,
    pub sex: String,
    pub current_weight_kg: f64,
    pub goal_weight_kg: f64,
    pub height_cm: f64,
    pub activity_level: String,
    pub objective: String,
    pub weekly_rate_kg: f64,
    /// Basal metabolic rate, kcal/day.
    pub bmr_kcal: f64,
    /// Total daily energy expenditure, kcal/day.
    pub tdee_kcal: f64,
    pub calorie_target_kcal: f64,
    pub protein_min_g: f64,
    pub protein_max_g: f64,
    /// Percentage band string, e.g. `"40-50%"`.
    pub carb_percent_range: String,
    /// Percentage band string, e.g. `"25-35%"`.
    pub fat_percent_range: String,
    #[serde(default)]
    pub lifestyle: Lifestyle,
}

impl Profile {
    /// Structural checks that must hold before the profile drives any goal
    /// computation. Band syntax is checked separately by [`crate::goals`].
    pub fn validate(&self) -> Result<()> {
        if self.protein_min_g > self.protein_max_g {
            return Err(Error::Configuration(format!(
                "protein_min {} exceeds protein_max {}",
                self.protein_min_g, self.protein_max_g
            )));
        }
        if self.calorie_target_kcal > self.tdee_kcal {
            return Err(Error::Configuration(format!(
                "calorie target {} exceeds TDEE {}",
                self.calorie_target_kcal, self.tdee_kcal
            )));
        }
        Ok(())
    }

    /// The planned daily deficit implied by the target.
    pub fn expected_deficit(&self) -> f64 {
        self.tdee_kcal - self.calorie_target_kcal
    }
}

/// Static per-deployment reference data: who exists and what they aim for.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    pub people: Vec<Person>,
    pub profiles: HashMap<String, Profile>,
}

impl Roster {
    pub fn person(&self, person_id: &str) -> Result<&Person> {
        self.people
            .iter()
            .find(|p| p.id == person_id)
            .ok_or_else(|| Error::Configuration(format!("unknown person id {person_id:?}")))
    }

    pub fn profile(&self, person_id: &str) -> Option<&Profile> {
        self.profiles.get(person_id)
    }
}

#[cfg(test)]
pub(crate) fn test_profile() -> Profile {
    Profile {
        age: 25,
        sex: "male".into(),
        current_weight_kg: 75.0,
        goal_weight_kg: 72.0,
        height_cm: 175.0,
        activity_level: "moderate".into(),
        objective: "cut".into(),
        weekly_rate_kg: 0.5,
        bmr_kcal: 1750.0,
        tdee_kcal: 2712.0,
        calorie_target_kcal: 2212.0,
        protein_min_g: 105.0,
        protein_max_g: 165.0,
        carb_percent_range: "40-50%".into(),
        fat_percent_range: "25-35%".into(),
        lifestyle: Lifestyle {
            stress_level: 4,
            bedtime: "00:30".into(),
            wake_time: "08:30".into(),
            weekly_cooking_time: "40 min per day".into(),
            training_type: "Strength (4 days) + cardio (1 day)".into(),
            training_schedule: "Evenings (17:30)".into(),
            food_preferences: vec![FoodPreferenceGroup {
                name: "quick options".into(),
                items: vec!["eggs".into(), "canned tuna".into(), "plain yogurt".into()],
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, kcal: f64) -> LogEntry {
        LogEntry {
            id: id.into(),
            timestamp: Utc.with_ymd_and_hms(2025, 11, 26, 13, 5, 0).unwrap(),
            description: "lentil stew".into(),
            kcal,
            protein_g: Some(30.0),
            carb_g: Some(50.0),
            fat_g: Some(10.0),
            fiber_g: Some(5.0),
            processing_level: Some(ProcessingLevel::Natural),
        }
    }

    #[test]
    fn ledger_round_trips_through_store_schema() {
        let ledger = DailyLedger {
            person_id: "valentin".into(),
            date: NaiveDate::from_ymd_opt(2025, 11, 26).unwrap(),
            consumed_total: 800.0,
            expended_total: 200.0,
            consumption_log: vec![entry("a", 500.0), entry("b", 300.0)],
            expenditure_log: vec![LogEntry {
                id: "c".into(),
                timestamp: Utc.with_ymd_and_hms(2025, 11, 26, 18, 0, 0).unwrap(),
                description: "30 min run".into(),
                kcal: 200.0,
                protein_g: None,
                carb_g: None,
                fat_g: None,
                fiber_g: None,
                processing_level: None,
            }],
        };

        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(value["consumedTotal"], 800.0);
        assert_eq!(value["consumptionLog"][0]["processingLevel"], "natural");
        // Expenditure entries carry no macro fields on the wire.
        assert!(value["expenditureLog"][0].get("protein_g").is_none());

        let mut back: DailyLedger = serde_json::from_value(value).unwrap();
        back.person_id = ledger.person_id.clone();
        back.date = ledger.date;
        assert_eq!(back, ledger);
        assert_eq!(back.consumption_log[0].id, "a");
        assert_eq!(back.consumption_log[1].id, "b");
    }

    #[test]
    fn unknown_processing_level_is_absorbed() {
        let parsed: ProcessingLevel = serde_json::from_str("\"artisanal\"").unwrap();
        assert_eq!(parsed, ProcessingLevel::Unknown);
    }

    #[test]
    fn profile_invariants_are_checked() {
        let mut profile = test_profile();
        assert!(profile.validate().is_ok());
        profile.protein_min_g = 200.0;
        assert!(matches!(
            profile.validate().unwrap_err(),
            Error::Configuration(_)
        ));
    }
}
