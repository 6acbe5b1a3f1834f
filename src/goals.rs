//! Goal targets and progress against a profile.
//!
//! Target formulas, fixed by the final revision of the product:
//! protein is `current weight × 2` grams (not the min/max midpoint),
//! carbohydrate and fat derive from the *lower bound* of their percentage
//! bands at 4 and 9 kcal per gram, and fiber is a flat 25 g.

use crate::error::{Error, Result};
use crate::models::{DayGoals, MacroTotals, NutrientProgress, Profile};

/// Daily fiber target in grams, independent of the profile.
pub const FIBER_TARGET_G: f64 = 25.0;

/// Grams of protein per kg of current body weight.
pub const PROTEIN_G_PER_KG: f64 = 2.0;

const KCAL_PER_G_CARB: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// A parsed `"NN-NN%"` band as fractions of total calories.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PercentBand {
    pub min: f64,
    pub max: f64,
}

/// Parse a percentage band like `"40-50%"`. Anything else fails fast with
/// a configuration error rather than degrading to NaN targets downstream.
pub fn parse_percent_band(raw: &str) -> Result<PercentBand> {
    let malformed =
        || Error::Configuration(format!("percentage band {raw:?} does not match \"NN-NN%\""));

    let body = raw.strip_suffix('%').ok_or_else(malformed)?;
    let (lo, hi) = body.split_once('-').ok_or_else(malformed)?;
    let parse = |s: &str| -> Result<f64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        s.parse::<u32>().map(f64::from).map_err(|_| malformed())
    };
    let min = parse(lo)? / 100.0;
    let max = parse(hi)? / 100.0;
    if min > max || max > 1.0 {
        return Err(Error::Configuration(format!(
            "percentage band {raw:?} is not an ascending range within 0-100"
        )));
    }
    Ok(PercentBand { min, max })
}

fn progress(target: f64, actual: f64) -> NutrientProgress {
    NutrientProgress {
        target,
        actual,
        remaining: target - actual,
    }
}

/// Compare a day's aggregated intake against the profile's targets.
pub fn compute_progress(
    profile: &Profile,
    macros: &MacroTotals,
    consumed_kcal: f64,
) -> Result<DayGoals> {
    let carb_band = parse_percent_band(&profile.carb_percent_range)?;
    let fat_band = parse_percent_band(&profile.fat_percent_range)?;

    let calorie_target = profile.calorie_target_kcal;
    let protein_target = profile.current_weight_kg * PROTEIN_G_PER_KG;
    let carb_target = (calorie_target * carb_band.min / KCAL_PER_G_CARB).round();
    let fat_target = (calorie_target * fat_band.min / KCAL_PER_G_FAT).round();

    let mut calories = progress(calorie_target, consumed_kcal);
    calories.remaining = calories.remaining.max(0.0);

    Ok(DayGoals {
        calories,
        protein: progress(protein_target, macros.protein_g),
        carbs: progress(carb_target, macros.carb_g),
        fat: progress(fat_target, macros.fat_g),
        fiber: progress(FIBER_TARGET_G, macros.fiber_g),
        ultraprocessed_kcal: macros.ultraprocessed_kcal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_profile;

    #[test]
    fn targets_match_the_reference_profile() {
        let profile = test_profile();
        let goals = compute_progress(&profile, &MacroTotals::default(), 0.0).unwrap();
        assert_eq!(goals.calories.target, 2212.0);
        assert_eq!(goals.protein.target, 150.0);
        assert_eq!(goals.carbs.target, 221.0);
        assert_eq!(goals.fat.target, 61.0);
        assert_eq!(goals.fiber.target, FIBER_TARGET_G);
    }

    #[test]
    fn calorie_remaining_is_clamped_at_zero() {
        let profile = test_profile();
        let goals = compute_progress(&profile, &MacroTotals::default(), 2500.0).unwrap();
        assert_eq!(goals.calories.remaining, 0.0);
        assert_eq!(goals.calories.actual, 2500.0);
    }

    #[test]
    fn other_nutrients_keep_a_signed_remainder() {
        let profile = test_profile();
        let macros = MacroTotals {
            protein_g: 180.0,
            carb_g: 100.0,
            fat_g: 80.0,
            fiber_g: 10.0,
            ultraprocessed_kcal: 450.0,
        };
        let goals = compute_progress(&profile, &macros, 1800.0).unwrap();
        assert_eq!(goals.protein.remaining, -30.0); // exceeded by 30 g
        assert_eq!(goals.carbs.remaining, 121.0);
        assert_eq!(goals.fat.remaining, -19.0);
        assert_eq!(goals.fiber.remaining, 15.0);
        assert_eq!(goals.ultraprocessed_kcal, 450.0);
    }

    #[test]
    fn band_parsing_accepts_the_wire_format_only() {
        assert_eq!(
            parse_percent_band("40-50%").unwrap(),
            PercentBand { min: 0.40, max: 0.50 }
        );
        for bad in ["40-50", "40%", "abc", "40–50%", "-50%", "40-%", "", "50-40%", "40-120%"] {
            let err = parse_percent_band(bad).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "input {bad:?}");
        }
    }

    #[test]
    fn malformed_band_fails_progress_computation() {
        let mut profile = test_profile();
        profile.fat_percent_range = "about a third".into();
        let err = compute_progress(&profile, &MacroTotals::default(), 0.0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
