//! Coaching-prompt assembly and response policy.
//!
//! This module only builds text and checks text; the network call lives in
//! [`crate::inference`]. The meal slot picks one of four template variants
//! (tone and focus change across the day), and a prior analysis from the
//! same day is threaded through so the model can follow up on its own
//! earlier advice.

use crate::ledger::round_kcal;
use crate::meals::MealSlot;
use crate::models::{MacroTotals, Profile};

/// Minimum numbered items a coaching response must contain.
pub const REQUIRED_ITEMS: usize = 6;
/// Minimum non-empty lines a coaching response must contain.
pub const REQUIRED_LINES: usize = 8;

/// Everything the inference collaborator needs to produce one coaching
/// message. Pure data; assembling it performs no I/O.
#[derive(Clone, Debug)]
pub struct PromptContext {
    pub person_name: String,
    pub profile: Profile,
    pub consumed_kcal: f64,
    pub expended_kcal: f64,
    pub net_balance: f64,
    /// TDEE minus net balance.
    pub actual_deficit: f64,
    /// TDEE minus calorie target.
    pub expected_deficit: f64,
    pub macros: MacroTotals,
    pub slot: MealSlot,
    /// The day's previous analysis, present only when analyzing today.
    pub prior_analysis: Option<String>,
}

/// Assemble the snapshot handed to the inference collaborator.
pub fn build_context(
    person_name: &str,
    profile: &Profile,
    consumed_kcal: f64,
    expended_kcal: f64,
    macros: MacroTotals,
    slot: MealSlot,
    prior_analysis: Option<String>,
) -> PromptContext {
    let net_balance = round_kcal(consumed_kcal - expended_kcal);
    PromptContext {
        person_name: person_name.to_string(),
        profile: profile.clone(),
        consumed_kcal,
        expended_kcal,
        net_balance,
        actual_deficit: round_kcal(profile.tdee_kcal - net_balance),
        expected_deficit: round_kcal(profile.expected_deficit()),
        macros,
        slot,
        prior_analysis,
    }
}

impl PromptContext {
    /// The model's standing instructions: persona, the user's profile and
    /// day so far, and the evidence-based guardrails.
    pub fn system_prompt(&self) -> String {
        let p = &self.profile;
        let preferences = p.lifestyle.flattened_preferences().join(", ");
        format!(
            "You are a professional nutritionist and personal coach grounded in \
evidence-based nutrition and international guidelines (EFSA, FDA, ISSN). \
Give scientifically valid, personalized recommendations; never repeat myths \
or make claims without empirical support.\n\
\n\
USER PROFILE:\n\
- Name: {name}\n\
- Calorie target: {target} kcal/day | Goal: {objective} at {rate} kg/week\n\
- Protein target range: {pmin} g - {pmax} g\n\
- Carb range: {carbs} | Fat range: {fats}\n\
- Cooking time available: {cooking}\n\
- Training: {training} - {schedule}\n\
\n\
TODAY SO FAR:\n\
- Calories consumed: {consumed} kcal\n\
- Calories expended (exercise): {expended} kcal\n\
- Net calories (consumed - expended): {net} kcal\n\
- Actual deficit (vs TDEE): {actual_deficit} kcal - Expected deficit: {expected_deficit} kcal\n\
\n\
MACRONUTRIENTS AND QUALITY:\n\
- Protein: {protein} g\n\
- Carbohydrates: {carb} g\n\
- Fat: {fat} g\n\
- Fiber: {fiber} g\n\
- Ultra-processed calories: {upf} kcal\n\
- Preferred foods: {preferences}\n\
\n\
RESPONSE RULES:\n\
- Only make claims consistent with scientific evidence.\n\
- Never invent physiological data or nutritional values.\n\
- Be precise, direct, and oriented to actionable decisions.\n\
- Avoid alarmist language; prioritize clarity and adherence.\n\
- Keep a professional, motivating, balanced tone.",
            name = self.person_name,
            target = p.calorie_target_kcal,
            objective = p.objective,
            rate = p.weekly_rate_kg,
            pmin = p.protein_min_g,
            pmax = p.protein_max_g,
            carbs = p.carb_percent_range,
            fats = p.fat_percent_range,
            cooking = p.lifestyle.weekly_cooking_time,
            training = p.lifestyle.training_type,
            schedule = p.lifestyle.training_schedule,
            consumed = self.consumed_kcal,
            expended = self.expended_kcal,
            net = self.net_balance,
            actual_deficit = self.actual_deficit,
            expected_deficit = self.expected_deficit,
            protein = self.macros.protein_g,
            carb = self.macros.carb_g,
            fat = self.macros.fat_g,
            fiber = self.macros.fiber_g,
            upf = self.macros.ultraprocessed_kcal,
            preferences = preferences,
        )
    }

    fn slot_instructions(&self) -> (&'static str, String) {
        let p = &self.profile;
        match self.slot {
            MealSlot::Breakfast => (
                "Tone: proactive and optimistic, focused on fuel for the morning. \
This is a partial analysis.",
                "- Judge the breakfast's protein and fiber against the day's satiety goal.\n\
- Lay out the intake strategy for the next hours to keep the deficit under control.\n\
- Add a hydration and craving-management recommendation for the morning.\n\
- If breakfast protein is under 20 g, suggest an immediate addition."
                    .to_string(),
            ),
            MealSlot::Lunch => (
                "Tone: mid-day checkpoint on calorie and macro compliance. \
This is a partial analysis.",
                format!(
                    "- Check calories and macros consumed by midday (roughly 40-50% of the \
{} kcal target).\n\
- On a large deviation, suggest a strategic correction for the afternoon snack or dinner.\n\
- Judge lunch quality and use the user's preferred foods for afternoon suggestions.\n\
- Set the pre-training strategy around {} (carbohydrates 40-60 minutes before).",
                    p.calorie_target_kcal, p.lifestyle.training_schedule
                ),
            ),
            MealSlot::Snack => (
                "Tone: strategic and recovery-oriented, focused on the pre/post-training \
window. This is a partial analysis.",
                format!(
                    "- Judge pre-training nutrient timing: enough easy carbohydrates for {}?\n\
- Give a post-training recovery strategy (protein + carbohydrates) for dinner.\n\
- If the remaining deficit before dinner is very large, warn about rebound \
overeating and adjust the dinner plan.\n\
- Check total protein so far and how much dinner must contribute.",
                    p.lifestyle.training_type
                ),
            ),
            MealSlot::Dinner | MealSlot::Other => (
                "Tone: retrospective, focused on sustainability, recovery, and planning \
tomorrow. This is the final analysis.",
                format!(
                    "- Judge final compliance with the calorie and total-protein targets.\n\
- Review the final macro split, fiber ({} g), and ultra-processed calories.\n\
- Give one planning-and-rest recommendation for tomorrow given stress level {}/10 \
and bedtime {}.\n\
- Suggest one preferred dish or ingredient that would have improved today.",
                    self.macros.fiber_g, p.lifestyle.stress_level, p.lifestyle.bedtime
                ),
            ),
        }
    }

    /// The per-request instructions: mandatory format, the six fixed topics,
    /// the slot-specific focus, and the follow-up checkpoint when a prior
    /// analysis exists.
    pub fn user_query(&self) -> String {
        let (tone, focus) = self.slot_instructions();
        let p = &self.profile;
        let checkpoint = match &self.prior_analysis {
            Some(prior) => format!(
                "\nCHECKPOINT: start item 1 by verifying whether the corrections from the \
previous analysis were implemented.\nPREVIOUS ANALYSIS: {prior}\n"
            ),
            None => String::new(),
        };
        format!(
            "FORMAT DIRECTIVES (highest priority):\n\
1. The response MUST be a list of ENUMERATED ITEMS (1., 2., 3., 4., 5., 6.).\n\
2. Produce EXACTLY 6 items, each at most 4 sentences.\n\
3. Open each item with one relevant emoji, without overdoing it.\n\
4. Use <strong> tags to highlight key words and metrics.\n\
\n\
MANDATORY TOPICS FOR THE 6 ITEMS:\n\
1. Calorie adherence: actual deficit ({actual} kcal) versus expected ({expected} kcal).\n\
2. Protein review: {protein} g against the {pmin} g - {pmax} g range.\n\
3. Nutrient timing around the training schedule ({schedule}).\n\
4. Fiber ({fiber} g) and ultra-processed intake, with satiety advice.\n\
5. The single most urgent correction, naming a preferred food that makes it easy.\n\
6. Recovery and planning: connect nutrition to stress ({stress}/10) and tomorrow's \
first meal.\n\
\n\
ANALYSIS INSTRUCTIONS:\n\
{tone}\n\
{checkpoint}\
{focus}\n",
            actual = self.actual_deficit,
            expected = self.expected_deficit,
            protein = self.macros.protein_g,
            pmin = p.protein_min_g,
            pmax = p.protein_max_g,
            schedule = p.lifestyle.training_schedule,
            fiber = self.macros.fiber_g,
            stress = p.lifestyle.stress_level,
            tone = tone,
            checkpoint = checkpoint,
            focus = focus,
        )
    }

    /// Retry variant sent after a response failed the structural check.
    pub fn sharpened_query(&self) -> String {
        format!(
            "{}\nYOUR PREVIOUS RESPONSE BROKE THE FORMAT. Return exactly {} numbered \
items (\"1.\" through \"{}.\"), one per line, at least {} non-empty lines total, \
and nothing outside the list.\n",
            self.user_query(),
            REQUIRED_ITEMS,
            REQUIRED_ITEMS,
            REQUIRED_LINES
        )
    }
}

/// Whether a coaching response satisfies the required structure: at least
/// six numbered items and at least eight non-empty lines.
pub fn passes_structure_check(text: &str) -> bool {
    let mut items = 0;
    let mut non_empty = 0;
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }
        non_empty += 1;
        let digits = line.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && line.as_bytes().get(digits) == Some(&b'.') {
            items += 1;
        }
    }
    items >= REQUIRED_ITEMS && non_empty >= REQUIRED_LINES
}

/// Deterministic local summary used when inference is exhausted or no
/// profile exists. Threshold rules over the net balance only; always
/// names the computed figure.
pub fn fallback_summary(net_balance: f64) -> String {
    if net_balance > 500.0 {
        format!("High balance: +{net_balance} kcal. Consider adding some physical activity.")
    } else if net_balance <= -500.0 {
        format!("Substantial deficit: {net_balance} kcal. Solid work, keep meals regular.")
    } else if net_balance <= 0.0 {
        format!("Well-balanced day: {net_balance} kcal net.")
    } else {
        format!("Day balance: +{net_balance} kcal.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_profile;

    fn context(slot: MealSlot, prior: Option<String>) -> PromptContext {
        let macros = MacroTotals {
            protein_g: 80.0,
            carb_g: 150.0,
            fat_g: 40.0,
            fiber_g: 12.0,
            ultraprocessed_kcal: 200.0,
        };
        build_context(
            "Valentin",
            &test_profile(),
            1500.0,
            300.0,
            macros,
            slot,
            prior,
        )
    }

    #[test]
    fn context_derives_balance_and_deficits() {
        let ctx = context(MealSlot::Lunch, None);
        assert_eq!(ctx.net_balance, 1200.0);
        assert_eq!(ctx.actual_deficit, 2712.0 - 1200.0);
        assert_eq!(ctx.expected_deficit, 500.0);
    }

    #[test]
    fn slot_selects_the_template_variant() {
        assert!(context(MealSlot::Breakfast, None)
            .user_query()
            .contains("fuel for the morning"));
        assert!(context(MealSlot::Lunch, None)
            .user_query()
            .contains("mid-day checkpoint"));
        assert!(context(MealSlot::Snack, None)
            .user_query()
            .contains("pre/post-training"));
        assert!(context(MealSlot::Dinner, None)
            .user_query()
            .contains("final analysis"));
        // Off-schedule hours fall back to the retrospective template.
        assert!(context(MealSlot::Other, None)
            .user_query()
            .contains("final analysis"));
    }

    #[test]
    fn prior_analysis_adds_a_checkpoint() {
        let with = context(MealSlot::Dinner, Some("eat more protein".into()));
        assert!(with.user_query().contains("CHECKPOINT"));
        assert!(with.user_query().contains("eat more protein"));
        assert!(!context(MealSlot::Dinner, None).user_query().contains("CHECKPOINT"));
    }

    #[test]
    fn structure_check_requires_six_items_and_eight_lines() {
        let good = "intro\n1. a\n2. b\n3. c\n4. d\n5. e\n6. f\nclosing line\n";
        assert!(passes_structure_check(good));

        let few_items = "1. a\n2. b\n3. c\n4. d\n5. e\nsix\nseven\neight\n";
        assert!(!passes_structure_check(few_items));

        let few_lines = "1. a\n2. b\n3. c\n4. d\n5. e\n6. f\n";
        assert!(!passes_structure_check(few_lines));
    }

    #[test]
    fn fallback_covers_the_threshold_rules() {
        assert!(fallback_summary(750.0).contains("+750"));
        assert!(fallback_summary(750.0).contains("High balance"));
        assert!(fallback_summary(-600.0).contains("-600"));
        assert!(fallback_summary(-600.0).contains("deficit"));
        assert!(fallback_summary(-100.0).contains("balanced"));
        assert!(fallback_summary(200.0).contains("+200"));
    }
}
