//! The interactive session: one active person, one visible week.
//!
//! The session owns the mutable state a frontend needs: the roster, the
//! active person, the selected day, the week window with its live watches,
//! and the two collaborators (document store and nutrition model) behind
//! their traits. All derived numbers go through the pure layers
//! ([`crate::aggregate`], [`crate::goals`], [`crate::rollup`]); the session
//! only sequences I/O around them.
//!
//! Write path: estimate, append locally, persist with merge, then adopt
//! the new ledger as the provisional cache value. The watch later echoes
//! the authoritative document, which replaces the provisional copy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::coach::{self, build_context};
use crate::dates;
use crate::error::{Error, Result};
use crate::goals::{compute_progress, parse_percent_band};
use crate::inference::NutritionModel;
use crate::meals::MealSchedule;
use crate::models::{
    CoachAnalysis, DailyLedger, DayGoals, EntryKind, LogEntry, MacroTotals, Roster, WeekSummary,
};
use crate::rollup::rollup;
use crate::store::{AnalysisKey, DocumentStore, LedgerKey, WatchSet};

/// Shortest accepted free-text description for an estimate request.
const MIN_DESCRIPTION_LEN: usize = 3;

/// How many coaching attempts before degrading to the local fallback.
const MAX_COACH_ATTEMPTS: u32 = 3;

/// Everything a renderer needs for the selected day.
#[derive(Clone, Debug)]
pub struct DaySummary {
    pub ledger: DailyLedger,
    pub macros: MacroTotals,
    /// Absent when the active person has no profile.
    pub goals: Option<DayGoals>,
}

pub struct Session {
    store: Arc<dyn DocumentStore>,
    model: Arc<dyn NutritionModel>,
    roster: Roster,
    schedule: MealSchedule,
    active_person: String,
    selected_day: NaiveDate,
    week_start: NaiveDate,
    week_data: HashMap<NaiveDate, DailyLedger>,
    watches: WatchSet,
}

impl Session {
    /// Build a session positioned on today's week. Fails fast on any
    /// malformed profile rather than surfacing NaN targets mid-use; call
    /// [`Session::open_week`] next to load data and start the watches.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn NutritionModel>,
        roster: Roster,
        schedule: MealSchedule,
        initial_person: &str,
    ) -> Result<Self> {
        roster.person(initial_person)?;
        for (person_id, profile) in &roster.profiles {
            profile
                .validate()
                .map_err(|e| Error::Configuration(format!("profile {person_id:?}: {e}")))?;
            parse_percent_band(&profile.carb_percent_range)?;
            parse_percent_band(&profile.fat_percent_range)?;
        }

        let today = dates::today_key();
        Ok(Self {
            store,
            model,
            roster,
            schedule,
            active_person: initial_person.to_string(),
            selected_day: today,
            week_start: dates::week_start(today),
            week_data: HashMap::new(),
            watches: WatchSet::default(),
        })
    }

    pub fn active_person(&self) -> &str {
        &self.active_person
    }

    pub fn selected_day(&self) -> NaiveDate {
        self.selected_day
    }

    pub fn week_days(&self) -> [NaiveDate; 7] {
        dates::week_days(self.week_start)
    }

    fn ledger_key(&self, date: NaiveDate) -> Result<LedgerKey> {
        let person = self.roster.person(&self.active_person)?;
        Ok(LedgerKey {
            user_id: person.store_user_id.clone(),
            person_id: person.id.clone(),
            date,
        })
    }

    fn analysis_key(&self, date: NaiveDate) -> Result<AnalysisKey> {
        let person = self.roster.person(&self.active_person)?;
        Ok(AnalysisKey {
            user_id: person.store_user_id.clone(),
            date,
        })
    }

    /// Load the current window and subscribe to its seven documents. Any
    /// previous window's watches are cancelled first, so a stale listener
    /// can never write into the new window.
    pub async fn open_week(&mut self) -> Result<()> {
        self.week_data.clear();
        let mut watches = Vec::with_capacity(7);
        for date in self.week_days() {
            let key = self.ledger_key(date)?;
            let ledger = match self.store.get_ledger(&key).await? {
                Some(ledger) => ledger,
                None => {
                    // Materialize the document so the watch has something
                    // to observe; merge keeps a concurrent writer's data.
                    let empty = DailyLedger::empty(&self.active_person, date);
                    self.store.set_ledger(&key, &empty, true).await?;
                    empty
                }
            };
            self.week_data.insert(date, ledger);
            watches.push(self.store.watch_ledger(&key).await?);
        }
        self.watches.replace(watches);
        info!(
            person = %self.active_person,
            week_start = %self.week_start,
            "week window opened"
        );
        Ok(())
    }

    /// Fold any authoritative documents the watches have delivered into
    /// the window cache.
    fn apply_changes(&mut self) {
        for ledger in self.watches.drain_changes() {
            if ledger.person_id == self.active_person && self.week_data.contains_key(&ledger.date) {
                self.week_data.insert(ledger.date, ledger);
            }
        }
    }

    /// Select a day inside the current window.
    pub fn select_day(&mut self, date: NaiveDate) -> Result<()> {
        if !self.week_days().contains(&date) {
            return Err(Error::InvalidOperation(format!(
                "{date} is outside the visible week starting {}",
                self.week_start
            )));
        }
        self.selected_day = date;
        Ok(())
    }

    /// Move the window by whole weeks. Forward movement clamps at the week
    /// containing today; the selection snaps to the new window's start.
    pub async fn change_week(&mut self, delta_weeks: i64) -> Result<()> {
        let next = dates::advance(self.week_start, delta_weeks * 7, dates::today_key());
        if next == self.week_start {
            return Ok(());
        }
        self.week_start = next;
        self.selected_day = next;
        self.open_week().await
    }

    /// Switch the active person and reset the view to today's week.
    pub async fn switch_person(&mut self, person_id: &str) -> Result<()> {
        self.roster.person(person_id)?;
        self.active_person = person_id.to_string();
        let today = dates::today_key();
        self.selected_day = today;
        self.week_start = dates::week_start(today);
        self.open_week().await
    }

    fn ledger_for(&self, date: NaiveDate) -> DailyLedger {
        self.week_data
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyLedger::empty(&self.active_person, date))
    }

    /// Today's ledger, read through even when the view is on a past week.
    async fn today_ledger(&self, today: NaiveDate) -> Result<DailyLedger> {
        if let Some(ledger) = self.week_data.get(&today) {
            return Ok(ledger.clone());
        }
        let key = self.ledger_key(today)?;
        Ok(self
            .store
            .get_ledger(&key)
            .await?
            .unwrap_or_else(|| DailyLedger::empty(&self.active_person, today)))
    }

    async fn persist(&mut self, today: NaiveDate, ledger: DailyLedger) -> Result<()> {
        let key = self.ledger_key(today)?;
        self.store.set_ledger(&key, &ledger, true).await?;
        if self.week_data.contains_key(&today) {
            self.week_data.insert(today, ledger);
        }
        Ok(())
    }

    fn validated_description(description: &str) -> Result<&str> {
        let trimmed = description.trim();
        if trimmed.len() < MIN_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "description {trimmed:?} is too short to estimate"
            )));
        }
        Ok(trimmed)
    }

    /// Estimate a described food and append it to today's consumption log.
    pub async fn record_consumption(&mut self, description: &str) -> Result<LogEntry> {
        let description = Self::validated_description(description)?;
        let estimate = self.model.estimate_food(description).await?;

        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            description: description.to_string(),
            kcal: estimate.kcal,
            protein_g: Some(estimate.protein_g),
            carb_g: Some(estimate.carb_g),
            fat_g: Some(estimate.fat_g),
            fiber_g: Some(estimate.fiber_g),
            processing_level: Some(estimate.processing_level),
        };

        let today = dates::today_key();
        let next = self
            .today_ledger(today)
            .await?
            .append(entry.clone(), EntryKind::Consumption, today)?;
        self.persist(today, next).await?;
        info!(kcal = entry.kcal, %description, "consumption recorded");
        Ok(entry)
    }

    /// Estimate a described activity and append it to today's expenditure
    /// log. An estimate of zero calories means the model could not read
    /// the description as an activity, so nothing is recorded.
    pub async fn record_expenditure(&mut self, description: &str) -> Result<LogEntry> {
        let description = Self::validated_description(description)?;
        let estimate = self.model.estimate_activity(description).await?;
        if estimate.kcal <= 0.0 {
            return Err(Error::Validation(format!(
                "{description:?} was not recognized as a calorie-burning activity"
            )));
        }

        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            description: description.to_string(),
            kcal: estimate.kcal,
            protein_g: None,
            carb_g: None,
            fat_g: None,
            fiber_g: None,
            processing_level: None,
        };

        let today = dates::today_key();
        let next = self
            .today_ledger(today)
            .await?
            .append(entry.clone(), EntryKind::Expenditure, today)?;
        self.persist(today, next).await?;
        info!(kcal = entry.kcal, %description, "expenditure recorded");
        Ok(entry)
    }

    /// Remove one of today's entries by id.
    pub async fn delete_entry(&mut self, kind: EntryKind, entry_id: &str) -> Result<()> {
        let today = dates::today_key();
        let next = self
            .today_ledger(today)
            .await?
            .remove(kind, entry_id, today)?;
        self.persist(today, next).await?;
        Ok(())
    }

    /// The selected day's ledger, macros, and goal progress.
    pub fn day_summary(&mut self) -> Result<DaySummary> {
        self.apply_changes();
        let ledger = self.ledger_for(self.selected_day).reconciled();
        let macros = aggregate(&ledger.consumption_log);
        let goals = match self.roster.profile(&self.active_person) {
            Some(profile) => Some(compute_progress(profile, &macros, ledger.consumed_total)?),
            None => None,
        };
        Ok(DaySummary { ledger, macros, goals })
    }

    /// Totals over the visible week.
    pub fn week_summary(&mut self) -> WeekSummary {
        self.apply_changes();
        rollup(&self.week_data)
    }

    /// Produce a coaching analysis for the selected day.
    ///
    /// Degrades instead of failing: with no profile, or once the model has
    /// exhausted its attempts (structural check included), the caller gets
    /// the deterministic local summary. Only analyses of today are
    /// persisted and only today reads back a prior analysis to follow up.
    pub async fn analyze_day(&mut self) -> Result<String> {
        self.apply_changes();
        let ledger = self.ledger_for(self.selected_day).reconciled();
        if ledger.is_empty() {
            return Ok("No records for this day yet. Log a meal or an activity first.".into());
        }

        let net_balance = ledger.net_balance();
        let Some(profile) = self.roster.profile(&self.active_person).cloned() else {
            return Ok(coach::fallback_summary(net_balance));
        };

        let today = dates::today_key();
        let prior_analysis = if self.selected_day == today {
            let key = self.analysis_key(today)?;
            match self.store.get_analysis(&key).await {
                Ok(found) => found.map(|a| a.text),
                Err(error) => {
                    warn!(%error, "prior analysis unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let person_name = self.roster.person(&self.active_person)?.display_name.clone();
        let slot = self.schedule.classify(Local::now());
        let context = build_context(
            &person_name,
            &profile,
            ledger.consumed_total,
            ledger.expended_total,
            aggregate(&ledger.consumption_log),
            slot,
            prior_analysis,
        );

        let system_prompt = context.system_prompt();
        for attempt in 0..MAX_COACH_ATTEMPTS {
            let query = if attempt == 0 {
                context.user_query()
            } else {
                context.sharpened_query()
            };
            match self.model.coach_message(&system_prompt, &query).await {
                Ok(text) if coach::passes_structure_check(&text) => {
                    if self.selected_day == today {
                        let analysis = CoachAnalysis {
                            text: text.clone(),
                            slot,
                            timestamp: Utc::now(),
                        };
                        let key = self.analysis_key(today)?;
                        if let Err(error) = self.store.set_analysis(&key, &analysis).await {
                            warn!(%error, "analysis produced but not persisted");
                        }
                    }
                    return Ok(text);
                }
                Ok(_) => warn!(attempt, "coaching response failed the structure check"),
                Err(error) => warn!(%error, attempt, "coaching attempt failed"),
            }
        }
        Ok(coach::fallback_summary(net_balance))
    }
}
