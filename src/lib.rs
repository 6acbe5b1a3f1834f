//! Daily nutrition ledger and goal-progress engine.
//!
//! A small fixed roster of people log free-text food and activity
//! descriptions. A language model turns each description into structured
//! nutritional data, a Firestore document store persists one ledger per
//! person per day, and this crate derives running totals, macro progress
//! against a personal target profile, and the context for periodic
//! coaching feedback.
//!
//! The aggregation layer ([`aggregate`], [`goals`], [`rollup`]) is pure:
//! totals are always recomputed from the underlying log rather than read
//! from stored counters, so a partially written document can never drift.

pub mod aggregate;
pub mod auth;
pub mod coach;
pub mod dates;
pub mod error;
pub mod goals;
pub mod inference;
pub mod ledger;
pub mod meals;
pub mod models;
pub mod rollup;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use meals::{MealSchedule, MealSlot};
pub use models::{DailyLedger, EntryKind, LogEntry, Person, ProcessingLevel, Profile};
pub use session::Session;
