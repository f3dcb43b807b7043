//! # CohortBot Sheets
//! Talk-of-the-day lookup against a Google spreadsheet: service-account
//! auth, header-row column mapping, date-matched row rendering.

pub mod auth;
pub mod talk;

pub use talk::{TalkLookup, render_talks};
