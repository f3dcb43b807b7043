//! # CohortBot Scheduler
//!
//! Time-table-driven announcements:
//! - `timetable` — the static trigger set and "what applies at time T" /
//!   "how long until the next event" queries.
//! - `engine` — the wall-clock loop: fires due triggers in the configured
//!   timezone, skips weekends, never replays missed fires.
//! - `dispatch` — composes and sends the announcement per destination,
//!   appending the talk-of-the-day block at the designated time.

pub mod dispatch;
pub mod engine;
pub mod timetable;

pub use dispatch::{Destination, Dispatcher};
pub use engine::{SchedulerEngine, spawn_scheduler};
pub use timetable::{EventKind, NextEvent, Timetable};
