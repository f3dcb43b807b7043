//! The event timetable — static trigger lists, fixed for a process
//! lifetime, and the two queries everything else is built on.

use chrono::{Duration, NaiveTime, Timelike};
use cohortbot_core::config::Settings;
use cohortbot_core::error::{CohortBotError, Result};

/// Working hours: queries outside this window get a distinguished answer.
pub const WORKDAY_START_HOUR: u32 = 9;
pub const WORKDAY_END_HOUR: u32 = 17;

const CHECKIN_TEMPLATE: &str =
    "🤖 {role} bip boup bip boup CHECK-IN 🤖 \nMoodle link : {link}";
const CHECKOUT_TEMPLATE: &str =
    "🤖 {role} bip boup bip boup CHECK-OUT 🤖 \nMoodle link : {link}";
const BREAK_TEMPLATE: &str = "🤖 {role} bip boup bip boup BREAK-TIME ☕️☕️ 🤖";
const LUNCH_ADDENDUM: &str = "\n 🤖 It's LUNCH-TIME 🌯 🤖";

/// Announcement category of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckIn,
    CheckOut,
    Break,
    Lunch,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::CheckIn => "CHECK-IN",
            EventKind::CheckOut => "CHECK-OUT",
            EventKind::Break => "BREAKTIME",
            EventKind::Lunch => "LUNCHTIME",
        }
    }
}

/// Answer to "how long until the next event from now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextEvent {
    /// Before working hours; the day hasn't started.
    BeforeHours { remaining: Duration },
    /// At or past the end of working hours.
    AfterHours,
    /// Inside working hours but nothing left today.
    EndOfDay,
    /// The nearest future trigger.
    Upcoming { kind: EventKind, remaining: Duration },
}

impl NextEvent {
    /// The user-facing line for this answer.
    pub fn render(&self) -> String {
        match self {
            NextEvent::BeforeHours { remaining } => format!(
                "🤖 Take a good coffee, work day will start in {}h {}min ☕️",
                remaining.num_hours(),
                remaining.num_minutes() % 60
            ),
            NextEvent::AfterHours => {
                "🤖 Stop playing with me, working time is over 🍻🍻".to_string()
            }
            NextEvent::EndOfDay => "🤖 END OF THE DAY! 🍻".to_string(),
            NextEvent::Upcoming { kind, remaining } => format!(
                "🤖 Next {} in {}h {}min",
                kind.label(),
                remaining.num_hours(),
                remaining.num_minutes() % 60
            ),
        }
    }
}

/// The static trigger set. Built once at startup from settings.
#[derive(Debug, Clone)]
pub struct Timetable {
    checkin: Vec<NaiveTime>,
    checkout: Vec<NaiveTime>,
    breaks: Vec<NaiveTime>,
    lunch: Vec<NaiveTime>,
}

impl Timetable {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            checkin: parse_times(&settings.checkin_times)?,
            checkout: parse_times(&settings.checkout_times)?,
            breaks: parse_times(&settings.break_times)?,
            lunch: parse_times(&settings.lunch_times)?,
        })
    }

    /// All distinct trigger times, for the scheduler engine.
    pub fn trigger_times(&self) -> Vec<NaiveTime> {
        let mut times: Vec<NaiveTime> = self
            .checkin
            .iter()
            .chain(&self.checkout)
            .chain(&self.breaks)
            .chain(&self.lunch)
            .copied()
            .collect();
        times.sort();
        times.dedup();
        times
    }

    /// The announcement template for a trigger time, `None` when the time
    /// matches no configured trigger. The lunch addendum combines with
    /// whichever base category also holds the time.
    pub fn message_for(&self, time: NaiveTime) -> Option<String> {
        let base = if self.checkin.contains(&time) {
            Some(CHECKIN_TEMPLATE)
        } else if self.checkout.contains(&time) {
            Some(CHECKOUT_TEMPLATE)
        } else if self.breaks.contains(&time) {
            Some(BREAK_TEMPLATE)
        } else {
            None
        };

        let lunch = self.lunch.contains(&time);
        match (base, lunch) {
            (Some(template), true) => Some(format!("{template}{LUNCH_ADDENDUM}")),
            (Some(template), false) => Some(template.to_string()),
            (None, true) => Some(LUNCH_ADDENDUM.trim_start().to_string()),
            (None, false) => None,
        }
    }

    /// The nearest future trigger from `now`, or the distinguished
    /// outside-hours / end-of-day answers. Triggers at identical times
    /// resolve in declaration order: check-in, check-out, break, lunch.
    pub fn until_next(&self, now: NaiveTime) -> NextEvent {
        if now.hour() >= WORKDAY_END_HOUR {
            return NextEvent::AfterHours;
        }

        let declared = [
            (EventKind::CheckIn, &self.checkin),
            (EventKind::CheckOut, &self.checkout),
            (EventKind::Break, &self.breaks),
            (EventKind::Lunch, &self.lunch),
        ];
        let mut events: Vec<(NaiveTime, EventKind)> = declared
            .iter()
            .flat_map(|(kind, times)| times.iter().map(|t| (*t, *kind)))
            .collect();
        events.sort_by_key(|(t, _)| *t);

        let next = events.into_iter().find(|(t, _)| *t > now);
        let Some((time, kind)) = next else {
            return NextEvent::EndOfDay;
        };

        let remaining = time - now;
        if now.hour() < WORKDAY_START_HOUR {
            NextEvent::BeforeHours { remaining }
        } else {
            NextEvent::Upcoming { kind, remaining }
        }
    }
}

/// Parse a "HH:MM" trigger time.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| CohortBotError::Config(format!("Invalid trigger time: {s:?}")))
}

fn parse_times(list: &[String]) -> Result<Vec<NaiveTime>> {
    list.iter().map(|s| parse_time(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timetable() -> Timetable {
        Timetable::from_settings(&Settings::default()).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_checkin_template() {
        let msg = timetable().message_for(at(8, 55)).unwrap();
        assert!(msg.contains("CHECK-IN"));
        assert!(msg.contains("{role}"));
        assert!(msg.contains("{link}"));
        assert!(!msg.contains("LUNCH"));
    }

    #[test]
    fn test_checkout_combines_with_lunch() {
        let msg = timetable().message_for(at(12, 30)).unwrap();
        assert!(msg.contains("CHECK-OUT"));
        assert!(msg.contains("LUNCH-TIME"));
    }

    #[test]
    fn test_break_template_has_no_link() {
        let msg = timetable().message_for(at(11, 0)).unwrap();
        assert!(msg.contains("BREAK-TIME"));
        assert!(!msg.contains("{link}"));
    }

    #[test]
    fn test_unconfigured_time_is_none() {
        assert!(timetable().message_for(at(10, 0)).is_none());
    }

    #[test]
    fn test_before_hours() {
        // 08:00 → first trigger at 08:55, 55 minutes out.
        let next = timetable().until_next(at(8, 0));
        let NextEvent::BeforeHours { remaining } = next else {
            panic!("expected BeforeHours, got {next:?}");
        };
        assert_eq!(remaining.num_minutes(), 55);
        assert!(next.render().contains("work day will start in 0h 55min"));
    }

    #[test]
    fn test_after_hours() {
        let next = timetable().until_next(at(17, 30));
        assert_eq!(next, NextEvent::AfterHours);
        assert!(next.render().contains("working time is over"));
    }

    #[test]
    fn test_next_break_render() {
        // 09:10 → next trigger is the 11:00 break.
        let next = timetable().until_next(at(9, 10));
        assert_eq!(next.render(), "🤖 Next BREAKTIME in 1h 50min");
    }

    #[test]
    fn test_tie_break_declaration_order() {
        // 12:30 is both check-out and lunch; check-out is declared first.
        let next = timetable().until_next(at(12, 0));
        let NextEvent::Upcoming { kind, remaining } = next else {
            panic!("expected Upcoming");
        };
        assert_eq!(kind, EventKind::CheckOut);
        assert_eq!(remaining.num_minutes(), 30);
    }

    #[test]
    fn test_end_of_day() {
        let mut settings = Settings::default();
        settings.checkin_times = vec!["09:30".into()];
        settings.checkout_times = vec!["12:00".into()];
        settings.break_times = vec![];
        settings.lunch_times = vec![];
        let timetable = Timetable::from_settings(&settings).unwrap();
        assert_eq!(timetable.until_next(at(13, 0)), NextEvent::EndOfDay);
        assert_eq!(timetable.until_next(at(13, 0)).render(), "🤖 END OF THE DAY! 🍻");
    }

    #[test]
    fn test_trigger_times_deduped_and_sorted() {
        let times = timetable().trigger_times();
        // 08:55, 11:00, 12:30, 13:25, 15:00, 17:00 — 12:30 appears once.
        assert_eq!(times.len(), 6);
        assert_eq!(times[0], at(8, 55));
        assert_eq!(times[5], at(17, 0));
    }

    #[test]
    fn test_bad_time_rejected() {
        assert!(parse_time("25:99").is_err());
        assert!(parse_time("noon").is_err());
    }
}
