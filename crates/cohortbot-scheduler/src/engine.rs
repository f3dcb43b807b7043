//! Scheduler engine — the wall-clock loop that fires timetable triggers.
//!
//! Each trigger carries its next fire instant in the configured timezone;
//! a tokio interval tick checks for due triggers, rolls them to the next
//! day, and hands the fired time to the dispatcher. Policies: weekend
//! fires are skipped (log only) and triggers that went stale while the
//! process was down are rolled forward without sending.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tokio::sync::Mutex;

use crate::dispatch::Dispatcher;
use crate::timetable::Timetable;

/// A fire more than this late counts as missed and is not replayed.
const MISFIRE_GRACE_SECS: i64 = 120;

struct TriggerSlot {
    time: NaiveTime,
    next_run: DateTime<Utc>,
}

/// Birthday entry: user id + month/day to match each year.
struct Birthday {
    user_id: String,
    month: u32,
    day: u32,
}

/// The scheduler engine — owns the trigger slots and fire policies.
pub struct SchedulerEngine {
    slots: Vec<TriggerSlot>,
    tz: Tz,
    skip_weekends: bool,
    catch_up_missed: bool,
    birthdays: Vec<Birthday>,
    last_birthday_check: Option<NaiveDate>,
}

impl SchedulerEngine {
    pub fn new(
        timetable: &Timetable,
        tz: Tz,
        skip_weekends: bool,
        catch_up_missed: bool,
        birthdays: &std::collections::BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        let slots = timetable
            .trigger_times()
            .into_iter()
            .map(|time| TriggerSlot {
                time,
                next_run: next_occurrence(&tz, time, now),
            })
            .collect();

        let birthdays = birthdays
            .iter()
            .filter_map(|(user_id, date)| {
                match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                    Ok(d) => Some(Birthday {
                        user_id: user_id.clone(),
                        month: d.month(),
                        day: d.day(),
                    }),
                    Err(_) => {
                        tracing::warn!("Ignoring malformed birthday for {user_id}: {date:?}");
                        None
                    }
                }
            })
            .collect();

        Self {
            slots,
            tz,
            skip_weekends,
            catch_up_missed,
            birthdays,
            last_birthday_check: None,
        }
    }

    /// Whether scheduled sends happen on this weekday.
    pub fn should_fire_on(&self, weekday: Weekday) -> bool {
        !(self.skip_weekends && matches!(weekday, Weekday::Sat | Weekday::Sun))
    }

    /// Collect the trigger times due at `now` and roll their slots to the
    /// next occurrence. Unless catch-up is enabled, stale fires (older
    /// than the grace window) roll without firing — that day's message is
    /// simply not sent.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<NaiveTime> {
        let mut fired = Vec::new();
        for slot in &mut self.slots {
            if now < slot.next_run {
                continue;
            }
            let stale = (now - slot.next_run) > Duration::seconds(MISFIRE_GRACE_SECS);
            if stale && !self.catch_up_missed {
                tracing::warn!(
                    "Missed fire for {} (scheduled {}), not replaying",
                    slot.time,
                    slot.next_run
                );
            } else {
                fired.push(slot.time);
            }
            slot.next_run = next_occurrence(&self.tz, slot.time, now);
        }
        fired
    }

    /// Users whose birthday is today, at most once per local date.
    pub fn birthdays_due(&mut self, today: NaiveDate) -> Vec<String> {
        if self.last_birthday_check == Some(today) {
            return Vec::new();
        }
        self.last_birthday_check = Some(today);
        self.birthdays
            .iter()
            .filter(|b| b.month == today.month() && b.day == today.day())
            .map(|b| b.user_id.clone())
            .collect()
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn trigger_count(&self) -> usize {
        self.slots.len()
    }
}

/// Next instant the local wall-clock reads `time`, strictly after `after`.
/// A nonexistent local time (DST gap) skips to the next day.
fn next_occurrence(tz: &Tz, time: NaiveTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let mut date = after.with_timezone(tz).date_naive();
    for _ in 0..4 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > after {
                return candidate;
            }
        }
        date = date + Duration::days(1);
    }
    after + Duration::days(1)
}

/// Spawn the scheduler loop as a background tokio task.
pub fn spawn_scheduler(
    engine: Arc<Mutex<SchedulerEngine>>,
    dispatcher: Arc<Dispatcher>,
    check_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Scheduler started (check every {check_interval_secs}s)");
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));

        loop {
            interval.tick().await;
            let now = Utc::now();

            let (fired, birthdays, local) = {
                let mut engine = engine.lock().await;
                let local = now.with_timezone(&engine.tz());
                let fired = engine.due(now);
                let weekend_ok = engine.should_fire_on(local.weekday());
                let birthdays = engine.birthdays_due(local.date_naive());
                let fired = if weekend_ok {
                    fired
                } else {
                    if !fired.is_empty() {
                        tracing::info!("😴 Weekend detected, no message sent.");
                    }
                    Vec::new()
                };
                (fired, birthdays, local)
            };

            for time in fired {
                tracing::info!("🔔 Trigger fired: {time} ({})", local.date_naive());
                if let Err(e) = dispatcher.send_scheduled(time).await {
                    tracing::error!("Scheduled dispatch failed for {time}: {e}");
                }
            }

            for user_id in birthdays {
                if let Err(e) = dispatcher.send_birthday(&user_id).await {
                    tracing::error!("Birthday greeting to {user_id} failed: {e}");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohortbot_core::config::Settings;
    use std::collections::BTreeMap;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn engine(skip_weekends: bool) -> SchedulerEngine {
        let timetable = Timetable::from_settings(&Settings::default()).unwrap();
        SchedulerEngine::new(
            &timetable,
            chrono_tz::UTC,
            skip_weekends,
            false,
            &BTreeMap::new(),
        )
    }

    #[test]
    fn test_next_occurrence_same_day() {
        let t = NaiveTime::from_hms_opt(12, 30, 0).unwrap();
        // 2026-08-07 is a Friday.
        let next = next_occurrence(&chrono_tz::UTC, t, utc(2026, 8, 7, 10, 0));
        assert_eq!(next, utc(2026, 8, 7, 12, 30));
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let t = NaiveTime::from_hms_opt(12, 30, 0).unwrap();
        let next = next_occurrence(&chrono_tz::UTC, t, utc(2026, 8, 7, 13, 0));
        assert_eq!(next, utc(2026, 8, 8, 12, 30));
    }

    #[test]
    fn test_due_fires_once_and_rolls() {
        let mut engine = engine(true);
        // Force every slot due right now.
        let now = utc(2026, 8, 7, 12, 30);
        for slot in &mut engine.slots {
            slot.next_run = now;
        }
        let fired = engine.due(now);
        assert_eq!(fired.len(), engine.trigger_count());
        // Immediately after, nothing is due.
        assert!(engine.due(now + Duration::seconds(1)).is_empty());
    }

    #[test]
    fn test_stale_fire_is_not_replayed() {
        let mut engine = engine(true);
        let now = utc(2026, 8, 7, 12, 30);
        for slot in &mut engine.slots {
            slot.next_run = now - Duration::hours(3);
        }
        assert!(engine.due(now).is_empty());
        // Slots rolled forward anyway.
        assert!(engine.slots.iter().all(|s| s.next_run > now));
    }

    #[test]
    fn test_catch_up_policy_replays_stale_fires() {
        let timetable = Timetable::from_settings(&Settings::default()).unwrap();
        let mut engine =
            SchedulerEngine::new(&timetable, chrono_tz::UTC, true, true, &BTreeMap::new());
        let now = utc(2026, 8, 7, 12, 30);
        for slot in &mut engine.slots {
            slot.next_run = now - Duration::hours(3);
        }
        assert_eq!(engine.due(now).len(), engine.trigger_count());
    }

    #[test]
    fn test_weekend_policy() {
        let skipping = engine(true);
        assert!(!skipping.should_fire_on(Weekday::Sat));
        assert!(!skipping.should_fire_on(Weekday::Sun));
        assert!(skipping.should_fire_on(Weekday::Mon));
        assert!(skipping.should_fire_on(Weekday::Fri));

        let always = engine(false);
        assert!(always.should_fire_on(Weekday::Sat));
    }

    #[test]
    fn test_birthdays_due_once_per_day() {
        let timetable = Timetable::from_settings(&Settings::default()).unwrap();
        let mut birthdays = BTreeMap::new();
        birthdays.insert("42".to_string(), "1999-08-07".to_string());
        birthdays.insert("43".to_string(), "1999-12-25".to_string());
        birthdays.insert("44".to_string(), "not-a-date".to_string());
        let mut engine =
            SchedulerEngine::new(&timetable, chrono_tz::UTC, true, false, &birthdays);

        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        assert_eq!(engine.birthdays_due(today), vec!["42".to_string()]);
        // Second check the same day is empty.
        assert!(engine.birthdays_due(today).is_empty());
        // Next day, nobody matches.
        let tomorrow = NaiveDate::from_ymd_opt(2026, 8, 8).unwrap();
        assert!(engine.birthdays_due(tomorrow).is_empty());
    }

    #[test]
    fn test_dst_gap_skips_to_next_day() {
        // Europe/Brussels 2026-03-29: 02:00–03:00 does not exist.
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let after = utc(2026, 3, 29, 0, 30); // 01:30 local, before the gap
        let next = next_occurrence(&tz, t, after);
        let local = next.with_timezone(&tz);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 30).unwrap());
    }
}
