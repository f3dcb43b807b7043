//! CohortBot configuration.
//!
//! Secrets and platform identifiers come from the environment and are
//! required at startup — a missing value fails fast with the variable
//! name. Tuning (timetable, timezone, policies) comes from an optional
//! TOML file with defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CohortBotError, Result};

/// Root configuration: required environment values + file-sourced settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token.
    pub discord_token: String,
    /// Discord application id (slash-command registration).
    pub app_id: String,
    /// Destination channel for scheduled announcements.
    pub announce_channel_id: String,
    /// Monitoring channel for DM relays and liveness notices.
    pub monitor_channel_id: String,
    /// Hosted-model API key.
    pub gemini_api_key: String,
    /// User ids mentioned when a DM is relayed to the monitoring channel.
    pub monitor_user_ids: Vec<String>,
    /// Path to the Google service-account JSON keyfile.
    pub sheets_keyfile: PathBuf,
    /// Spreadsheet id for the talk-of-the-day lookup.
    pub sheet_id: String,
    /// File-sourced tuning.
    pub settings: Settings,
}

/// Environment variables required at startup.
const REQUIRED: &[&str] = &[
    "DISCORD_TOKEN",
    "DISCORD_APP_ID",
    "CHANNEL_ID_AI",
    "CHANNEL_TEST_ID",
    "GEMINI_API_KEY",
    "MONITOR_USER_IDS",
    "SHEETS_KEYFILE",
    "SHEET_ID",
];

impl Config {
    /// Load from the process environment plus an optional settings file.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let settings = match settings_path {
            Some(path) => Settings::load_from(path)?,
            None => {
                let default = Self::home_dir().join("config.toml");
                if default.exists() {
                    Settings::load_from(&default)?
                } else {
                    Settings::default()
                }
            }
        };
        Self::from_lookup(|key| std::env::var(key).ok(), settings)
    }

    /// Build from an arbitrary variable lookup. Split out so tests don't
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F, settings: Settings) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        for key in REQUIRED {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => {
                    vars.insert(*key, v.trim().to_string());
                }
                _ => {
                    return Err(CohortBotError::Config(format!(
                        "Missing required environment variable: {key}"
                    )));
                }
            }
        }

        // Validate the timezone up front — class-1 error, not a first-use one.
        settings.tz()?;

        let monitor_user_ids = vars["MONITOR_USER_IDS"]
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            discord_token: vars["DISCORD_TOKEN"].clone(),
            app_id: vars["DISCORD_APP_ID"].clone(),
            announce_channel_id: vars["CHANNEL_ID_AI"].clone(),
            monitor_channel_id: vars["CHANNEL_TEST_ID"].clone(),
            gemini_api_key: vars["GEMINI_API_KEY"].clone(),
            monitor_user_ids,
            sheets_keyfile: PathBuf::from(&vars["SHEETS_KEYFILE"]),
            sheet_id: vars["SHEET_ID"].clone(),
            settings,
        })
    }

    /// Get the CohortBot state directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cohortbot")
    }
}

/// File-sourced tuning with defaults matching the canonical timetable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// IANA timezone the timetable is interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Hosted model name.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_checkin_times")]
    pub checkin_times: Vec<String>,
    #[serde(default = "default_checkout_times")]
    pub checkout_times: Vec<String>,
    #[serde(default = "default_break_times")]
    pub break_times: Vec<String>,
    #[serde(default = "default_lunch_times")]
    pub lunch_times: Vec<String>,
    /// The fire time whose announcement carries the talk-of-the-day block.
    #[serde(default = "default_talk_time")]
    pub talk_time: String,
    /// Role mentioned in announcements (resolved by name per guild).
    #[serde(default = "default_role_name")]
    pub role_name: String,
    /// Attendance reference link substituted into announcement templates.
    #[serde(default = "default_moodle_link")]
    pub moodle_link: String,
    /// Skip scheduled sends on Saturday/Sunday.
    #[serde(default = "bool_true")]
    pub skip_weekends: bool,
    /// Replay triggers missed while the process was down. Fixed policy:
    /// the engine never replays; the flag exists to make that explicit.
    #[serde(default)]
    pub catch_up_missed: bool,
    /// Session snapshot file. Defaults to `user_chats.json` in the state dir.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Session cache capacity; least-recently-used sessions are evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// User id → birthday (YYYY-MM-DD). Matching users get a DM greeting.
    #[serde(default)]
    pub birthdays: BTreeMap<String, String>,
}

fn default_timezone() -> String {
    "Europe/Brussels".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_checkin_times() -> Vec<String> {
    vec!["08:55".into(), "13:25".into()]
}
fn default_checkout_times() -> Vec<String> {
    vec!["12:30".into(), "17:00".into()]
}
fn default_break_times() -> Vec<String> {
    vec!["11:00".into(), "15:00".into()]
}
fn default_lunch_times() -> Vec<String> {
    vec!["12:30".into()]
}
fn default_talk_time() -> String {
    "13:25".into()
}
fn default_role_name() -> String {
    "Thomas5".into()
}
fn default_moodle_link() -> String {
    "https://moodle.becode.org/mod/attendance/view.php?id=1433".into()
}
fn default_max_sessions() -> usize {
    512
}
fn bool_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            model: default_model(),
            checkin_times: default_checkin_times(),
            checkout_times: default_checkout_times(),
            break_times: default_break_times(),
            lunch_times: default_lunch_times(),
            talk_time: default_talk_time(),
            role_name: default_role_name(),
            moodle_link: default_moodle_link(),
            skip_weekends: true,
            catch_up_missed: false,
            snapshot_path: None,
            max_sessions: default_max_sessions(),
            birthdays: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CohortBotError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            CohortBotError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| CohortBotError::Config(format!("Unknown timezone: {}", self.timezone)))
    }

    /// Resolved snapshot path.
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| Config::home_dir().join("user_chats.json"))
    }
}
