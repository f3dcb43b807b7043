//! Talk-of-the-day lookup.
//!
//! The sheet keeps its header on row 2; columns are resolved by name so
//! the sheet can be reordered without breaking the bot. Rows whose Date
//! cell matches today (d/m/yy, no leading zeros) are rendered as
//! announcement blocks.

use chrono::NaiveDate;
use cohortbot_core::error::{CohortBotError, Result};
use serde_json::Value;
use std::path::PathBuf;

use crate::auth;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
/// Grid slice fetched per lookup; covers the header row and data rows.
const RANGE: &str = "A1:Z1000";

/// Talk-of-the-day lookup against one spreadsheet.
pub struct TalkLookup {
    client: reqwest::Client,
    keyfile: PathBuf,
    sheet_id: String,
}

impl TalkLookup {
    pub fn new(keyfile: PathBuf, sheet_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            keyfile,
            sheet_id: sheet_id.to_string(),
        }
    }

    /// Fetch and render today's talk block(s). Empty string when no row
    /// matches; auth/fetch problems are returned as errors — the caller
    /// decides whether to degrade to "no talk today".
    pub async fn talk_today(&self, today: NaiveDate) -> Result<String> {
        let key = auth::load_keyfile(&self.keyfile)?;
        let token = auth::fetch_token(&self.client, &key).await?;
        let rows = self.fetch_rows(&token).await?;
        Ok(render_talks(&rows, today))
    }

    /// Fetch the sheet grid as rows of strings.
    async fn fetch_rows(&self, token: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{SHEETS_BASE}/{}/values/{RANGE}", self.sheet_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CohortBotError::Sheets(format!("Sheet fetch failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CohortBotError::Sheets(format!(
                "Sheet fetch error {status}: {body}"
            )));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| CohortBotError::Sheets(format!("Invalid sheet response: {e}")))?;

        let rows = payload["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Positions of the named columns, resolved from the header row.
struct ColumnMap {
    date: Option<usize>,
    learner: Option<usize>,
    theme: Option<usize>,
    voice: Option<usize>,
    slides: Option<usize>,
    body_language: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Self {
            date: find("Date"),
            learner: find("Learner"),
            theme: find("Theme"),
            voice: find("Voice"),
            slides: find("Slides"),
            body_language: find("Body Language"),
        }
    }
}

/// A cell by resolved column, degraded to a placeholder when the column
/// is absent or the row is short.
fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A")
}

/// Today's date the way the sheet writes it: d/m/yy, no leading zeros.
pub fn sheet_date(date: NaiveDate) -> String {
    date.format("%-d/%-m/%y").to_string()
}

/// Render the talk block(s) for `today` from a fetched grid. Header on
/// row 2, data below it; multiple matches are joined with a blank line.
pub fn render_talks(rows: &[Vec<String>], today: NaiveDate) -> String {
    if rows.len() < 2 {
        return String::new();
    }
    let columns = ColumnMap::resolve(&rows[1]);
    let Some(date_idx) = columns.date else {
        tracing::warn!("Sheet header row has no Date column");
        return String::new();
    };
    let today_str = sheet_date(today);

    let mut blocks = Vec::new();
    for row in &rows[2..] {
        let date_value = row.get(date_idx).map(|s| s.trim()).unwrap_or("");
        if date_value != today_str {
            continue;
        }
        blocks.push(format!(
            "\n🎤 TECH-TALK ALERT 🎤\n\
             Learner: {}\n\
             Theme: {}\n\
             Voice: {}\n\
             Slides: {}\n\
             Body Language: {}",
            cell(row, columns.learner),
            cell(row, columns.theme),
            cell(row, columns.voice),
            cell(row, columns.slides),
            cell(row, columns.body_language),
        ));
    }

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(data_rows: Vec<Vec<&str>>) -> Vec<Vec<String>> {
        let mut rows = vec![
            vec!["Tech talks".to_string()],
            ["Date", "Learner", "Theme", "Voice", "Slides", "Body Language"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ];
        rows.extend(
            data_rows
                .into_iter()
                .map(|r| r.into_iter().map(String::from).collect()),
        );
        rows
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    #[test]
    fn test_sheet_date_has_no_leading_zeros() {
        assert_eq!(sheet_date(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()), "7/8/26");
        assert_eq!(
            sheet_date(NaiveDate::from_ymd_opt(2026, 12, 25).unwrap()),
            "25/12/26"
        );
    }

    #[test]
    fn test_matching_row_renders_fields_in_order() {
        let rows = grid(vec![vec![
            "7/8/26", "Ada", "Rust bots", "clear", "tidy", "confident",
        ]]);
        let out = render_talks(&rows, today());
        assert!(out.contains("TECH-TALK ALERT"));
        let learner = out.find("Learner: Ada").unwrap();
        let theme = out.find("Theme: Rust bots").unwrap();
        let voice = out.find("Voice: clear").unwrap();
        let slides = out.find("Slides: tidy").unwrap();
        let body = out.find("Body Language: confident").unwrap();
        assert!(learner < theme && theme < voice && voice < slides && slides < body);
    }

    #[test]
    fn test_no_match_is_exactly_empty() {
        let rows = grid(vec![vec!["6/8/26", "Ada", "Rust", "a", "b", "c"]]);
        assert_eq!(render_talks(&rows, today()), "");
    }

    #[test]
    fn test_missing_column_degrades_to_placeholder() {
        // No Slides column at all.
        let mut rows = vec![
            vec!["Tech talks".to_string()],
            ["Date", "Learner", "Theme", "Voice", "Body Language"]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
            ["7/8/26", "Ada", "Rust", "clear", "confident"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ];
        let out = render_talks(&rows, today());
        assert!(out.contains("Slides: N/A"));
        assert!(out.contains("Learner: Ada"));

        // Short row: present column, absent cell.
        rows[2] = vec!["7/8/26".to_string(), "Ada".to_string()];
        let out = render_talks(&rows, today());
        assert!(out.contains("Theme: N/A"));
    }

    #[test]
    fn test_multiple_matches_joined_with_blank_line() {
        let rows = grid(vec![
            vec!["7/8/26", "Ada", "Rust", "a", "b", "c"],
            vec!["7/8/26", "Grace", "Compilers", "d", "e", "f"],
        ]);
        let out = render_talks(&rows, today());
        assert!(out.contains("Learner: Ada"));
        assert!(out.contains("Learner: Grace"));
        assert!(out.contains("\n\n"));
    }

    #[test]
    fn test_columns_resolved_by_name_not_position() {
        let mut rows = grid(vec![]);
        rows[1] = ["Theme", "Date", "Body Language", "Learner", "Voice", "Slides"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        rows.push(
            ["Rust", "7/8/26", "confident", "Ada", "clear", "tidy"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let out = render_talks(&rows, today());
        assert!(out.contains("Learner: Ada"));
        assert!(out.contains("Theme: Rust"));
    }

    #[test]
    fn test_header_only_grid_is_empty() {
        assert_eq!(render_talks(&grid(vec![]), today()), "");
        assert_eq!(render_talks(&[], today()), "");
    }
}
