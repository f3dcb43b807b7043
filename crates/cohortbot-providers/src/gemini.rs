//! Gemini provider — `models/{model}:generateContent` with conversation
//! history as `contents`.

use async_trait::async_trait;
use cohortbot_core::error::{CohortBotError, Result};
use cohortbot_core::traits::Provider;
use cohortbot_core::types::{Role, Turn};
use serde_json::{Value, json};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini generateContent provider.
pub struct GeminiProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(CohortBotError::Config("Gemini API key is empty".into()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/models/{}:generateContent", self.model)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn reply(&self, history: &[Turn], prompt: &str) -> Result<String> {
        let body = build_request(history, prompt);

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CohortBotError::Provider(format!("Gemini connection failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CohortBotError::Provider(format!(
                "Gemini API error {status}: {text}"
            )));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| CohortBotError::Provider(format!("Invalid Gemini response: {e}")))?;

        extract_text(&payload)
            .ok_or_else(|| CohortBotError::Provider("No candidates in Gemini response".into()))
    }
}

/// Build the generateContent body: prior turns plus the new prompt as a
/// fresh user turn.
fn build_request(history: &[Turn], prompt: &str) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));
    json!({ "contents": contents })
}

/// Pull the first candidate's text out of a generateContent response.
fn extract_text(payload: &Value) -> Option<String> {
    let text = payload["candidates"][0]["content"]["parts"][0]["text"].as_str()?;
    Some(text.to_string())
}
