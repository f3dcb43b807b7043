//! # CohortBot Providers
//! Hosted language-model client. One provider today: Gemini
//! `generateContent`, the model the assistant persona runs on.

pub mod gemini;

use cohortbot_core::config::Config;
use cohortbot_core::error::Result;
use cohortbot_core::traits::Provider;

/// Create the configured provider.
pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    Ok(Box::new(gemini::GeminiProvider::new(
        &config.gemini_api_key,
        &config.settings.model,
    )?))
}
