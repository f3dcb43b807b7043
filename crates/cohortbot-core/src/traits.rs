//! Boundary traits for the external collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{OutgoingMessage, Turn};

/// A chat platform connection able to deliver outbound text.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Send a text message to a channel.
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Send a direct message to a user.
    async fn send_dm(&self, user_id: &str, content: &str) -> Result<()>;
}

/// A hosted language model.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a reply given the prior conversation and a new prompt.
    /// `history` already ends with the persona preamble and past turns;
    /// the prompt is appended as a fresh user turn by the implementation.
    async fn reply(&self, history: &[Turn], prompt: &str) -> Result<String>;
}
