//! The inbound-message state machine — one reply cycle per message.
//!
//! DMs are relayed to the monitoring channel and answered with the time
//! and the next event. Mentions get a canned time answer, a talk lookup,
//! or a model-backed reply through the user's session. Everything else
//! falls through to the command layer.

use std::sync::Arc;

use chrono_tz::Tz;
use cohortbot_channels::DiscordRest;
use cohortbot_channels::gateway::Interaction;
use cohortbot_core::error::Result;
use cohortbot_core::traits::Provider;
use cohortbot_core::types::{IncomingMessage, Role};
use cohortbot_scheduler::Timetable;
use cohortbot_sheets::TalkLookup;
use tokio::sync::Mutex;

use crate::sessions::SessionStore;

const TIME_KEYWORDS: &[&str] = &["what time", "time"];
const TALK_KEYWORDS: &[&str] = &["tech-talk", "tech talk"];

const NO_TALK_REPLY: &str = "No tech talk scheduled for today.";
const MODEL_APOLOGY: &str = "⚠️ An error occurred with the assistant.";

/// What a mention is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionIntent {
    TimeQuery,
    TalkQuery,
    Chat,
}

/// Classify a mention's content. Time keywords win over talk keywords,
/// matching the original keyword precedence.
pub fn classify_mention(content: &str) -> MentionIntent {
    let lower = content.to_lowercase();
    if TIME_KEYWORDS.iter().any(|k| lower.contains(k)) {
        MentionIntent::TimeQuery
    } else if TALK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        MentionIntent::TalkQuery
    } else {
        MentionIntent::Chat
    }
}

/// The monitoring-channel relay line for a received DM.
pub fn format_dm_relay(monitor_user_ids: &[String], author: &str, content: &str) -> String {
    let mentions = monitor_user_ids
        .iter()
        .map(|id| format!("<@{id}>"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("🤖 {mentions} Private message received from {author}: {content}")
}

/// Reacts to inbound messages and slash-command interactions.
pub struct ConversationHandler {
    rest: DiscordRest,
    provider: Box<dyn Provider>,
    sessions: Arc<Mutex<SessionStore>>,
    timetable: Timetable,
    talk: TalkLookup,
    monitor_channel_id: String,
    monitor_user_ids: Vec<String>,
    tz: Tz,
}

impl ConversationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rest: DiscordRest,
        provider: Box<dyn Provider>,
        sessions: Arc<Mutex<SessionStore>>,
        timetable: Timetable,
        talk: TalkLookup,
        monitor_channel_id: &str,
        monitor_user_ids: Vec<String>,
        tz: Tz,
    ) -> Self {
        Self {
            rest,
            provider,
            sessions,
            timetable,
            talk,
            monitor_channel_id: monitor_channel_id.to_string(),
            monitor_user_ids,
            tz,
        }
    }

    /// One reply cycle for an inbound message.
    pub async fn handle(&self, message: IncomingMessage) {
        if message.is_self {
            return;
        }

        let result = if message.is_direct {
            self.handle_direct(&message).await
        } else if message.mentions_me {
            self.handle_mention(&message).await
        } else {
            // Neither: nothing for us; the command layer sees interactions
            // directly via handle_interaction.
            Ok(())
        };

        if let Err(e) = result {
            tracing::error!("Message handler failed for {}: {e}", message.author_id);
        }
    }

    /// Branch 1: direct message — relay to monitoring, answer with the
    /// time and the next event.
    async fn handle_direct(&self, message: &IncomingMessage) -> Result<()> {
        tracing::info!(
            "Private message received from {}: {}",
            message.author_name,
            message.content
        );
        let relay = format_dm_relay(
            &self.monitor_user_ids,
            &message.author_name,
            &message.content,
        );
        if let Err(e) = self.rest.send_message(&self.monitor_channel_id, &relay).await {
            tracing::error!("DM relay to monitoring channel failed: {e}");
        }

        self.rest
            .send_message(
                &message.channel_id,
                &format!("The current time is {}.", self.current_time()),
            )
            .await?;
        self.rest
            .send_message(&message.channel_id, &self.next_event_line())
            .await?;
        Ok(())
    }

    /// Branch 2: the bot was mentioned.
    async fn handle_mention(&self, message: &IncomingMessage) -> Result<()> {
        tracing::info!(
            "Mentioned by {} in {}: {}",
            message.author_name,
            message.channel_id,
            message.content
        );

        match classify_mention(&message.content) {
            MentionIntent::TimeQuery => {
                self.rest
                    .send_message(
                        &message.channel_id,
                        &format!(
                            "Hello <@{}>, the current time is {}. 🤖",
                            message.author_id,
                            self.current_time()
                        ),
                    )
                    .await?;
                self.rest
                    .send_message(&message.channel_id, &self.next_event_line())
                    .await?;
            }
            MentionIntent::TalkQuery => {
                let today = chrono::Utc::now().with_timezone(&self.tz).date_naive();
                let talk = match self.talk.talk_today(today).await {
                    Ok(text) => text,
                    Err(e) => {
                        // Indistinguishable from "no talk today" for the user.
                        tracing::error!("Talk lookup failed: {e}");
                        String::new()
                    }
                };
                if talk.is_empty() {
                    self.rest
                        .send_message(&message.channel_id, NO_TALK_REPLY)
                        .await?;
                } else {
                    let prompt = format!(
                        "{} Also, the user is asking about the tech talk, so this is \
                         the tech talk scheduled today: {talk}. Can you summarize or \
                         comment on it?",
                        message.content
                    );
                    let reply = self.chat_reply(&message.author_id, &prompt).await;
                    self.send_model_outcome(&message.channel_id, reply).await?;
                }
            }
            MentionIntent::Chat => {
                let reply = self.chat_reply(&message.author_id, &message.content).await;
                self.send_model_outcome(&message.channel_id, reply).await?;
            }
        }
        Ok(())
    }

    /// Slash-command surface: one command, `time`.
    pub async fn handle_interaction(&self, interaction: Interaction) {
        if interaction.command != "time" {
            return;
        }
        let text = format!("The current time is {}.", self.current_time());
        if let Err(e) = self
            .rest
            .interaction_reply(&interaction.id, &interaction.token, &text)
            .await
        {
            tracing::error!("Interaction reply failed: {e}");
        }
    }

    /// Run one model exchange through the user's session. The store lock
    /// is released across the model call; both turns are appended on
    /// completion, so two in-flight messages for one user are ordered by
    /// whichever reply lands first.
    async fn chat_reply(&self, user_id: &str, prompt: &str) -> Result<String> {
        let history = {
            let mut sessions = self.sessions.lock().await;
            sessions.history(user_id)
        };
        let reply = self.provider.reply(&history, prompt).await?;
        {
            let mut sessions = self.sessions.lock().await;
            sessions.append(user_id, Role::User, prompt);
            sessions.append(user_id, Role::Model, &reply);
        }
        Ok(reply)
    }

    /// Send the model reply, or the fixed apology on failure.
    async fn send_model_outcome(
        &self,
        channel_id: &str,
        reply: Result<String>,
    ) -> Result<()> {
        let text = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Model error: {e}");
                MODEL_APOLOGY.to_string()
            }
        };
        self.rest.send_message(channel_id, &text).await
    }

    fn current_time(&self) -> String {
        chrono::Utc::now()
            .with_timezone(&self.tz)
            .format("%H:%M:%S")
            .to_string()
    }

    fn next_event_line(&self) -> String {
        let now = chrono::Utc::now().with_timezone(&self.tz).time();
        self.timetable.until_next(now).render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_keywords_win() {
        assert_eq!(classify_mention("what time is it?"), MentionIntent::TimeQuery);
        assert_eq!(classify_mention("TIME please"), MentionIntent::TimeQuery);
        // "time" inside "tech-talk time" still routes to the time branch,
        // matching the original keyword precedence.
        assert_eq!(
            classify_mention("when is tech-talk time"),
            MentionIntent::TimeQuery
        );
    }

    #[test]
    fn test_talk_keywords() {
        assert_eq!(classify_mention("any tech-talk today?"), MentionIntent::TalkQuery);
        assert_eq!(
            classify_mention("is there a Tech Talk planned"),
            MentionIntent::TalkQuery
        );
    }

    #[test]
    fn test_everything_else_is_chat() {
        assert_eq!(
            classify_mention("explain pandas groupby"),
            MentionIntent::Chat
        );
        assert_eq!(classify_mention(""), MentionIntent::Chat);
    }

    #[test]
    fn test_dm_relay_mentions_monitors() {
        let line = format_dm_relay(
            &["1".to_string(), "2".to_string()],
            "alice",
            "I'm locked out",
        );
        assert!(line.starts_with("🤖 <@1> <@2> Private message received from alice:"));
        assert!(line.ends_with("I'm locked out"));
    }
}
