//! Announcement dispatch — compose the scheduled message per destination
//! and send it. One destination failing never blocks the others.

use chrono::NaiveTime;
use chrono_tz::Tz;
use cohortbot_channels::DiscordRest;
use cohortbot_core::error::Result;
use cohortbot_core::traits::Channel as _;
use cohortbot_core::types::OutgoingMessage;
use cohortbot_sheets::TalkLookup;

use crate::timetable::{Timetable, parse_time};

/// A scheduled-announcement target: channel + role to mention + link.
#[derive(Debug, Clone)]
pub struct Destination {
    pub channel_id: String,
    pub role_name: String,
    pub link: String,
}

/// Composes and sends scheduled announcements.
pub struct Dispatcher {
    rest: DiscordRest,
    timetable: Timetable,
    destinations: Vec<Destination>,
    talk_time: NaiveTime,
    talk: TalkLookup,
    tz: Tz,
}

impl Dispatcher {
    pub fn new(
        rest: DiscordRest,
        timetable: Timetable,
        destinations: Vec<Destination>,
        talk_time: &str,
        talk: TalkLookup,
        tz: Tz,
    ) -> Result<Self> {
        Ok(Self {
            rest,
            timetable,
            destinations,
            talk_time: parse_time(talk_time)?,
            talk,
            tz,
        })
    }

    /// Send the announcement for one fired trigger to every destination.
    pub async fn send_scheduled(&self, time: NaiveTime) -> Result<()> {
        let Some(template) = self.timetable.message_for(time) else {
            tracing::warn!("No announcement configured for {time}");
            return Ok(());
        };

        // One lookup per fire, shared across destinations. A failed lookup
        // is logged and reads as "no talk today" downstream.
        let talk = if time == self.talk_time {
            let today = chrono::Utc::now().with_timezone(&self.tz).date_naive();
            match self.talk.talk_today(today).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::error!("Talk lookup failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        for destination in &self.destinations {
            if let Err(e) = self.send_to(destination, &template, talk.as_deref()).await {
                tracing::error!(
                    "Error sending announcement to channel {}: {e}",
                    destination.channel_id
                );
            }
        }
        Ok(())
    }

    async fn send_to(
        &self,
        destination: &Destination,
        template: &str,
        talk: Option<&str>,
    ) -> Result<()> {
        let mention = self
            .rest
            .role_mention(&destination.channel_id, &destination.role_name)
            .await?;
        if mention.is_none() {
            tracing::warn!(
                "Role '{}' not found for channel {}",
                destination.role_name,
                destination.channel_id
            );
        }

        let message = compose(template, mention.as_deref(), &destination.link, talk);
        self.rest
            .send(OutgoingMessage::new(destination.channel_id.as_str(), message))
            .await?;
        tracing::info!("✅ Announcement sent to {}", destination.channel_id);
        Ok(())
    }

    /// Send the birthday greeting DM.
    pub async fn send_birthday(&self, user_id: &str) -> Result<()> {
        let name = match self.rest.get_user(user_id).await {
            Ok(user) => user.username,
            Err(e) => {
                tracing::warn!("Could not fetch user {user_id}: {e}");
                user_id.to_string()
            }
        };
        self.rest
            .send_dm(user_id, &format!("🎉 Happy Birthday {name}! 🎂"))
            .await
    }
}

/// Substitute the role mention and link into the template and append the
/// talk block when present and non-empty.
pub fn compose(
    template: &str,
    role_mention: Option<&str>,
    link: &str,
    talk: Option<&str>,
) -> String {
    let message = template
        .replace("{role}", role_mention.unwrap_or(""))
        .replace("{link}", link);
    match talk {
        Some(text) if !text.is_empty() => format!("{message}\n{text}"),
        _ => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohortbot_core::config::Settings;

    fn template_at(h: u32, m: u32) -> String {
        let timetable = Timetable::from_settings(&Settings::default()).unwrap();
        timetable
            .message_for(NaiveTime::from_hms_opt(h, m, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn test_lunch_fire_with_role_present() {
        let message = compose(
            &template_at(12, 30),
            Some("<@&42>"),
            "https://example.org/attendance",
            None,
        );
        assert!(message.contains("CHECK-OUT"));
        assert!(message.contains("LUNCH-TIME"));
        assert!(message.contains("<@&42>"));
        assert!(message.contains("https://example.org/attendance"));
        assert!(!message.contains("{role}"));
        assert!(!message.contains("{link}"));
    }

    #[test]
    fn test_lunch_fire_with_role_absent_same_text_no_mention() {
        let with_role = compose(&template_at(12, 30), Some("<@&42>"), "L", None);
        let without = compose(&template_at(12, 30), None, "L", None);
        assert!(!without.contains("<@&"));
        assert_eq!(with_role.replace("<@&42>", ""), without);
        assert!(without.contains("CHECK-OUT"));
        assert!(without.contains("LUNCH-TIME"));
    }

    #[test]
    fn test_talk_block_appended_only_when_non_empty() {
        let base = compose(&template_at(13, 25), None, "L", Some(""));
        assert!(!base.ends_with('\n'));
        assert!(!base.contains("TECH-TALK"));

        let with_talk = compose(&template_at(13, 25), None, "L", Some("\n🎤 TECH-TALK ALERT 🎤"));
        assert!(with_talk.contains("TECH-TALK ALERT"));
        assert!(with_talk.starts_with(&base));
    }
}
