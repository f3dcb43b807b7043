//! Discord REST client — message sending, role lookup, slash-command sync.

use async_trait::async_trait;
use cohortbot_core::error::{CohortBotError, Result};
use cohortbot_core::traits::Channel;
use cohortbot_core::types::OutgoingMessage;
use serde::Deserialize;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST client.
#[derive(Clone)]
pub struct DiscordRest {
    token: String,
    app_id: String,
    client: reqwest::Client,
}

impl DiscordRest {
    pub fn new(token: &str, app_id: &str) -> Self {
        Self {
            token: token.to_string(),
            app_id: app_id.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{API_BASE}{path}")
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bot {}", self.token))
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(CohortBotError::Channel(format!(
                "{what} failed: {status}: {body}"
            )))
        }
    }

    /// Send a text message to a channel.
    pub async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let url = self.api_url(&format!("/channels/{channel_id}/messages"));
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("sendMessage failed: {e}")))?;
        Self::check(resp, "sendMessage").await?;
        Ok(())
    }

    /// Open (or reuse) the DM channel with a user and send a message there.
    pub async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<()> {
        let url = self.api_url("/users/@me/channels");
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "recipient_id": user_id }))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("createDM failed: {e}")))?;
        let dm: DiscordChannelInfo = Self::check(resp, "createDM")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid createDM response: {e}")))?;
        self.send_message(&dm.id, text).await
    }

    /// Fetch a channel (to learn which guild it belongs to).
    pub async fn get_channel(&self, channel_id: &str) -> Result<DiscordChannelInfo> {
        let url = self.api_url(&format!("/channels/{channel_id}"));
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("getChannel failed: {e}")))?;
        Self::check(resp, "getChannel")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid channel response: {e}")))
    }

    /// Fetch all roles of a guild.
    pub async fn get_guild_roles(&self, guild_id: &str) -> Result<Vec<DiscordRole>> {
        let url = self.api_url(&format!("/guilds/{guild_id}/roles"));
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("getRoles failed: {e}")))?;
        Self::check(resp, "getRoles")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid roles response: {e}")))
    }

    /// Resolve a role mention string for a channel's guild by role name.
    /// `Ok(None)` when the channel has no guild or the role is absent.
    pub async fn role_mention(&self, channel_id: &str, role_name: &str) -> Result<Option<String>> {
        let channel = self.get_channel(channel_id).await?;
        let Some(guild_id) = channel.guild_id else {
            return Ok(None);
        };
        let roles = self.get_guild_roles(&guild_id).await?;
        Ok(roles
            .into_iter()
            .find(|r| r.name == role_name)
            .map(|r| format!("<@&{}>", r.id)))
    }

    /// Fetch the bot's own user.
    pub async fn get_me(&self) -> Result<DiscordUser> {
        let url = self.api_url("/users/@me");
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("getMe failed: {e}")))?;
        Self::check(resp, "getMe")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid getMe response: {e}")))
    }

    /// Fetch a user by id.
    pub async fn get_user(&self, user_id: &str) -> Result<DiscordUser> {
        let url = self.api_url(&format!("/users/{user_id}"));
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("getUser failed: {e}")))?;
        Self::check(resp, "getUser")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid user response: {e}")))
    }

    /// Fetch the gateway WebSocket URL for this bot.
    pub async fn gateway_url(&self) -> Result<String> {
        let url = self.api_url("/gateway/bot");
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("getGateway failed: {e}")))?;
        let body: GatewayInfo = Self::check(resp, "getGateway")
            .await?
            .json()
            .await
            .map_err(|e| CohortBotError::Channel(format!("Invalid gateway response: {e}")))?;
        Ok(body.url)
    }

    /// Register (overwrite) the global command surface: one `time` command.
    pub async fn sync_commands(&self) -> Result<()> {
        let url = self.api_url(&format!("/applications/{}/commands", self.app_id));
        let commands = serde_json::json!([{
            "name": "time",
            "description": "Displays the current time",
            "type": 1,
        }]);
        let resp = self
            .authed(self.client.put(&url))
            .json(&commands)
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("syncCommands failed: {e}")))?;
        Self::check(resp, "syncCommands").await?;
        tracing::info!("Slash commands are synced");
        Ok(())
    }

    /// Reply to a slash-command interaction with a text message.
    pub async fn interaction_reply(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        text: &str,
    ) -> Result<()> {
        let url = self.api_url(&format!(
            "/interactions/{interaction_id}/{interaction_token}/callback"
        ));
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "type": 4,
                "data": { "content": text },
            }))
            .send()
            .await
            .map_err(|e| CohortBotError::Channel(format!("interaction reply failed: {e}")))?;
        Self::check(resp, "interaction reply").await?;
        Ok(())
    }
}

#[async_trait]
impl Channel for DiscordRest {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.send_message(&message.channel_id, &message.content)
            .await
    }

    async fn send_dm(&self, user_id: &str, content: &str) -> Result<()> {
        self.send_direct_message(user_id, content).await
    }
}

// --- Discord API Types ---

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordChannelInfo {
    pub id: String,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordRole {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}
