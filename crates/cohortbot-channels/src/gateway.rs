//! Discord gateway listener — WebSocket connection, heartbeat, event stream.
//!
//! HELLO → IDENTIFY → heartbeat on the server's interval. Dispatch events
//! are translated into [`DiscordEvent`]s and pushed through an mpsc-backed
//! stream; the connection reconnects after a short pause on any close or
//! error.

use std::pin::Pin;
use std::task::{Context, Poll};

use cohortbot_core::error::{CohortBotError, Result};
use cohortbot_core::types::IncomingMessage;
use futures::stream::Stream;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT.
const INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

/// Events surfaced from the gateway connection.
#[derive(Debug, Clone)]
pub enum DiscordEvent {
    /// Session established; the bot is receiving events.
    Ready { session_id: String },
    /// A message was created somewhere the bot can see.
    Message(IncomingMessage),
    /// A slash command was invoked.
    Interaction(Interaction),
}

/// A slash-command invocation.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub command: String,
}

/// Discord gateway listener.
pub struct DiscordGateway {
    token: String,
    bot_user_id: String,
}

impl DiscordGateway {
    pub fn new(token: &str, bot_user_id: &str) -> Self {
        Self {
            token: token.to_string(),
            bot_user_id: bot_user_id.to_string(),
        }
    }

    /// Connect and keep the connection alive — returns a stream of events.
    pub fn start(self, ws_url: String) -> GatewayEventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            tracing::info!("Discord gateway loop started");
            loop {
                match self.run_connection(&ws_url, &tx).await {
                    Ok(()) => tracing::info!("Gateway connection closed, reconnecting"),
                    Err(e) => tracing::error!("Gateway error: {e}"),
                }
                if tx.is_closed() {
                    tracing::info!("Gateway loop stopped (receiver dropped)");
                    return;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });

        GatewayEventStream { rx }
    }

    /// One gateway session: HELLO, IDENTIFY, then heartbeats + dispatches.
    async fn run_connection(
        &self,
        ws_url: &str,
        tx: &tokio::sync::mpsc::UnboundedSender<DiscordEvent>,
    ) -> Result<()> {
        let url = format!("{ws_url}/?v=10&encoding=json");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| CohortBotError::Channel(format!("Gateway connect failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        // First frame must be HELLO with the heartbeat interval.
        let hello = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => text,
            other => {
                return Err(CohortBotError::Channel(format!(
                    "Expected HELLO, got: {other:?}"
                )));
            }
        };
        let interval_ms = parse_hello(&hello)
            .ok_or_else(|| CohortBotError::Channel("HELLO without heartbeat_interval".into()))?;

        let identify = json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "cohortbot",
                    "device": "cohortbot",
                },
            },
        });
        write
            .send(WsMessage::Text(identify.to_string()))
            .await
            .map_err(|e| CohortBotError::Channel(format!("IDENTIFY send failed: {e}")))?;

        let period = tokio::time::Duration::from_millis(interval_ms);
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = json!({ "op": 1, "d": seq });
                    write
                        .send(WsMessage::Text(beat.to_string()))
                        .await
                        .map_err(|e| CohortBotError::Channel(format!("Heartbeat send failed: {e}")))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let payload: Value = match serde_json::from_str(&text) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!("Unparseable gateway frame: {e}");
                                continue;
                            }
                        };
                        if let Some(s) = payload["s"].as_u64() {
                            seq = Some(s);
                        }
                        match payload["op"].as_u64().unwrap_or(0) {
                            0 => {
                                let t = payload["t"].as_str().unwrap_or("");
                                if let Some(event) = parse_dispatch(t, &payload["d"], &self.bot_user_id)
                                    && tx.send(event).is_err()
                                {
                                    return Ok(());
                                }
                            }
                            // RECONNECT / INVALID_SESSION: drop the socket and re-identify.
                            7 | 9 => {
                                tracing::info!("Gateway requested reconnect");
                                return Ok(());
                            }
                            11 => {} // heartbeat ack
                            1 => {
                                let beat = json!({ "op": 1, "d": seq });
                                write
                                    .send(WsMessage::Text(beat.to_string()))
                                    .await
                                    .map_err(|e| CohortBotError::Channel(format!("Heartbeat send failed: {e}")))?;
                            }
                            other => tracing::trace!("Ignoring gateway op {other}"),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::info!("Gateway closed: {frame:?}");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(CohortBotError::Channel(format!("Gateway read error: {e}")));
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Extract the heartbeat interval from a HELLO frame.
fn parse_hello(text: &str) -> Option<u64> {
    let payload: Value = serde_json::from_str(text).ok()?;
    if payload["op"].as_u64()? != 10 {
        return None;
    }
    payload["d"]["heartbeat_interval"].as_u64()
}

/// Translate a dispatch (op 0) payload into a [`DiscordEvent`].
fn parse_dispatch(event_type: &str, d: &Value, bot_user_id: &str) -> Option<DiscordEvent> {
    match event_type {
        "READY" => Some(DiscordEvent::Ready {
            session_id: d["session_id"].as_str().unwrap_or("").to_string(),
        }),
        "MESSAGE_CREATE" => Some(DiscordEvent::Message(parse_message(d, bot_user_id))),
        "INTERACTION_CREATE" => {
            // Type 2 = application command.
            if d["type"].as_u64() != Some(2) {
                return None;
            }
            Some(DiscordEvent::Interaction(Interaction {
                id: d["id"].as_str().unwrap_or("").to_string(),
                token: d["token"].as_str().unwrap_or("").to_string(),
                command: d["data"]["name"].as_str().unwrap_or("").to_string(),
            }))
        }
        _ => None,
    }
}

/// Normalize a MESSAGE_CREATE payload. A message with no guild_id arrived
/// in a DM channel.
fn parse_message(d: &Value, bot_user_id: &str) -> IncomingMessage {
    let author_id = d["author"]["id"].as_str().unwrap_or("").to_string();
    let mentions_me = d["mentions"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .any(|m| m["id"].as_str() == Some(bot_user_id))
        })
        .unwrap_or(false);

    IncomingMessage {
        channel_id: d["channel_id"].as_str().unwrap_or("").to_string(),
        author_name: d["author"]["username"].as_str().unwrap_or("").to_string(),
        content: d["content"].as_str().unwrap_or("").to_string(),
        is_direct: d["guild_id"].as_str().is_none(),
        mentions_me,
        is_self: author_id == bot_user_id,
        author_id,
    }
}

/// Stream of gateway events.
pub struct GatewayEventStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<DiscordEvent>,
}

impl Stream for GatewayEventStream {
    type Item = DiscordEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for GatewayEventStream {}
