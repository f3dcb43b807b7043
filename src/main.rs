//! # CohortBot — attendance reminders + assistant relay
//!
//! Posts the day's check-in/check-out/break announcements on a fixed
//! timetable, relays DMs to a monitoring channel, and answers mentions
//! through a hosted model with per-user conversation context.
//!
//! Usage:
//!   cohortbot                 # run the bot
//!   cohortbot --verbose       # debug logging
//!   cohortbot talk            # print today's talk lookup and exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use cohortbot_agent::{ConversationHandler, SessionStore};
use cohortbot_channels::{DiscordEvent, DiscordGateway, DiscordRest};
use cohortbot_core::Config;
use cohortbot_scheduler::{Destination, Dispatcher, SchedulerEngine, Timetable, spawn_scheduler};
use cohortbot_sheets::TalkLookup;

/// Seconds between scheduler due-trigger checks.
const SCHEDULER_TICK_SECS: u64 = 20;

#[derive(Parser)]
#[command(name = "cohortbot", version, about = "🤖 CohortBot — cohort attendance reminders and assistant relay")]
struct Cli {
    /// Path to the settings TOML file (defaults to ~/.cohortbot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the talk-of-the-day lookup once and print the result
    Talk,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let tz = config.settings.tz()?;

    match cli.command {
        Some(Command::Talk) => {
            let talk = TalkLookup::new(config.sheets_keyfile.clone(), &config.sheet_id);
            let today = chrono::Utc::now().with_timezone(&tz).date_naive();
            let text = talk.talk_today(today).await?;
            if text.is_empty() {
                println!("No tech talks scheduled for today.");
            } else {
                println!("{text}");
            }
            Ok(())
        }
        None => run(config, tz).await,
    }
}

async fn run(config: Config, tz: chrono_tz::Tz) -> Result<()> {
    let rest = DiscordRest::new(&config.discord_token, &config.app_id);
    let me = rest.get_me().await?;
    tracing::info!("Bot connected as {}", me.username);

    let timetable = Timetable::from_settings(&config.settings)?;

    // Session store: restore the snapshot if one exists.
    let snapshot_path = config.settings.snapshot_path();
    let mut store = SessionStore::new(config.settings.max_sessions);
    if let Err(e) = store.restore(&snapshot_path) {
        tracing::warn!("Session restore failed: {e}");
    }
    let sessions = Arc::new(Mutex::new(store));

    // Scheduler: timetable triggers → dispatcher.
    let destinations = vec![Destination {
        channel_id: config.announce_channel_id.clone(),
        role_name: config.settings.role_name.clone(),
        link: config.settings.moodle_link.clone(),
    }];
    let dispatcher = Arc::new(Dispatcher::new(
        rest.clone(),
        timetable.clone(),
        destinations,
        &config.settings.talk_time,
        TalkLookup::new(config.sheets_keyfile.clone(), &config.sheet_id),
        tz,
    )?);
    let engine = Arc::new(Mutex::new(SchedulerEngine::new(
        &timetable,
        tz,
        config.settings.skip_weekends,
        config.settings.catch_up_missed,
        &config.settings.birthdays,
    )));
    let _scheduler = spawn_scheduler(engine, dispatcher, SCHEDULER_TICK_SECS);

    // Conversation handler.
    let provider = cohortbot_providers::create_provider(&config)?;
    let handler = Arc::new(ConversationHandler::new(
        rest.clone(),
        provider,
        sessions.clone(),
        timetable,
        TalkLookup::new(config.sheets_keyfile.clone(), &config.sheet_id),
        &config.monitor_channel_id,
        config.monitor_user_ids.clone(),
        tz,
    ));

    // Gateway event loop. Each message is handled in its own task so a
    // slow model call only stalls that reply.
    let ws_url = rest.gateway_url().await?;
    let mut events = DiscordGateway::new(&config.discord_token, &me.id).start(ws_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received ctrl-c, shutting down");
                break;
            }
            event = events.next() => match event {
                Some(DiscordEvent::Ready { session_id }) => {
                    tracing::info!("Gateway ready (session {session_id})");
                    if let Err(e) = rest
                        .send_message(
                            &config.monitor_channel_id,
                            "🤖 Yeah I'm still workin' no worries 🤖",
                        )
                        .await
                    {
                        tracing::warn!("Liveness notice failed: {e}");
                    }
                    if let Err(e) = rest.sync_commands().await {
                        tracing::warn!("Command sync failed: {e}");
                    }
                }
                Some(DiscordEvent::Message(message)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move { handler.handle(message).await });
                }
                Some(DiscordEvent::Interaction(interaction)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move { handler.handle_interaction(interaction).await });
                }
                None => {
                    tracing::warn!("Gateway stream ended");
                    break;
                }
            },
        }
    }

    // Best-effort snapshot before the connection drops.
    let store = sessions.lock().await;
    if let Err(e) = store.snapshot(&snapshot_path) {
        tracing::warn!("Session snapshot failed: {e}");
    } else {
        tracing::info!("💾 Sessions snapshotted to {}", snapshot_path.display());
    }
    Ok(())
}
