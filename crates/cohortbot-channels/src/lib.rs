//! # CohortBot Channels
//! Discord channel implementation: REST client + gateway listener.

pub mod discord;
pub mod gateway;

pub use discord::{DiscordRest, DiscordRole, DiscordUser};
pub use gateway::{DiscordEvent, DiscordGateway, GatewayEventStream, Interaction};
