//! Workspace error type.

use thiserror::Error;

/// Errors produced anywhere in CohortBot.
#[derive(Debug, Error)]
pub enum CohortBotError {
    /// Missing or invalid configuration — fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// Chat platform (Discord REST or gateway) failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Hosted language-model call failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Spreadsheet service (auth or fetch) failure.
    #[error("Sheets error: {0}")]
    Sheets(String),

    /// Session store snapshot/restore failure.
    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CohortBotError>;
