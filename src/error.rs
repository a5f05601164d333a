use std::io;

use thiserror::Error;

/// Everything that can end a single ingest or playback attempt.
///
/// None of these are fatal to the program: the controller turns them into a
/// status line and a log entry and waits for the next file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("audio output unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("failed to read {name}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error("failed to start playback: {0}")]
    Playback(String),
}

impl Error {
    /// Status line shown for this error. The leading `!` marks error texts.
    pub fn status_text(&self) -> &'static str {
        match self {
            Error::CapabilityUnavailable(_) => "!No audio output available",
            Error::Read { .. } => "!Failed to read the file",
            Error::Decode { .. } => "!Failed to decode the file",
            Error::Playback(_) => "!Failed to start playback",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
