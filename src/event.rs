use crate::audio::decode::DecodedAudio;
use crate::error::Result;
use crate::ingest::{AudioFile, Ticket};
use crate::playback::SessionId;

/// Everything that resumes the event loop.
#[derive(Debug)]
pub enum Event {
    /// A file was picked or dropped.
    FileSelected(AudioFile),
    FileRead {
        ticket: Ticket,
        result: Result<Vec<u8>>,
    },
    Decoded {
        ticket: Ticket,
        result: Result<DecodedAudio>,
    },
    /// A source finished, either on its own or because it was stopped.
    Ended(SessionId),
    /// No more files will be dropped.
    InputClosed,
}
