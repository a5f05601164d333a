use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::audio::decode::AudioDecoder;
use crate::error::Error;
use crate::event::Event;

/// A user-supplied audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub name: String,
    pub path: PathBuf,
}

impl AudioFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

/// Identifies one ingest attempt. Results for older tickets are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Asynchronous read and decode steps. Completion is reported as
/// `Event::FileRead` and `Event::Decoded`.
pub trait IngestTasks {
    fn read(&mut self, ticket: Ticket, file: &AudioFile);
    fn decode(&mut self, ticket: Ticket, name: &str, bytes: Vec<u8>);
}

/// Runs each step on its own worker thread.
pub struct ThreadedIngest {
    events: Sender<Event>,
    decoder: Arc<dyn AudioDecoder>,
}

impl ThreadedIngest {
    pub fn new(events: Sender<Event>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { events, decoder }
    }
}

impl IngestTasks for ThreadedIngest {
    fn read(&mut self, ticket: Ticket, file: &AudioFile) {
        let events = self.events.clone();
        let file = file.clone();
        std::thread::spawn(move || {
            let result = read_file(&file.name, &file.path);
            let _ = events.send(Event::FileRead { ticket, result });
        });
    }

    fn decode(&mut self, ticket: Ticket, name: &str, bytes: Vec<u8>) {
        let events = self.events.clone();
        let decoder = self.decoder.clone();
        let name = name.to_string();
        std::thread::spawn(move || {
            let result = decoder.decode(&name, bytes);
            let _ = events.send(Event::Decoded { ticket, result });
        });
    }
}

fn read_file(name: &str, path: &Path) -> crate::error::Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| Error::Read {
        name: name.to_string(),
        source,
    })?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Treats every non-empty stdin line as a dropped file path.
pub fn watch_stdin(events: Sender<Event>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let path = line.trim();
            if path.is_empty() {
                continue;
            }
            if events.send(Event::FileSelected(AudioFile::from_path(path))).is_err() {
                return;
            }
        }
        let _ = events.send(Event::InputClosed);
    });
}
