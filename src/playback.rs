use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::decode::DecodedAudio;
use crate::audio::output::{AudioBackend, PlaybackSource};
use crate::error::{Error, Result};
use crate::ingest::{AudioFile, IngestTasks, Ticket};
use crate::render::canvas::Canvas;
use crate::render::spectrum::{FrameOutcome, SpectrumRenderer};
use crate::schedule::FrameQueue;
use crate::status::InfoAnnouncer;

/// Identifies one playback session. Ids only grow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    #[allow(dead_code)]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Decoding,
    Playing,
    Ended,
}

/// One playback attempt tied to one decoded buffer.
pub struct Session {
    pub id: SessionId,
    pub file_name: String,
    pub audio: Arc<DecodedAudio>,
    source: Box<dyn PlaybackSource>,
    pub live: bool,
    /// Set while a replacement file is being read or decoded.
    pub force_stop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestStage {
    Reading,
    Decoding,
}

struct PendingIngest {
    ticket: Ticket,
    file: AudioFile,
    stage: IngestStage,
}

/// Owns the playback session and drives the spectrum loop.
pub struct PlaybackController {
    backend: Option<Box<dyn AudioBackend>>,
    tasks: Box<dyn IngestTasks>,
    renderer: SpectrumRenderer,
    frames: FrameQueue,
    info: InfoAnnouncer,
    idle_text: String,
    session: Option<Session>,
    ingest: Option<PendingIngest>,
    selected: Option<AudioFile>,
    is_playing: bool,
    next_session: u64,
    next_ticket: u64,
}

impl PlaybackController {
    pub fn new(
        backend: Result<Box<dyn AudioBackend>>,
        tasks: Box<dyn IngestTasks>,
        renderer: SpectrumRenderer,
        mut info: InfoAnnouncer,
        idle_text: &str,
        now: Instant,
    ) -> Self {
        let backend = match backend {
            Ok(backend) => Some(backend),
            Err(err) => {
                log::error!("{}", err);
                info.announce(err.status_text(), false, now);
                None
            }
        };

        Self {
            backend,
            tasks,
            renderer,
            frames: FrameQueue::new(),
            info,
            idle_text: idle_text.to_string(),
            session: None,
            ingest: None,
            selected: None,
            is_playing: false,
            next_session: 0,
            next_ticket: 0,
        }
    }

    /// A file was picked or dropped. Returns false when there is no audio
    /// output to play it on.
    pub fn submit_file(&mut self, file: AudioFile, now: Instant) -> bool {
        if self.backend.is_none() {
            log::warn!("Ignoring {}: audio output unavailable", file.name);
            return false;
        }

        if self.is_playing {
            if let Some(session) = self.session.as_mut() {
                session.force_stop = true;
            }
        }

        self.info.announce("Uploading", true, now);

        self.next_ticket += 1;
        let ticket = Ticket::new(self.next_ticket);
        log::info!("Reading {}", file.path.display());
        self.tasks.read(ticket, &file);
        self.info.announce("Reading the file", true, now);

        self.selected = Some(file.clone());
        self.ingest = Some(PendingIngest {
            ticket,
            file,
            stage: IngestStage::Reading,
        });
        true
    }

    pub fn on_read(&mut self, ticket: Ticket, result: Result<Vec<u8>>, now: Instant) {
        let Some(ingest) = self.current_ingest(ticket) else {
            log::debug!("Dropping read result for superseded {:?}", ticket);
            return;
        };

        match result {
            Ok(bytes) => {
                ingest.stage = IngestStage::Decoding;
                let name = ingest.file.name.clone();
                self.info.announce("Decoding the audio", true, now);
                self.tasks.decode(ticket, &name, bytes);
            }
            Err(err) => self.abort_ingest(err, now),
        }
    }

    pub fn on_decoded(&mut self, ticket: Ticket, result: Result<DecodedAudio>, now: Instant) {
        if self.current_ingest(ticket).is_none() {
            log::debug!("Dropping decode result for superseded {:?}", ticket);
            return;
        }

        match result {
            Ok(audio) => {
                let file = match self.ingest.take() {
                    Some(ingest) => ingest.file,
                    None => return,
                };
                self.info
                    .announce("Decoded successfully, starting the visualizer", true, now);
                if let Err(err) = self.start_session(file, audio, now) {
                    log::error!("{}", err);
                    self.info.announce(err.status_text(), false, now);
                }
            }
            Err(err) => self.abort_ingest(err, now),
        }
    }

    /// End notification from the audio backend.
    pub fn on_ended(&mut self, id: SessionId, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.id != id {
            log::debug!("Ignoring end of superseded session {:?}", id);
            return;
        }
        if !session.live {
            return;
        }

        session.live = false;
        self.is_playing = false;

        if session.force_stop {
            // A replacement is still loading; its progress owns the status line.
            session.force_stop = false;
            log::info!("{} ended while a replacement is loading", session.file_name);
            return;
        }

        log::info!("{} ended", session.file_name);
        self.info.announce(&self.idle_text, false, now);
        self.selected = None;
    }

    /// Run the frame callbacks due on this refresh tick. Returns true when
    /// the canvas was repainted.
    pub fn refresh(&mut self, canvas: &mut dyn Canvas) -> bool {
        let mut drawn = false;
        for handle in self.frames.take_due() {
            let outcome = self
                .renderer
                .draw_frame(handle, self.is_playing, canvas, &mut self.frames);
            drawn |= outcome == FrameOutcome::Drawn;
        }
        drawn
    }

    /// Advance the status ellipsis. Returns true when the text changed.
    pub fn tick_status(&mut self, now: Instant) -> bool {
        self.info.tick(now)
    }

    pub fn status(&self) -> String {
        self.info.display()
    }

    pub fn status_deadline(&self) -> Option<Instant> {
        self.info.next_deadline()
    }

    pub fn phase(&self) -> Phase {
        if let Some(ingest) = &self.ingest {
            return match ingest.stage {
                IngestStage::Reading => Phase::Uploading,
                IngestStage::Decoding => Phase::Decoding,
            };
        }
        match &self.session {
            Some(_) if self.is_playing => Phase::Playing,
            Some(_) => Phase::Ended,
            None => Phase::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Nothing is loading, nothing is playing and the bars are down.
    pub fn is_settled(&self) -> bool {
        self.ingest.is_none() && !self.is_playing && !self.renderer.is_running()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[allow(dead_code)]
    pub fn selected_file(&self) -> Option<&AudioFile> {
        self.selected.as_ref()
    }

    /// Stop whatever is playing. Used on shutdown.
    pub fn stop(&mut self) {
        self.renderer.cancel(&mut self.frames);
        if let Some(session) = self.session.as_mut() {
            session.source.stop();
            session.live = false;
        }
        self.is_playing = false;
    }

    fn current_ingest(&mut self, ticket: Ticket) -> Option<&mut PendingIngest> {
        self.ingest.as_mut().filter(|ingest| ingest.ticket == ticket)
    }

    fn abort_ingest(&mut self, err: Error, now: Instant) {
        log::error!("{}", err);
        self.info.announce(err.status_text(), false, now);
        self.ingest = None;
        if let Some(session) = self.session.as_mut() {
            session.force_stop = false;
        }
    }

    fn start_session(&mut self, file: AudioFile, audio: DecodedAudio, now: Instant) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| Error::CapabilityUnavailable("no audio backend".into()))?;

        self.next_session += 1;
        let id = SessionId(self.next_session);
        let audio = Arc::new(audio);
        let mut source = backend.create_source(id, audio.clone())?;

        // The old loop and source go before anything of the new session runs.
        self.renderer.cancel(&mut self.frames);
        if let Some(mut old) = self.session.take() {
            old.source.stop();
            old.live = false;
        }
        self.is_playing = false;

        source.start(Duration::ZERO)?;
        let analyser = source.analyser();

        self.session = Some(Session {
            id,
            file_name: file.name.clone(),
            audio,
            source,
            live: true,
            force_stop: false,
        });
        self.is_playing = true;

        let text = format!("Playing {}", file.name);
        log::info!("{}", text);
        self.info.announce(&text, false, now);

        self.renderer.start(analyser, &mut self.frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::AnalysisNode;
    use crate::render::canvas::{PixelCanvas, Rgba};
    use crate::render::spectrum::tests::ScriptedAnalyser;
    use crate::render::spectrum::MeterLayout;
    use crate::status::ELLIPSIS_INTERVAL;
    use std::cell::RefCell;
    use std::rc::Rc;

    const IDLE: &str = "spectra | drop an audio file";

    type Log = Rc<RefCell<Vec<String>>>;

    struct FakeSource {
        id: SessionId,
        log: Log,
        level: u8,
    }

    impl PlaybackSource for FakeSource {
        fn start(&mut self, offset: Duration) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("start {} @{}", self.id.0, offset.as_secs()));
            Ok(())
        }

        fn stop(&mut self) {
            self.log.borrow_mut().push(format!("stop {}", self.id.0));
        }

        fn analyser(&self) -> Box<dyn AnalysisNode> {
            Box::new(ScriptedAnalyser::new(1024, vec![vec![self.level; 1024]; 2]))
        }
    }

    struct FakeBackend {
        log: Log,
        level: u8,
    }

    impl AudioBackend for FakeBackend {
        fn create_source(&mut self, session: SessionId, _: Arc<DecodedAudio>) -> Result<Box<dyn PlaybackSource>> {
            let level = self.level;
            self.level = self.level.saturating_sub(100);
            Ok(Box::new(FakeSource {
                id: session,
                log: self.log.clone(),
                level,
            }))
        }
    }

    struct FakeIngest {
        log: Log,
    }

    impl IngestTasks for FakeIngest {
        fn read(&mut self, ticket: Ticket, file: &AudioFile) {
            self.log.borrow_mut().push(format!("read {} {:?}", file.name, ticket));
        }

        fn decode(&mut self, ticket: Ticket, name: &str, bytes: Vec<u8>) {
            self.log
                .borrow_mut()
                .push(format!("decode {} {:?} {}", name, ticket, bytes.len()));
        }
    }

    fn audio() -> DecodedAudio {
        DecodedAudio {
            samples: vec![0.0; 4410],
            channels: 1,
            sample_rate: 44_100,
        }
    }

    fn controller(log: &Log, available: bool) -> PlaybackController {
        let backend: Result<Box<dyn AudioBackend>> = if available {
            Ok(Box::new(FakeBackend {
                log: log.clone(),
                level: 200,
            }))
        } else {
            Err(Error::CapabilityUnavailable("no output device".into()))
        };
        PlaybackController::new(
            backend,
            Box::new(FakeIngest { log: log.clone() }),
            SpectrumRenderer::new(MeterLayout::default()),
            InfoAnnouncer::new(IDLE, ELLIPSIS_INTERVAL),
            IDLE,
            Instant::now(),
        )
    }

    /// Submit, read and decode `name`, returning its ticket.
    fn play(ctl: &mut PlaybackController, name: &str) -> Ticket {
        let now = Instant::now();
        assert!(ctl.submit_file(AudioFile::from_path(name), now));
        let ticket = ctl.ingest.as_ref().unwrap().ticket;
        ctl.on_read(ticket, Ok(vec![1, 2, 3]), now);
        ctl.on_decoded(ticket, Ok(audio()), now);
        ticket
    }

    #[test]
    fn decoded_file_starts_playing() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        let now = Instant::now();

        ctl.submit_file(AudioFile::from_path("/tmp/a.mp3"), now);
        assert_eq!(ctl.phase(), Phase::Uploading);
        assert_eq!(ctl.status(), "Reading the file");

        let ticket = ctl.ingest.as_ref().unwrap().ticket;
        ctl.on_read(ticket, Ok(vec![0; 16]), now);
        assert_eq!(ctl.phase(), Phase::Decoding);
        assert_eq!(ctl.status(), "Decoding the audio");

        ctl.on_decoded(ticket, Ok(audio()), now);
        assert_eq!(ctl.phase(), Phase::Playing);
        assert_eq!(ctl.status(), "Playing a.mp3");
        assert!(ctl.is_playing());

        let mut canvas = PixelCanvas::new(800, 350, Rgba::BLACK);
        assert!(ctl.refresh(&mut canvas));
        assert_eq!(
            *log.borrow(),
            vec![
                format!("read a.mp3 {:?}", ticket),
                format!("decode a.mp3 {:?} 16", ticket),
                "start 1 @0".to_string(),
            ]
        );
    }

    #[test]
    fn replacing_stops_old_source_before_starting_new() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        let mut canvas = PixelCanvas::new(800, 350, Rgba::BLACK);

        play(&mut ctl, "a.mp3");
        ctl.refresh(&mut canvas);
        assert_eq!(ctl.renderer.caps().heights()[0], 200);

        let now = Instant::now();
        ctl.submit_file(AudioFile::from_path("b.mp3"), now);
        assert!(ctl.session().unwrap().force_stop);
        let cancelled_before = ctl.frames.cancelled();

        let ticket = ctl.ingest.as_ref().unwrap().ticket;
        ctl.on_read(ticket, Ok(vec![9]), now);
        ctl.on_decoded(ticket, Ok(audio()), now);

        let entries: Vec<String> = log
            .borrow()
            .iter()
            .filter(|e| e.starts_with("st"))
            .cloned()
            .collect();
        assert_eq!(entries, vec!["start 1 @0", "stop 1", "start 2 @0"]);
        assert_eq!(ctl.frames.cancelled(), cancelled_before + 1);
        assert_eq!(ctl.frames.pending(), 1);
        assert_eq!(ctl.status(), "Playing b.mp3");

        // Fresh caps, seeded from b's own first frame.
        assert!(ctl.renderer.caps().heights().is_empty());
        ctl.refresh(&mut canvas);
        assert_eq!(ctl.renderer.caps().heights()[0], 100);
    }

    #[test]
    fn stale_end_of_replaced_session_keeps_playing() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        play(&mut ctl, "a.mp3");
        play(&mut ctl, "b.mp3");

        ctl.on_ended(SessionId(1), Instant::now());
        assert!(ctl.is_playing());
        assert_eq!(ctl.phase(), Phase::Playing);
        assert_eq!(ctl.status(), "Playing b.mp3");
        assert!(ctl.selected_file().is_some());
    }

    #[test]
    fn natural_end_resets_and_bars_settle() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        let mut canvas = PixelCanvas::new(800, 350, Rgba::BLACK);
        play(&mut ctl, "a.mp3");
        ctl.refresh(&mut canvas);

        ctl.on_ended(SessionId(1), Instant::now());
        assert!(!ctl.is_playing());
        assert_eq!(ctl.phase(), Phase::Ended);
        assert_eq!(ctl.status(), IDLE);
        assert!(ctl.selected_file().is_none());
        assert!(!ctl.is_settled());

        let mut frames = 0;
        while ctl.frames.pending() > 0 {
            ctl.refresh(&mut canvas);
            frames += 1;
            assert!(frames <= 300, "caps never settled");
        }
        // 200 frames of decay down to zero, then one frame that stops the loop.
        assert_eq!(frames, 201);
        assert!(ctl.is_settled());
        assert!(ctl.renderer.caps().all_down());
        assert!(!ctl.refresh(&mut canvas));
    }

    #[test]
    fn end_while_replacement_loads_keeps_loading_status() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        play(&mut ctl, "a.mp3");

        let now = Instant::now();
        ctl.submit_file(AudioFile::from_path("b.mp3"), now);
        ctl.on_ended(SessionId(1), now);

        assert!(!ctl.is_playing());
        assert!(!ctl.session().unwrap().force_stop);
        assert_eq!(ctl.status(), "Reading the file");
        assert_eq!(ctl.phase(), Phase::Uploading);
    }

    #[test]
    fn missing_capability_rejects_without_reading() {
        let log = Log::default();
        let mut ctl = controller(&log, false);
        assert!(ctl.status().starts_with('!'));
        assert!(!ctl.is_available());

        assert!(!ctl.submit_file(AudioFile::from_path("a.mp3"), Instant::now()));
        assert!(log.borrow().is_empty());
        assert_eq!(ctl.phase(), Phase::Idle);
        assert!(ctl.is_settled());
    }

    #[test]
    fn decode_failure_keeps_current_session() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        play(&mut ctl, "a.mp3");

        let now = Instant::now();
        ctl.submit_file(AudioFile::from_path("b.mp3"), now);
        let ticket = ctl.ingest.as_ref().unwrap().ticket;
        ctl.on_read(ticket, Ok(vec![1]), now);
        ctl.on_decoded(
            ticket,
            Err(Error::Decode {
                name: "b.mp3".into(),
                reason: "bad header".into(),
            }),
            now,
        );

        assert_eq!(ctl.status(), "!Failed to decode the file");
        assert!(ctl.is_playing());
        assert!(!ctl.session().unwrap().force_stop);
        assert_eq!(ctl.session().unwrap().file_name, "a.mp3");

        // a finishing on its own is now a normal end.
        ctl.on_ended(SessionId(1), now);
        assert!(!ctl.is_playing());
        assert_eq!(ctl.status(), IDLE);
    }

    #[test]
    fn read_failure_is_reported() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        let now = Instant::now();
        ctl.submit_file(AudioFile::from_path("a.mp3"), now);
        let ticket = ctl.ingest.as_ref().unwrap().ticket;
        ctl.on_read(
            ticket,
            Err(Error::Read {
                name: "a.mp3".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            }),
            now,
        );

        assert_eq!(ctl.status(), "!Failed to read the file");
        assert_eq!(ctl.phase(), Phase::Idle);
        assert!(log.borrow().iter().all(|e| !e.starts_with("decode")));
    }

    #[test]
    fn results_for_superseded_ingest_are_dropped() {
        let log = Log::default();
        let mut ctl = controller(&log, true);
        let now = Instant::now();

        ctl.submit_file(AudioFile::from_path("a.mp3"), now);
        let first = ctl.ingest.as_ref().unwrap().ticket;
        ctl.submit_file(AudioFile::from_path("b.mp3"), now);
        let second = ctl.ingest.as_ref().unwrap().ticket;

        ctl.on_read(first, Ok(vec![1]), now);
        assert_eq!(ctl.phase(), Phase::Uploading);
        ctl.on_read(second, Ok(vec![1]), now);
        ctl.on_decoded(first, Ok(audio()), now);
        assert!(ctl.session().is_none());

        ctl.on_decoded(second, Ok(audio()), now);
        assert_eq!(ctl.session().unwrap().file_name, "b.mp3");
    }
}
