use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::encode::ffmpeg::FrameSink;
use crate::event::Event;
use crate::ingest::AudioFile;
use crate::playback::{Phase, PlaybackController};
use crate::render::canvas::PixelCanvas;
use crate::status::StatusDisplay;

/// Single-threaded driver: events, status timers and refresh ticks all run
/// here, one at a time.
pub struct Visualizer {
    controller: PlaybackController,
    canvas: PixelCanvas,
    sinks: Vec<Box<dyn FrameSink>>,
    status: Box<dyn StatusDisplay>,
    events: Receiver<Event>,
    queue: VecDeque<AudioFile>,
    replace_after: Option<Duration>,
    frame_interval: Duration,
    input_open: bool,
    submitted_at: Option<Instant>,
    shown_status: String,
    phase: Phase,
}

impl Visualizer {
    pub fn new(
        controller: PlaybackController,
        canvas: PixelCanvas,
        status: Box<dyn StatusDisplay>,
        events: Receiver<Event>,
        fps: u32,
    ) -> Self {
        Self {
            controller,
            canvas,
            sinks: Vec::new(),
            status,
            events,
            queue: VecDeque::new(),
            replace_after: None,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            input_open: false,
            submitted_at: None,
            shown_status: String::new(),
            phase: Phase::Idle,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sinks.push(sink);
    }

    /// Files submitted one after another.
    pub fn enqueue(&mut self, files: impl IntoIterator<Item = AudioFile>) {
        self.queue.extend(files);
    }

    /// Cut each file short after `after` when another one is queued.
    pub fn replace_after(&mut self, after: Option<Duration>) {
        self.replace_after = after;
    }

    /// Keep running until `Event::InputClosed` arrives.
    pub fn watch_input(&mut self) {
        self.input_open = true;
    }

    pub fn run(mut self) -> Result<()> {
        let mut next_frame = Instant::now();
        self.show_status();

        loop {
            self.advance_queue(Instant::now());
            if self.is_done() {
                break;
            }

            let mut wake = next_frame;
            if let Some(deadline) = self.controller.status_deadline() {
                wake = wake.min(deadline);
            }

            match self.events.recv_timeout(wake.saturating_duration_since(Instant::now())) {
                Ok(event) => self.handle(event, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.input_open = false,
            }

            let now = Instant::now();
            self.controller.tick_status(now);

            if now >= next_frame {
                self.controller.refresh(&mut self.canvas);
                for sink in &mut self.sinks {
                    sink.present(self.canvas.pixels())?;
                }
                next_frame += self.frame_interval;
                if next_frame < now {
                    log::debug!("refresh fell behind, skipping frames");
                    next_frame = now + self.frame_interval;
                }
            }

            self.show_status();
            self.track_phase();
        }

        self.controller.stop();
        for sink in self.sinks {
            sink.finish()?;
        }
        Ok(())
    }

    fn handle(&mut self, event: Event, now: Instant) {
        match event {
            Event::FileSelected(file) => self.submit(file, now),
            Event::FileRead { ticket, result } => self.controller.on_read(ticket, result, now),
            Event::Decoded { ticket, result } => {
                self.controller.on_decoded(ticket, result, now);
                if let Some(session) = self.controller.session().filter(|s| s.live) {
                    log::info!(
                        "Session {:?}: {} ({:.1}s, {} ch, {}Hz)",
                        session.id,
                        session.file_name,
                        session.audio.duration_secs(),
                        session.audio.channels,
                        session.audio.sample_rate
                    );
                }
            }
            Event::Ended(id) => self.controller.on_ended(id, now),
            Event::InputClosed => {
                log::debug!("input closed");
                self.input_open = false;
            }
        }
    }

    fn submit(&mut self, file: AudioFile, now: Instant) {
        if self.controller.submit_file(file, now) {
            self.submitted_at = Some(now);
        }
    }

    fn advance_queue(&mut self, now: Instant) {
        if !self.controller.is_available() {
            // Every file is rejected; drain so the loop can finish.
            while let Some(file) = self.queue.pop_front() {
                self.submit(file, now);
            }
            return;
        }
        if self.queue.is_empty() {
            return;
        }

        let replace = match (self.replace_after, self.submitted_at) {
            (Some(limit), Some(at)) => self.controller.is_playing() && now.duration_since(at) >= limit,
            _ => false,
        };

        if self.controller.is_settled() || replace {
            if let Some(file) = self.queue.pop_front() {
                self.submit(file, now);
            }
        }
    }

    fn is_done(&self) -> bool {
        self.queue.is_empty() && !self.input_open && self.controller.is_settled()
    }

    fn track_phase(&mut self) {
        let phase = self.controller.phase();
        if phase != self.phase {
            log::info!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn show_status(&mut self) {
        let line = self.controller.status();
        if line != self.shown_status {
            self.status.show(&line);
            self.shown_status = line;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::AnalyserSettings;
    use crate::audio::decode::{tests::wav_bytes, SymphoniaDecoder};
    use crate::audio::output::{AudioBackend, SilentBackend};
    use crate::error::Error;
    use crate::ingest::ThreadedIngest;
    use crate::render::canvas::Rgba;
    use crate::render::spectrum::{MeterLayout, SpectrumRenderer};
    use crate::status::{InfoAnnouncer, ELLIPSIS_INTERVAL};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{mpsc, Arc};

    #[derive(Clone, Default)]
    struct Lines(Rc<RefCell<Vec<String>>>);

    impl StatusDisplay for Lines {
        fn show(&mut self, line: &str) {
            self.0.borrow_mut().push(line.to_string());
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink(Rc<RefCell<usize>>);

    impl FrameSink for CountingSink {
        fn present(&mut self, rgba_pixels: &[u8]) -> Result<()> {
            assert_eq!(rgba_pixels.len(), 200 * 100 * 4);
            *self.0.borrow_mut() += 1;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn visualizer(available: bool, lines: &Lines) -> (Visualizer, mpsc::Sender<Event>) {
        let (tx, rx) = mpsc::channel();
        let backend: crate::error::Result<Box<dyn AudioBackend>> = if available {
            Ok(Box::new(SilentBackend::new(tx.clone(), AnalyserSettings::default())))
        } else {
            Err(Error::CapabilityUnavailable("test".into()))
        };
        let controller = PlaybackController::new(
            backend,
            Box::new(ThreadedIngest::new(tx.clone(), Arc::new(SymphoniaDecoder))),
            SpectrumRenderer::new(MeterLayout::default()),
            InfoAnnouncer::new("idle", ELLIPSIS_INTERVAL),
            "idle",
            Instant::now(),
        );
        let canvas = PixelCanvas::new(200, 100, Rgba::BLACK);
        let app = Visualizer::new(controller, canvas, Box::new(lines.clone()), rx, 200);
        (app, tx)
    }

    #[test]
    fn plays_a_file_to_the_end_and_exits() {
        let dir = std::env::temp_dir().join(format!("spectra-app-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.wav");
        std::fs::write(&path, wav_bytes(1, 8000, 1600)).unwrap();

        let lines = Lines::default();
        let (mut app, _tx) = visualizer(true, &lines);
        let frames = CountingSink::default();
        app.add_sink(Box::new(frames.clone()));
        app.enqueue([AudioFile::from_path(&path)]);
        app.run().unwrap();

        let shown = lines.0.borrow();
        assert!(shown.iter().any(|l| l == "Playing a.wav"), "{shown:?}");
        assert_eq!(shown.last().map(String::as_str), Some("idle"));
        assert!(*frames.0.borrow() > 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_output_rejects_and_finishes() {
        let lines = Lines::default();
        let (mut app, _tx) = visualizer(false, &lines);
        app.enqueue([AudioFile::from_path("/nowhere/a.mp3")]);
        app.run().unwrap();

        let shown = lines.0.borrow();
        assert_eq!(shown.as_slice(), ["!No audio output available"]);
    }

    #[test]
    fn unreadable_file_reports_and_finishes() {
        let lines = Lines::default();
        let (mut app, _tx) = visualizer(true, &lines);
        app.enqueue([AudioFile::from_path("/nowhere/a.mp3")]);
        app.run().unwrap();

        let shown = lines.0.borrow();
        assert_eq!(shown.last().map(String::as_str), Some("!Failed to read the file"));
    }
}
