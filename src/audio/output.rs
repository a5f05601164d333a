// Audio output.
// Every source reports its end exactly once through the event channel,
// whether it ran out of samples or was stopped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};

use super::analysis::{AnalyserSettings, AnalysisNode, SpectrumAnalyser};
use super::decode::DecodedAudio;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::playback::SessionId;

const CLOCK_TICK: Duration = Duration::from_millis(5);

/// Position of a source in source frames, shared with its analyser.
#[derive(Debug, Default)]
pub struct Playhead {
    frames: AtomicU64,
}

impl Playhead {
    pub fn position(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn set_position(&self, frames: u64) {
        self.frames.store(frames, Ordering::Relaxed);
    }
}

/// A decoded buffer wired to an output.
pub trait PlaybackSource {
    fn start(&mut self, offset: Duration) -> Result<()>;
    fn stop(&mut self);
    fn analyser(&self) -> Box<dyn AnalysisNode>;
}

/// Creates playable sources. Ends are reported as `Event::Ended`.
pub trait AudioBackend {
    fn create_source(&mut self, session: SessionId, audio: Arc<DecodedAudio>) -> Result<Box<dyn PlaybackSource>>;
}

struct SourceState {
    session: SessionId,
    playhead: Arc<Playhead>,
    started: AtomicBool,
    stopped: AtomicBool,
    ended: AtomicBool,
    events: Sender<Event>,
}

impl SourceState {
    fn new(session: SessionId, events: Sender<Event>) -> Arc<Self> {
        Arc::new(Self {
            session,
            playhead: Arc::new(Playhead::default()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            events,
        })
    }

    fn notify_ended(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(Event::Ended(self.session));
        }
    }
}

enum Driver {
    Device(Stream),
    Clock {
        stop_tx: Option<Sender<()>>,
        thread: Option<JoinHandle<()>>,
    },
}

pub struct BufferSource {
    audio: Arc<DecodedAudio>,
    state: Arc<SourceState>,
    driver: Driver,
    analyser: AnalyserSettings,
}

impl PlaybackSource for BufferSource {
    fn start(&mut self, offset: Duration) -> Result<()> {
        let offset_frames = (offset.as_secs_f64() * self.audio.sample_rate as f64) as u64;
        self.state.playhead.set_position(offset_frames);
        self.state.started.store(true, Ordering::SeqCst);

        match &mut self.driver {
            Driver::Device(stream) => {
                stream.play().map_err(|e| Error::Playback(e.to_string()))?;
            }
            Driver::Clock { stop_tx, thread } => {
                let (tx, rx) = mpsc::channel::<()>();
                let state = self.state.clone();
                let total = self.audio.frames() as u64;
                let rate = self.audio.sample_rate as f64;
                let started_at = Instant::now();

                *thread = Some(std::thread::spawn(move || loop {
                    match rx.recv_timeout(CLOCK_TICK) {
                        Err(RecvTimeoutError::Timeout) => {
                            let elapsed = (started_at.elapsed().as_secs_f64() * rate) as u64;
                            let position = (offset_frames + elapsed).min(total);
                            state.playhead.set_position(position);
                            if position >= total {
                                state.notify_ended();
                                return;
                            }
                        }
                        _ => return,
                    }
                }));
                *stop_tx = Some(tx);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        match &mut self.driver {
            Driver::Device(stream) => {
                if let Err(err) = stream.pause() {
                    log::debug!("pausing output stream failed: {}", err);
                }
            }
            Driver::Clock { stop_tx, thread } => {
                if let Some(tx) = stop_tx.take() {
                    let _ = tx.send(());
                }
                if let Some(handle) = thread.take() {
                    let _ = handle.join();
                }
            }
        }
        self.state.notify_ended();
    }

    fn analyser(&self) -> Box<dyn AnalysisNode> {
        Box::new(SpectrumAnalyser::new(
            self.audio.clone(),
            self.state.playhead.clone(),
            self.analyser,
        ))
    }
}

impl Drop for BufferSource {
    fn drop(&mut self) {
        if let Driver::Clock { stop_tx, thread } = &mut self.driver {
            if let Some(tx) = stop_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = thread.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Plays through the default cpal output device.
pub struct CpalBackend {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    events: Sender<Event>,
    analyser: AnalyserSettings,
}

impl CpalBackend {
    pub fn new(events: Sender<Event>, analyser: AnalyserSettings) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::CapabilityUnavailable("no output device".into()))?;

        let config = device
            .default_output_config()
            .map_err(|e| Error::CapabilityUnavailable(e.to_string()))?;

        log::info!(
            "Audio output: {} ({} ch, {}Hz, {:?})",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config.channels(),
            config.sample_rate().0,
            config.sample_format()
        );

        Ok(Self {
            device,
            config,
            events,
            analyser,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        &self,
        config: &StreamConfig,
        audio: Arc<DecodedAudio>,
        state: Arc<SourceState>,
    ) -> Result<Stream> {
        let out_channels = config.channels as usize;
        let step = audio.sample_rate as f64 / config.sample_rate.0 as f64;
        let total = audio.frames();
        let mut cursor: Option<f64> = None;

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !state.started.load(Ordering::SeqCst) || state.stopped.load(Ordering::SeqCst) {
                        data.fill(T::from_sample(0.0f32));
                        return;
                    }

                    let pos = cursor.get_or_insert_with(|| state.playhead.position() as f64);
                    for frame in data.chunks_mut(out_channels) {
                        let index = *pos as usize;
                        if index >= total {
                            frame.fill(T::from_sample(0.0f32));
                            continue;
                        }
                        for (channel, sample) in frame.iter_mut().enumerate() {
                            *sample = T::from_sample(audio.sample(index, channel));
                        }
                        *pos += step;
                    }

                    let position = (*pos as usize).min(total);
                    state.playhead.set_position(position as u64);
                    if position >= total {
                        state.notify_ended();
                    }
                },
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))
    }
}

impl AudioBackend for CpalBackend {
    fn create_source(&mut self, session: SessionId, audio: Arc<DecodedAudio>) -> Result<Box<dyn PlaybackSource>> {
        let state = SourceState::new(session, self.events.clone());
        let config: StreamConfig = self.config.config();

        let stream = match self.config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(&config, audio.clone(), state.clone())?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(&config, audio.clone(), state.clone())?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(&config, audio.clone(), state.clone())?,
            format => return Err(Error::Playback(format!("unsupported sample format: {format:?}"))),
        };

        Ok(Box::new(BufferSource {
            audio,
            state,
            driver: Driver::Device(stream),
            analyser: self.analyser,
        }))
    }
}

/// Advances sources on the wall clock without producing sound.
pub struct SilentBackend {
    events: Sender<Event>,
    analyser: AnalyserSettings,
}

impl SilentBackend {
    pub fn new(events: Sender<Event>, analyser: AnalyserSettings) -> Self {
        Self { events, analyser }
    }
}

impl AudioBackend for SilentBackend {
    fn create_source(&mut self, session: SessionId, audio: Arc<DecodedAudio>) -> Result<Box<dyn PlaybackSource>> {
        Ok(Box::new(BufferSource {
            audio,
            state: SourceState::new(session, self.events.clone()),
            driver: Driver::Clock {
                stop_tx: None,
                thread: None,
            },
            analyser: self.analyser,
        }))
    }
}
