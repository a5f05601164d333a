use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::decode::DecodedAudio;
use super::output::Playhead;

/// Current frequency magnitudes of a playing source, scaled to 0-255.
pub trait AnalysisNode {
    fn frequency_bin_count(&self) -> usize;

    /// Fill `out` with the magnitude of each bin. Only the first
    /// `min(out.len(), frequency_bin_count())` entries are written.
    fn byte_frequency_data(&mut self, out: &mut [u8]);
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Blend factor with the previous block, 0.0 (none) to just under 1.0.
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// FFT analyser over the samples most recently played by a source.
pub struct SpectrumAnalyser {
    audio: Arc<DecodedAudio>,
    playhead: Arc<Playhead>,
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(audio: Arc<DecodedAudio>, playhead: Arc<Playhead>, settings: AnalyserSettings) -> Self {
        let size = settings.fft_size.max(32).next_power_of_two();
        let settings = AnalyserSettings {
            fft_size: size,
            smoothing: settings.smoothing.clamp(0.0, 0.999),
            ..settings
        };

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            audio,
            playhead,
            settings,
            fft,
            window: blackman_window(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; size / 2],
        }
    }

    fn analyse_block(&mut self) {
        let size = self.settings.fft_size;
        let end = self.playhead.position() as usize;
        let start = end.saturating_sub(size);
        let pad = size - (end - start);

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad {
                0.0
            } else {
                self.audio.mono(start + i - pad)
            };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let tau = self.settings.smoothing;
        let norm = 1.0 / size as f32;
        for (prev, bin) in self.smoothed.iter_mut().zip(&self.buffer) {
            let magnitude = bin.norm() * norm;
            let value = tau * *prev + (1.0 - tau) * magnitude;
            *prev = if value.is_finite() { value } else { 0.0 };
        }
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let AnalyserSettings { min_db, max_db, .. } = self.settings;
        let db = 20.0 * magnitude.log10();
        let scaled = (255.0 / (max_db - min_db) * (db - min_db)).floor();
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl AnalysisNode for SpectrumAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyse_block();
        for (byte, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *byte = self.to_byte(magnitude);
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
