use crate::audio::analysis::AnalysisNode;
use crate::schedule::{FrameHandle, FrameScheduler};

use super::canvas::{Canvas, FillStyle, LinearGradient, Rgba};

/// Meter geometry. The defaults reproduce the classic 800px, 66-bar display.
#[derive(Debug, Clone, Copy)]
pub struct MeterLayout {
    /// Width the bars are spread over, independent of the canvas width.
    pub total_width: u32,
    pub bar_width: u32,
    pub bar_gap: u32,
    pub cap_height: u32,
    /// Height of the gradient from red (top) to green.
    pub gradient_height: u32,
}

impl Default for MeterLayout {
    fn default() -> Self {
        Self {
            total_width: 800,
            bar_width: 10,
            bar_gap: 2,
            cap_height: 2,
            gradient_height: 300,
        }
    }
}

impl MeterLayout {
    pub fn pitch(&self) -> u32 {
        (self.bar_width + self.bar_gap).max(1)
    }

    pub fn bar_count(&self) -> usize {
        (self.total_width / self.pitch()) as usize
    }

    /// Stride between sampled bins when squeezing `sample_count` bins into
    /// the bars.
    pub fn step(&self, sample_count: usize) -> usize {
        let bars = self.bar_count();
        if bars == 0 {
            return 0;
        }
        (sample_count as f64 / bars as f64).round() as usize
    }

    fn gradient(&self) -> LinearGradient {
        let mut gradient = LinearGradient::new(0.0, 0.0, 0.0, self.gradient_height as f32);
        gradient.add_color_stop(1.0, Rgba::GREEN);
        gradient.add_color_stop(0.5, Rgba::YELLOW);
        gradient.add_color_stop(0.0, Rgba::RED);
        gradient
    }
}

/// Peak markers, one per bar.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapState {
    caps: Vec<u8>,
}

impl CapState {
    #[allow(dead_code)]
    pub fn heights(&self) -> &[u8] {
        &self.caps
    }

    pub fn all_down(&self) -> bool {
        self.caps.iter().all(|&c| c == 0)
    }

    /// Feed one bar's magnitude and return the height the cap is drawn at.
    /// A bar seen for the first time seeds its cap with the magnitude.
    pub fn update(&mut self, bar: usize, value: u8) -> u8 {
        if bar >= self.caps.len() {
            self.caps.resize(bar + 1, value);
        }
        let cap = &mut self.caps[bar];
        if value < *cap {
            *cap -= 1;
        } else {
            *cap = value;
        }
        *cap
    }

    fn clear(&mut self) {
        self.caps.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was painted and the next one requested.
    Drawn,
    /// Playback is over and every cap reached the floor; the loop stopped.
    Settled,
    /// The handle is not the renderer's current frame.
    Stale,
}

/// Frame-synchronous bar-and-cap painter.
pub struct SpectrumRenderer {
    layout: MeterLayout,
    gradient: LinearGradient,
    cap_style: Rgba,
    analyser: Option<Box<dyn AnalysisNode>>,
    caps: CapState,
    magnitudes: Vec<u8>,
    handle: Option<FrameHandle>,
}

impl SpectrumRenderer {
    pub fn new(layout: MeterLayout) -> Self {
        Self {
            gradient: layout.gradient(),
            layout,
            cap_style: Rgba::WHITE,
            analyser: None,
            caps: CapState::default(),
            magnitudes: Vec::new(),
            handle: None,
        }
    }

    /// Begin painting from `analyser`. Any running loop is cancelled first and
    /// the caps start over.
    pub fn start(&mut self, analyser: Box<dyn AnalysisNode>, frames: &mut dyn FrameScheduler) {
        self.cancel(frames);
        self.magnitudes = vec![0; analyser.frequency_bin_count()];
        self.analyser = Some(analyser);
        self.caps.clear();
        self.handle = Some(frames.request_frame());
    }

    /// Revoke the pending frame, if any.
    pub fn cancel(&mut self, frames: &mut dyn FrameScheduler) {
        if let Some(handle) = self.handle.take() {
            frames.cancel_frame(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    #[allow(dead_code)]
    pub fn caps(&self) -> &CapState {
        &self.caps
    }

    pub fn draw_frame(
        &mut self,
        handle: FrameHandle,
        playing: bool,
        canvas: &mut dyn Canvas,
        frames: &mut dyn FrameScheduler,
    ) -> FrameOutcome {
        if self.handle != Some(handle) {
            return FrameOutcome::Stale;
        }
        let Some(analyser) = self.analyser.as_mut() else {
            self.handle = None;
            return FrameOutcome::Stale;
        };

        analyser.byte_frequency_data(&mut self.magnitudes);

        if !playing {
            // Sources can leave non-zero bins behind once they stop.
            self.magnitudes.fill(0);
            if self.caps.all_down() {
                self.cancel(frames);
                self.analyser = None;
                log::debug!("spectrum settled");
                return FrameOutcome::Settled;
            }
        }

        let floor = canvas.height() as i32 - 2;
        let cap_height = self.layout.cap_height as i32;
        let bar_width = self.layout.bar_width as i32;
        let pitch = self.layout.pitch() as i32;
        let step = self.layout.step(self.magnitudes.len());

        canvas.clear_rect(0, 0, canvas.width() as i32, floor);

        for bar in 0..self.layout.bar_count() {
            let value = self.magnitudes.get(bar * step).copied().unwrap_or(0);
            let x = bar as i32 * pitch;

            let cap = self.caps.update(bar, value);
            canvas.set_fill_style(FillStyle::Solid(self.cap_style));
            canvas.fill_rect(x, floor - cap as i32, bar_width, cap_height);

            canvas.set_fill_style(FillStyle::Gradient(self.gradient.clone()));
            canvas.fill_rect(x, floor - value as i32 + cap_height, bar_width, floor);
        }

        self.handle = Some(frames.request_frame());
        FrameOutcome::Drawn
    }
}
