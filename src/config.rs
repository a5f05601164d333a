use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analysis::AnalyserSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bar_width")]
    pub bar_width: u32,
    #[serde(default = "default_bar_gap")]
    pub bar_gap: u32,
    #[serde(default = "default_cap_height")]
    pub cap_height: u32,
}

#[derive(Debug, Deserialize)]
pub struct AnalyserConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
}

#[derive(Debug, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_idle_text")]
    pub idle_text: String,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            bar_width: default_bar_width(),
            bar_gap: default_bar_gap(),
            cap_height: default_cap_height(),
        }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            idle_text: default_idle_text(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
        }
    }
}

impl AnalyserConfig {
    pub fn settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_db: self.min_db,
            max_db: self.max_db,
        }
    }
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 350 }
fn default_fps() -> u32 { 60 }
fn default_bar_width() -> u32 { 10 }
fn default_bar_gap() -> u32 { 2 }
fn default_cap_height() -> u32 { 2 }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.8 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }
fn default_idle_text() -> String { "spectra | drop an audio file to visualize it".into() }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// `./spectra.toml`, then the XDG-style and platform config directories.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("spectra.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("spectra").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("spectra").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.display.width, 800);
        assert_eq!(config.display.fps, 60);
        assert_eq!(config.analyser.fft_size, 2048);
        assert_eq!(config.output.codec, "libx264");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [display]
            height = 400
            bar_gap = 4

            [analyser]
            smoothing = 0.5

            [status]
            idle_text = "drop here"
            "#,
        )
        .unwrap();
        assert_eq!(config.display.height, 400);
        assert_eq!(config.display.bar_gap, 4);
        assert_eq!(config.display.bar_width, 10);
        assert_eq!(config.analyser.settings().smoothing, 0.5);
        assert_eq!(config.analyser.settings().max_db, -30.0);
        assert_eq!(config.status.idle_text, "drop here");
    }

    #[test]
    fn unreadable_config_is_none() {
        assert!(load_config(Path::new("/no/such/spectra.toml")).is_none());
    }
}
