mod app;
mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod event;
mod ingest;
mod playback;
mod render;
mod schedule;
mod status;

use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use app::Visualizer;
use audio::decode::SymphoniaDecoder;
use audio::output::{AudioBackend, CpalBackend, SilentBackend};
use cli::Cli;
use encode::ffmpeg::FfmpegPipe;
use ingest::{AudioFile, ThreadedIngest};
use playback::PlaybackController;
use render::canvas::{PixelCanvas, Rgba};
use render::spectrum::{MeterLayout, SpectrumRenderer};
use status::{InfoAnnouncer, ELLIPSIS_INTERVAL};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect spectra.toml / user config
    let config_path = cli.config.clone().or_else(config::find_config);
    let cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };

    // Merge: config values apply only when CLI is at its default
    if cli.width == 800 { cli.width = cfg.display.width; }
    if cli.height == 350 { cli.height = cfg.display.height; }
    if cli.fps == 60 { cli.fps = cfg.display.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == "yuv420p" { cli.pix_fmt = cfg.output.pix_fmt.clone(); }

    if cli.files.is_empty() && !cli.stdin {
        anyhow::bail!("No input: pass audio files or use --stdin to drop paths");
    }
    if cli.width == 0 || cli.height < 3 {
        anyhow::bail!("Canvas {}x{} is too small", cli.width, cli.height);
    }

    log::info!("spectra - real-time audio spectrum visualizer");
    log::info!("Canvas: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    let (events_tx, events_rx) = mpsc::channel();
    let analyser = cfg.analyser.settings();

    // 1. Audio output capability
    let backend: error::Result<Box<dyn AudioBackend>> = if cli.silent {
        log::info!("Silent mode: playback follows the wall clock");
        Ok(Box::new(SilentBackend::new(events_tx.clone(), analyser)))
    } else {
        CpalBackend::new(events_tx.clone(), analyser).map(|b| Box::new(b) as Box<dyn AudioBackend>)
    };

    // 2. Playback controller and renderer
    let layout = MeterLayout {
        bar_width: cfg.display.bar_width,
        bar_gap: cfg.display.bar_gap,
        cap_height: cfg.display.cap_height,
        ..MeterLayout::default()
    };
    log::info!("Meter: {} bars, pitch {}px", layout.bar_count(), layout.pitch());

    let ingest = ThreadedIngest::new(events_tx.clone(), Arc::new(SymphoniaDecoder));
    let idle_text = cfg.status.idle_text.as_str();
    let controller = PlaybackController::new(
        backend,
        Box::new(ingest),
        SpectrumRenderer::new(layout),
        InfoAnnouncer::new(idle_text, ELLIPSIS_INTERVAL),
        idle_text,
        Instant::now(),
    );

    // 3. Status line
    let status_line = ProgressBar::new_spinner();
    status_line.set_style(ProgressStyle::with_template("{msg}")?);

    let canvas = PixelCanvas::new(cli.width, cli.height, Rgba::BLACK);
    let mut visualizer = Visualizer::new(
        controller,
        canvas,
        Box::new(status_line.clone()),
        events_rx,
        cli.fps,
    );

    // 4. Frame sinks
    if let Some(ref output) = cli.output {
        log::info!("Recording to {}", output.display());
        visualizer.add_sink(Box::new(FfmpegPipe::encoder(
            output,
            cli.width,
            cli.height,
            cli.fps,
            &cli.codec,
            &cli.pix_fmt,
            cli.crf,
        )?));
    }
    if cli.preview {
        visualizer.add_sink(Box::new(FfmpegPipe::preview(cli.width, cli.height, cli.fps)?));
    }

    // 5. Inputs
    visualizer.enqueue(cli.files.iter().map(AudioFile::from_path));
    if let Some(secs) = cli.replace_after {
        visualizer.replace_after(Some(Duration::from_secs_f32(secs.max(0.0))));
    }
    if cli.stdin {
        ingest::watch_stdin(events_tx.clone());
        visualizer.watch_input();
    }
    drop(events_tx);

    // 6. Event loop
    visualizer.run()?;

    status_line.finish();
    log::info!("Done");
    Ok(())
}
