use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spectra", about = "Real-time audio spectrum visualizer")]
pub struct Cli {
    /// Audio files to play, in order (WAV, MP3, FLAC, OGG, AAC)
    pub files: Vec<PathBuf>,

    /// Record the visualization to a video file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show the visualization in an ffplay window
    #[arg(long)]
    pub preview: bool,

    /// Treat each line on stdin as a dropped file path
    #[arg(long)]
    pub stdin: bool,

    /// Replace the playing file with the next one after this many seconds
    #[arg(long)]
    pub replace_after: Option<f32>,

    /// Advance playback on the wall clock without an audio device
    #[arg(long)]
    pub silent: bool,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 350)]
    pub height: u32,

    /// Refresh rate in frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Config file (defaults to ./spectra.toml or the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_files_and_flags() {
        let cli = Cli::parse_from([
            "spectra",
            "a.mp3",
            "b.flac",
            "--replace-after",
            "2.5",
            "--silent",
            "-o",
            "out.mp4",
        ]);
        assert_eq!(cli.files, vec![PathBuf::from("a.mp3"), PathBuf::from("b.flac")]);
        assert_eq!(cli.replace_after, Some(2.5));
        assert!(cli.silent);
        assert_eq!(cli.output, Some(PathBuf::from("out.mp4")));
        assert_eq!(cli.fps, 60);
    }
}
