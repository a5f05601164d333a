use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Receives one RGBA canvas per refresh tick.
pub trait FrameSink {
    fn present(&mut self, rgba_pixels: &[u8]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Raw RGBA frames piped into an ffmpeg-family child process.
pub struct FfmpegPipe {
    child: Child,
    program: &'static str,
}

impl FfmpegPipe {
    /// Record the visualization to a video file.
    pub fn encoder(
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: &str,
        pix_fmt: &str,
        crf: u32,
    ) -> Result<Self> {
        let output = output_path
            .to_str()
            .context("Output path is not valid UTF-8")?;

        let mut args = vec!["-y".to_string(), "-loglevel".into(), "error".into()];
        args.extend(raw_input_args(width, height, fps));
        args.extend([
            "-c:v".into(), codec.to_string(),
            "-pix_fmt".into(), pix_fmt.to_string(),
            "-crf".into(), crf.to_string(),
            "-preset".into(), "medium".into(),
            output.to_string(),
        ]);

        let pipe = Self::spawn("ffmpeg", &args)?;
        log::info!("FFmpeg encoder started: {}x{} @ {}fps, codec={}", width, height, fps, codec);
        Ok(pipe)
    }

    /// Show the visualization in an ffplay window.
    pub fn preview(width: u32, height: u32, fps: u32) -> Result<Self> {
        let mut args = vec![
            "-loglevel".to_string(), "error".into(),
            "-window_title".into(), "spectra".into(),
            "-fflags".into(), "nobuffer".into(),
        ];
        args.extend(raw_input_args(width, height, fps).into_iter().filter(|a| a != "-i"));
        let pipe = Self::spawn("ffplay", &args)?;
        log::info!("Preview window started: {}x{} @ {}fps", width, height, fps);
        Ok(pipe)
    }

    fn spawn(program: &'static str, args: &[String]) -> Result<Self> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {program}. Is it installed?"))?;
        Ok(Self { child, program })
    }
}

fn raw_input_args(width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-framerate".into(), fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ]
}

impl FrameSink for FfmpegPipe {
    fn present(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .with_context(|| format!("{} stdin not available", self.program))?;
        stdin
            .write_all(rgba_pixels)
            .with_context(|| format!("Failed to write frame to {}", self.program))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self { mut child, program } = *self;

        // Close stdin to signal EOF
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {program}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} exited with error:\n{}", program, stderr);
        }

        log::info!("{} finished", program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_input_describes_rgba_frames() {
        let args = raw_input_args(800, 350, 60);
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-f rawvideo -pixel_format rgba -video_size 800x350 -framerate 60 -i pipe:0"
        );
    }
}
