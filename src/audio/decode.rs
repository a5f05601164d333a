use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Decoded PCM, interleaved by channel.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }

    /// Sample of `channel` at `frame`, or silence past the end.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channel = channel.min(self.channels.saturating_sub(1));
        self.samples
            .get(frame * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Channel average at `frame`.
    pub fn mono(&self, frame: usize) -> f32 {
        if self.channels == 0 {
            return 0.0;
        }
        let start = frame * self.channels;
        match self.samples.get(start..start + self.channels) {
            Some(frame_samples) => frame_samples.iter().sum::<f32>() / self.channels as f32,
            None => 0.0,
        }
    }
}

/// Turns raw file bytes into PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, name: &str, bytes: Vec<u8>) -> Result<DecodedAudio>;
}

pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, name: &str, bytes: Vec<u8>) -> Result<DecodedAudio> {
        let fail = |reason: String| Error::Decode {
            name: name.to_string(),
            reason,
        };

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| fail(format!("unrecognised format: {e}")))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| fail("no audio tracks found".into()))?;

        let track_id = track.id;
        let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| fail(format!("unsupported codec: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(fail(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(err)) => {
                    log::debug!("skipping corrupt packet in {}: {}", name, err);
                    continue;
                }
                Err(e) => return Err(fail(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_rate = spec.rate;

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if samples.is_empty() || channels == 0 || sample_rate == 0 {
            return Err(fail("stream contains no audio".into()));
        }

        let audio = DecodedAudio {
            samples,
            channels,
            sample_rate,
        };

        log::info!(
            "Decoded {}: {} frames, {} ch, {}Hz, {:.1}s",
            name,
            audio.frames(),
            audio.channels,
            audio.sample_rate,
            audio.duration_secs()
        );

        Ok(audio)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav_from_memory() {
        let bytes = wav_bytes(2, 22_050, 4410);
        let audio = SymphoniaDecoder.decode("tone.wav", bytes).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.frames(), 4410);
        assert!((audio.duration_secs() - 0.2).abs() < 1e-3);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = SymphoniaDecoder
            .decode("noise.mp3", vec![0x42; 512])
            .unwrap_err();
        assert!(matches!(err, Error::Decode { ref name, .. } if name == "noise.mp3"));
    }

    #[test]
    fn mono_averages_channels() {
        let audio = DecodedAudio {
            samples: vec![1.0, 0.0, 0.5, 0.5],
            channels: 2,
            sample_rate: 8000,
        };
        assert_eq!(audio.mono(0), 0.5);
        assert_eq!(audio.mono(1), 0.5);
        assert_eq!(audio.mono(2), 0.0);
        assert_eq!(audio.sample(1, 7), 0.5);
    }
}
