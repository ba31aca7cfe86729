//! Decoding synthesized clips to mono f32 PCM.
//!
//! WAV goes through `hound`; compressed containers (MP3, Ogg/Vorbis) go
//! through `symphonia`. Multi-channel audio is averaged down to mono.

use crate::audio::clip::AudioClip;
use crate::config::AudioFormat;
use crate::error::{Result, SpeechError};
use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;

/// Mono PCM ready for output or analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Linearly resample to `to_sr`.
    pub fn resampled(self, to_sr: u32) -> Self {
        if self.sample_rate == to_sr || self.samples.is_empty() || self.sample_rate == 0 {
            return Self {
                samples: self.samples,
                sample_rate: to_sr,
            };
        }
        Self {
            samples: resample_linear(&self.samples, self.sample_rate, to_sr),
            sample_rate: to_sr,
        }
    }
}

/// Decode a clip according to its declared format.
///
/// # Errors
///
/// Returns [`SpeechError::Decode`] when the bytes are not valid audio of that format.
pub fn decode_clip(clip: &AudioClip) -> Result<DecodedAudio> {
    decode_bytes(clip.bytes(), clip.format())
}

/// Decode raw encoded bytes.
///
/// # Errors
///
/// Returns [`SpeechError::Decode`] when the bytes are not valid audio of that format.
pub fn decode_bytes(bytes: &Bytes, format: AudioFormat) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(SpeechError::Decode("empty audio payload".into()));
    }
    match format {
        AudioFormat::Wav => decode_wav(bytes),
        AudioFormat::Mp3 => decode_compressed(bytes, "mp3"),
        AudioFormat::Ogg => decode_compressed(bytes, "ogg"),
    }
}

/// Playback length of a clip.
///
/// WAV durations are read from the header; other formats are decoded.
///
/// # Errors
///
/// Returns [`SpeechError::Decode`] when the clip cannot be parsed.
pub fn clip_duration(clip: &AudioClip) -> Result<Duration> {
    if clip.format() == AudioFormat::Wav {
        let reader = hound::WavReader::new(Cursor::new(clip.bytes().clone()))
            .map_err(|e| SpeechError::Decode(format!("invalid WAV header: {e}")))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(SpeechError::Decode("WAV sample rate is zero".into()));
        }
        let frames = reader.duration();
        return Ok(Duration::from_secs_f64(
            f64::from(frames) / f64::from(spec.sample_rate),
        ));
    }
    decode_clip(clip).map(|audio| audio.duration())
}

/// Encode mono f32 samples as a 16-bit PCM WAV.
///
/// # Errors
///
/// Returns [`SpeechError::Decode`] if the WAV writer fails.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Bytes> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut out), spec)
            .map_err(|e| SpeechError::Decode(format!("failed to create wav writer: {e}")))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(v)
                .map_err(|e| SpeechError::Decode(format!("failed to write wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SpeechError::Decode(format!("failed to finalize wav: {e}")))?;
    }
    Ok(Bytes::from(out))
}

fn decode_wav(bytes: &Bytes) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes.clone()))
        .map_err(|e| SpeechError::Decode(format!("invalid WAV: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| SpeechError::Decode(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| SpeechError::Decode(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    Ok(DecodedAudio {
        samples: downmix(samples, usize::from(spec.channels)),
        sample_rate: spec.sample_rate,
    })
}

fn decode_compressed(bytes: &Bytes, extension: &str) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SpeechError::Decode(format!("failed to probe {extension}: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SpeechError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| SpeechError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SpeechError::Decode(format!("failed to create decoder: {e}")))?;

    let mut out = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SpeechError::Decode(format!("audio read error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(SpeechError::Decode(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        match sample_buf.as_mut() {
            Some(b) if b.capacity() >= required => b.clear(),
            _ => sample_buf = Some(SampleBuffer::<f32>::new(frames, spec)),
        }
        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
            out.extend(downmix(b.samples().to_vec(), channels));
        }
    }

    Ok(DecodedAudio {
        samples: out,
        sample_rate,
    })
}

fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    let ratio = f64::from(to_sr) / f64::from(from_sr);
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len().saturating_sub(1);

    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (pos - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}
