//! Configuration types for the avatar voice pipeline.

use crate::error::{Result, SpeechError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the voice pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Synthesis service settings.
    pub tts: TtsConfig,
    /// Sentence segmentation of the incoming text stream.
    pub segmenter: SegmenterConfig,
    /// Streaming synthesis queue settings.
    pub queue: QueueConfig,
    /// Playback exclusivity and output settings.
    pub playback: PlaybackConfig,
    /// Live lip-sync analysis settings.
    pub lipsync: LipSyncConfig,
}

/// Container format requested from the synthesis service.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
}

impl AudioFormat {
    /// Wire name sent to the synthesis service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }
}

/// Synthesis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the synthesis service (the `/tts` route is appended).
    pub endpoint: String,
    /// Speaker / voice identifier understood by the service.
    pub voice_id: u64,
    /// Audio container to request.
    pub format: AudioFormat,
    /// Deadline for a single synthesis attempt.
    pub request_timeout_ms: u64,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Linear backoff unit between attempts (`backoff * attempt`).
    pub retry_backoff_ms: u64,
    /// Longest text accepted by the service.
    pub max_text_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_owned(),
            voice_id: 888_753_760,
            format: AudioFormat::Wav,
            request_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 1_000,
            max_text_chars: 1_000,
        }
    }
}

/// Sentence segmenter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Every character in this string closes a sentence.
    pub delimiters: String,
    /// Minimum sentence length in characters (delimiter excluded).
    pub min_sentence_length: usize,
    /// Completeness score at which the remainder is worth prefetching.
    pub prefetch_trigger: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            delimiters: "。！？\n".to_owned(),
            min_sentence_length: 5,
            prefetch_trigger: 0.7,
        }
    }
}

/// Which ready utterance the playback loop may start next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOrder {
    /// Only the lowest-index non-errored utterance may play; wait for it.
    #[default]
    Strict,
    /// The first utterance whose audio is ready plays, even if an earlier
    /// one is still generating.
    ReadyFirst,
}

/// Streaming synthesis queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity; inserting beyond it evicts the oldest entries.
    pub max_queue_size: usize,
    /// How many synthesis calls may be in flight at once.
    pub max_concurrent_generations: usize,
    /// Playback selection policy.
    pub playback_order: PlaybackOrder,
    /// Synthesize the segmenter tail once its completeness crosses the
    /// prefetch trigger, and reuse the audio if that exact text is emitted.
    pub speculative_prefetch: bool,
    /// Retry interval while another caller holds the playback mutex.
    pub mutex_retry_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 20,
            max_concurrent_generations: 1,
            playback_order: PlaybackOrder::Strict,
            speculative_prefetch: false,
            mutex_retry_ms: 100,
        }
    }
}

/// Playback exclusivity and output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Legacy playback stays suppressed this long after streaming released.
    pub legacy_grace_ms: u64,
    /// How long the legacy fallback waits before checking streaming output.
    pub fallback_delay_ms: u64,
    /// Output sample rate in Hz.
    pub output_sample_rate: u32,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            legacy_grace_ms: 1_000,
            fallback_delay_ms: 3_000,
            output_sample_rate: 24_000,
            output_device: None,
        }
    }
}

/// Live lip-sync analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Interval between analyzer ticks.
    pub tick_interval_ms: u64,
    /// FFT window length (power of two).
    pub fft_size: usize,
    /// Number of recent samples used for the volume estimate.
    pub time_domain_len: usize,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30,
            fft_size: 2048,
            time_domain_len: 2048,
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SpeechError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path:
    /// `dirs::config_dir()/avatar-voice/config.toml`.
    ///
    /// Falls back to the system temp directory when the platform has no
    /// config directory.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("avatar-voice")
            .join("config.toml")
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_queue_size == 0 {
            return Err(SpeechError::Config("queue.max_queue_size must be > 0".into()));
        }
        if self.queue.max_concurrent_generations == 0 {
            return Err(SpeechError::Config(
                "queue.max_concurrent_generations must be > 0".into(),
            ));
        }
        if self.segmenter.delimiters.is_empty() {
            return Err(SpeechError::Config("segmenter.delimiters is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.segmenter.prefetch_trigger) {
            return Err(SpeechError::Config(format!(
                "segmenter.prefetch_trigger {} outside [0, 1]",
                self.segmenter.prefetch_trigger
            )));
        }
        if !self.lipsync.fft_size.is_power_of_two() || self.lipsync.fft_size < 64 {
            return Err(SpeechError::Config(format!(
                "lipsync.fft_size {} must be a power of two >= 64",
                self.lipsync.fft_size
            )));
        }
        if self.lipsync.tick_interval_ms == 0 {
            return Err(SpeechError::Config("lipsync.tick_interval_ms must be > 0".into()));
        }
        if self.tts.endpoint.trim().is_empty() {
            return Err(SpeechError::Config("tts.endpoint is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SpeechConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_queue_size, 20);
        assert_eq!(config.segmenter.min_sentence_length, 5);
        assert!((config.segmenter.prefetch_trigger - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.lipsync.tick_interval_ms, 30);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SpeechConfig = toml::from_str(
            r#"
            [queue]
            max_queue_size = 3
            playback_order = "ready_first"

            [tts]
            format = "mp3"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.max_queue_size, 3);
        assert_eq!(config.queue.playback_order, PlaybackOrder::ReadyFirst);
        assert_eq!(config.tts.format, AudioFormat::Mp3);
        assert_eq!(config.tts.max_retries, 2);
        assert_eq!(config.segmenter.delimiters, "。！？\n");
    }

    #[test]
    fn default_path_is_under_platform_config_dir() {
        let path = SpeechConfig::default_config_path();
        assert!(path.ends_with("avatar-voice/config.toml"), "{}", path.display());
        if let Some(base) = dirs::config_dir() {
            assert!(path.starts_with(base));
        }
    }

    #[test]
    fn zero_queue_size_rejected() {
        let mut config = SpeechConfig::default();
        config.queue.max_queue_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_queue_size"));
    }

    #[test]
    fn odd_fft_size_rejected() {
        let mut config = SpeechConfig::default();
        config.lipsync.fft_size = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn trigger_outside_unit_interval_rejected() {
        let mut config = SpeechConfig::default();
        config.segmenter.prefetch_trigger = 1.5;
        assert!(config.validate().is_err());
    }
}
