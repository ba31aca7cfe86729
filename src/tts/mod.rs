//! Speech synthesis seam.
//!
//! The pipeline never synthesizes audio itself; it calls a [`Synthesizer`]
//! (normally [`HttpSynthesizer`] against a local TTS service) and receives
//! encoded audio bytes.

mod http;

pub use http::HttpSynthesizer;

use crate::config::{AudioFormat, TtsConfig};
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// One synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(rename = "speaker_id")]
    pub voice_id: u64,
    pub format: AudioFormat,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, config: &TtsConfig) -> Self {
        Self {
            text: text.into(),
            voice_id: config.voice_id,
            format: config.format,
        }
    }
}

/// Reject requests the service would refuse anyway.
///
/// # Errors
///
/// [`SpeechError::InvalidInput`] for empty or over-long text.
pub fn validate_request(request: &SynthesisRequest, max_chars: usize) -> Result<()> {
    if request.text.trim().is_empty() {
        return Err(SpeechError::InvalidInput("text is empty".into()));
    }
    let chars = request.text.chars().count();
    if chars > max_chars {
        return Err(SpeechError::InvalidInput(format!(
            "text is {chars} chars, limit is {max_chars}"
        )));
    }
    Ok(())
}

/// Text-to-speech backend.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `request` into encoded audio of `request.format`.
    ///
    /// Must return promptly with [`SpeechError::Cancelled`] once `cancel` fires.
    async fn synthesize(&self, request: &SynthesisRequest, cancel: CancellationToken)
    -> Result<Bytes>;
}
