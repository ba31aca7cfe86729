//! HTTP client for a local synthesis service (`POST {endpoint}/tts`).

use super::{SynthesisRequest, Synthesizer, validate_request};
use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    max_text_chars: usize,
}

impl HttpSynthesizer {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SpeechError::Synthesis(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/tts", config.endpoint.trim_end_matches('/')),
            max_text_chars: config.max_text_chars,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: &SynthesisRequest) -> Result<Bytes> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Synthesis(format!(
                "TTS API error: {} - {body}",
                status.as_u16()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::Synthesis("TTS API returned no audio".into()));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: CancellationToken,
    ) -> Result<Bytes> {
        validate_request(request, self.max_text_chars)?;
        debug!(chars = request.text.chars().count(), "POST {}", self.url);

        tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            result = self.post(request) => result,
        }
    }
}
