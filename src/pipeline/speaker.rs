//! Single-shot speech outside the streaming queue.
//!
//! Used for one-off announcements and as a fallback when the streaming
//! path never started. Plays through the same [`PlaybackMutex`] as the
//! queue, so the two paths never overlap.

use super::generation::{RetryPolicy, generate_with_retry};
use super::queue::SynthesisQueue;
use crate::audio::clip::ClipLedger;
use crate::audio::mutex::{PlaybackKind, PlaybackMutex};
use crate::audio::output::{PlaybackOutput, PlaybackRequest};
use crate::config::{PlaybackConfig, SpeechConfig, TtsConfig};
use crate::error::{Result, SpeechError};
use crate::runtime::RuntimeEvent;
use crate::tts::{SynthesisRequest, Synthesizer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a [`Speaker::speak`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Played,
    /// The playback mutex was busy or in its grace window.
    Skipped,
    NoDevice,
    Cancelled,
}

pub struct Speaker {
    synthesizer: Arc<dyn Synthesizer>,
    output: PlaybackOutput,
    gate: PlaybackMutex,
    tts: TtsConfig,
    playback: PlaybackConfig,
    policy: RetryPolicy,
    ledger: ClipLedger,
    source_id: String,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    /// Token of the call in progress; replaced by each new `speak`.
    current: Mutex<CancellationToken>,
}

impl Speaker {
    pub fn new(
        config: &SpeechConfig,
        synthesizer: Arc<dyn Synthesizer>,
        output: PlaybackOutput,
        gate: PlaybackMutex,
    ) -> Self {
        Self {
            synthesizer,
            output,
            gate,
            tts: config.tts.clone(),
            playback: config.playback.clone(),
            policy: RetryPolicy::from_config(&config.tts),
            ledger: ClipLedger::new(),
            source_id: format!("legacy-{}", uuid::Uuid::new_v4()),
            runtime_tx: None,
            current: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn audio_ledger(&self) -> ClipLedger {
        self.ledger.clone()
    }

    /// Synthesize and play `text`, cancelling any earlier call first.
    ///
    /// # Errors
    ///
    /// [`SpeechError::InvalidInput`] for blank text, or the synthesis or
    /// playback error. Mutex denial and cancellation are outcomes, not errors.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        if text.trim().is_empty() {
            return Err(SpeechError::InvalidInput("text is empty".into()));
        }
        let cancel = self.replace_token();

        let request = SynthesisRequest::new(text, &self.tts);
        let bytes = match generate_with_retry(
            self.synthesizer.as_ref(),
            &request,
            &self.policy,
            &cancel,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(SpeechError::Cancelled) => return Ok(SpeakOutcome::Cancelled),
            Err(e) => return Err(e),
        };
        if cancel.is_cancelled() {
            return Ok(SpeakOutcome::Cancelled);
        }

        let clip = self.ledger.register(self.tts.format, bytes);
        let Some(sink) = self.output.select() else {
            warn!("no playback device for legacy speech");
            return Ok(SpeakOutcome::NoDevice);
        };

        let request = PlaybackRequest {
            clip,
            text: text.to_owned(),
        };
        let played = self
            .gate
            .acquire_and_run(PlaybackKind::Legacy, &self.source_id, move || async move {
                debug!("legacy playback on {}", sink.name());
                tokio::select! {
                    () = cancel.cancelled() => Err(SpeechError::Cancelled),
                    result = sink.play(request, cancel.clone()) => result,
                }
            })
            .await;

        match played {
            None => {
                info!("legacy speech skipped, playback busy");
                self.emit(RuntimeEvent::LegacySkipped {
                    source: self.source_id.clone(),
                });
                Ok(SpeakOutcome::Skipped)
            }
            Some(Ok(())) => Ok(SpeakOutcome::Played),
            Some(Err(SpeechError::Cancelled)) => Ok(SpeakOutcome::Cancelled),
            Some(Err(e)) => Err(e),
        }
    }

    /// Speak `text` only if the streaming queue stays idle for the fallback
    /// delay.
    pub async fn speak_as_fallback(
        &self,
        text: &str,
        queue: &SynthesisQueue,
    ) -> Result<SpeakOutcome> {
        let delay = Duration::from_millis(self.playback.fallback_delay_ms);
        let cancel = self.current_token();
        tokio::select! {
            () = cancel.cancelled() => return Ok(SpeakOutcome::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }

        let streaming = queue.snapshot().streaming_state();
        if !self.gate.should_allow_fallback(&streaming) {
            debug!("streaming active, fallback not needed");
            return Ok(SpeakOutcome::Skipped);
        }
        self.speak(text).await
    }

    /// Cancel the call in progress and release the mutex if it holds it.
    pub fn stop(&self) {
        if let Ok(current) = self.current.lock() {
            current.cancel();
        }
        if self
            .gate
            .release_if_held_by(PlaybackKind::Legacy, &self.source_id)
        {
            debug!("legacy speaker released playback mutex");
        }
    }

    fn replace_token(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            let previous = std::mem::replace(&mut *current, fresh.clone());
            previous.cancel();
        }
        fresh
    }

    fn current_token(&self) -> CancellationToken {
        self.current
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|_| CancellationToken::new())
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.runtime_tx {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}
