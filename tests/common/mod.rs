//! Doubles shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use avatar_voice::audio::decode::encode_wav;
use avatar_voice::audio::{AudioSink, PlaybackRequest};
use avatar_voice::tts::{SynthesisRequest, Synthesizer};
use avatar_voice::{Result, SpeechError};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Synthesizer that waits `delay` and returns a short silent WAV.
pub struct FakeSynthesizer {
    pub delay: Duration,
    pub fail_on: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakeSynthesizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_on: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_owned());
        self
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest, cancel: CancellationToken) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            () = cancel.cancelled() => return Err(SpeechError::Cancelled),
            () = tokio::time::sleep(self.delay) => {}
        }
        if self.fail_on.contains(&request.text) {
            return Err(SpeechError::InvalidInput(format!("rejected: {}", request.text)));
        }
        encode_wav(&[0.0; 480], 24_000)
    }
}

/// Sink that sleeps for `duration` per clip and records what it played.
#[derive(Default)]
pub struct SlowSink {
    pub duration: Duration,
    played: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SlowSink {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for SlowSink {
    async fn play(&self, request: PlaybackRequest, cancel: CancellationToken) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            () = tokio::time::sleep(self.duration) => Ok(()),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome?;
        self.played.lock().unwrap().push(request.text);
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}
