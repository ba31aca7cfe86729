//! Test doubles shared by unit tests across modules.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::audio::decode::encode_wav;
use crate::audio::output::{AudioSink, PlaybackRequest};
use crate::error::{Result, SpeechError};
use crate::expression::ExpressionRig;
use crate::tts::{SynthesisRequest, Synthesizer, validate_request};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Expression names on a VRM 1.0 model.
const VRM1_NAMES: &[&str] = &[
    "neutral", "happy", "sad", "angry", "surprised", "relaxed", "aa", "ih", "ou", "ee", "oh",
];
/// Expression names on a VRM 0.x model.
const VRM0_NAMES: &[&str] = &[
    "neutral", "joy", "sorrow", "angry", "surprised", "fun", "a", "i", "u", "e", "o",
];

/// Rig that records every accepted `set_expression` call.
#[derive(Default)]
pub struct RecordingRig {
    names: HashSet<String>,
    weights: Mutex<HashMap<String, f32>>,
    calls: Mutex<Vec<(String, f32)>>,
    clips: Mutex<Vec<String>>,
}

impl RecordingRig {
    pub fn with_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| (*n).to_owned()).collect(),
            ..Self::default()
        }
    }

    pub fn vrm1() -> Self {
        Self::with_names(VRM1_NAMES)
    }

    pub fn vrm0() -> Self {
        Self::with_names(VRM0_NAMES)
    }

    pub fn calls(&self) -> Vec<(String, f32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn weight(&self, name: &str) -> Option<f32> {
        self.weights.lock().unwrap().get(name).copied()
    }

    pub fn clips(&self) -> Vec<String> {
        self.clips.lock().unwrap().clone()
    }
}

impl ExpressionRig for RecordingRig {
    fn supports(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn set_expression(&self, name: &str, weight: f32) -> bool {
        if !self.names.contains(name) {
            return false;
        }
        self.weights.lock().unwrap().insert(name.to_owned(), weight);
        self.calls.lock().unwrap().push((name.to_owned(), weight));
        true
    }

    fn play_animation_clip(&self, clip: &str) -> bool {
        self.clips.lock().unwrap().push(clip.to_owned());
        true
    }
}

/// Synthesizer with per-text delays and failures.
///
/// Successful calls return a short silent WAV.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    /// Remaining failures per text; `usize::MAX` fails forever.
    failures: Mutex<HashMap<String, usize>>,
    reject_invalid: bool,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn delay_for(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_owned(), delay);
        self
    }

    pub fn fail_times(self, text: &str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(text.to_owned(), times);
        self
    }

    pub fn fail_always(self, text: &str) -> Self {
        self.fail_times(text, usize::MAX)
    }

    /// Validate requests like the HTTP client does.
    pub fn reject_invalid(mut self, on: bool) -> Self {
        self.reject_invalid = on;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: CancellationToken,
    ) -> Result<Bytes> {
        self.requests.lock().unwrap().push(request.text.clone());
        if self.reject_invalid {
            validate_request(request, 1_000)?;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&request.text)
            .copied()
            .unwrap_or(self.default_delay);
        let waited = tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        waited?;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&request.text)
                && *left > 0
            {
                if *left != usize::MAX {
                    *left -= 1;
                }
                return Err(SpeechError::Synthesis(format!(
                    "TTS API error: 503 - busy ({})",
                    request.text
                )));
            }
        }

        encode_wav(&[0.0; 240], 24_000)
    }
}

/// Sink that "plays" for a fixed time and records what it played.
#[derive(Default)]
pub struct RecordingSink {
    duration: Duration,
    fail_on: HashSet<String>,
    played: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSink {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_owned());
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, request: PlaybackRequest, cancel: CancellationToken) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            () = tokio::time::sleep(self.duration) => Ok(()),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if self.fail_on.contains(&request.text) {
            return Err(SpeechError::Playback("device lost".into()));
        }
        self.played.lock().unwrap().push(request.text);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
