//! Runtime events emitted by the pipeline for UI and observability.
//!
//! Payloads stay small so stages can emit from hot paths (the lip-sync tick
//! runs every few tens of milliseconds) without blocking.

use crate::lipsync::Vowel;
use crate::pipeline::messages::UtteranceId;

/// Events that describe what the voice pipeline is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A complete sentence entered the synthesis queue.
    UtteranceQueued { id: UtteranceId, text: String },
    /// The queue was full and this (oldest) entry was dropped.
    UtteranceEvicted { id: UtteranceId },
    GenerationStarted { id: UtteranceId },
    GenerationFinished { id: UtteranceId },
    /// Synthesis gave up after exhausting retries.
    GenerationFailed { id: UtteranceId, error: String },
    PlaybackStarted { id: UtteranceId },
    PlaybackFinished { id: UtteranceId },
    PlaybackFailed { id: UtteranceId, error: String },
    /// `clear()`/`stop()` emptied the queue.
    QueueCleared,
    /// Legacy playback was refused because streaming owns (or just owned) output.
    LegacySkipped { source: String },
    /// One lip-sync analyzer tick.
    LipSync {
        volume: f32,
        phoneme: Option<Vowel>,
    },
}
