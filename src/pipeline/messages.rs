//! Message and snapshot types passed between pipeline stages.

use std::fmt;

/// Identifier of a queued utterance; increases in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// One event from the upstream text source (an LLM token stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEvent {
    /// A content fragment of arbitrary size.
    Fragment(String),
    /// The stream ended; flush whatever remains.
    Done,
}

/// Lifecycle of a queued utterance, as seen from outside the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceStatus {
    /// Waiting for a synthesis slot.
    Pending,
    Generating,
    /// Audio ready, waiting for its turn.
    Ready,
    Playing,
    /// Synthesis failed; never becomes playable.
    Failed(String),
}

/// Read-only view of one queued utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceView {
    pub id: UtteranceId,
    pub text: String,
    pub status: UtteranceStatus,
}

/// Point-in-time view of a synthesis queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Entries in queue order.
    pub utterances: Vec<UtteranceView>,
    pub is_generating: bool,
    pub is_playing: bool,
    /// Something was enqueued since the last `clear()`.
    pub streaming_started: bool,
    /// Most recent generation or playback failure.
    pub last_error: Option<String>,
}

impl QueueSnapshot {
    pub fn texts(&self) -> Vec<&str> {
        self.utterances.iter().map(|u| u.text.as_str()).collect()
    }

    pub fn streaming_state(&self) -> StreamingState {
        StreamingState {
            started: self.streaming_started,
            playing: self.is_playing,
            generating: self.is_generating,
            has_queue: !self.utterances.is_empty(),
        }
    }
}

/// Activity flags consulted before starting a legacy fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingState {
    pub started: bool,
    pub playing: bool,
    pub generating: bool,
    pub has_queue: bool,
}

/// Result of appending text to a synthesis queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Utterances created from the text, in order.
    pub queued: Vec<UtteranceId>,
    /// Oldest utterances dropped to respect the capacity bound.
    pub evicted: Vec<UtteranceId>,
}
