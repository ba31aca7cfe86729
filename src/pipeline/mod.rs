//! Speech pipeline: text in, avatar speech out.
//!
//! Text fragments flow through the text stage into the [`SynthesisQueue`],
//! which segments, synthesizes and plays them in order. The [`Speaker`]
//! covers one-shot speech that bypasses the queue.

pub mod generation;
pub mod messages;
pub mod queue;
pub mod speaker;
pub mod stream;

pub use generation::{RetryPolicy, generate_with_retry};
pub use messages::{
    EnqueueReport, QueueSnapshot, StreamingState, TextEvent, UtteranceId, UtteranceStatus,
    UtteranceView,
};
pub use queue::SynthesisQueue;
pub use speaker::{SpeakOutcome, Speaker};
pub use stream::run_text_stage;
