//! Avatar voice: streaming speech with lip-sync for a 3D avatar.
//!
//! Text from a language model arrives as fragments and is turned into
//! spoken audio while the avatar's mouth and mood follow along:
//! Text → Segmenter → Synthesis queue → Playback → Lip-sync → Avatar
//!
//! # Architecture
//!
//! Independent stages connected by async channels:
//! - **Segmenter**: splits the fragment stream into speakable sentences
//! - **Synthesis queue**: generates audio ahead of playback over HTTP
//! - **Playback mutex**: one utterance audible at a time, process-wide
//! - **Spectral analyzer**: volume and vowel estimates from the playing audio
//! - **Expression manager**: independent mood and mouth channels on the avatar

pub mod audio;
pub mod config;
pub mod error;
pub mod expression;
pub mod lipsync;
pub mod pipeline;
pub mod runtime;
pub mod segmenter;
pub mod sentiment;
pub mod tts;
pub mod viseme;

#[cfg(test)]
mod test_utils;

pub use audio::{AudioSink, PlaybackMutex, PlaybackOutput};
pub use config::SpeechConfig;
pub use error::{Result, SpeechError};
pub use expression::{ExpressionManager, ExpressionRig};
pub use pipeline::{SpeakOutcome, Speaker, SynthesisQueue, TextEvent};
pub use runtime::RuntimeEvent;
pub use segmenter::SentenceSegmenter;
pub use tts::{HttpSynthesizer, Synthesizer};
