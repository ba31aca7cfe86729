//! Synthesized clips, decoding, exclusive playback and output sinks.

pub mod clip;
pub mod decode;
pub mod mutex;
pub mod output;
#[cfg(feature = "device")]
pub mod playback;
pub mod tap;

pub use clip::{AudioClip, ClipLedger};
pub use decode::{DecodedAudio, clip_duration, decode_clip};
pub use mutex::{AudioStatus, PlaybackGuard, PlaybackKind, PlaybackMutex};
pub use output::{AudioSink, PlaybackOutput, PlaybackRequest};
pub use tap::SignalTap;
