//! Error types for the avatar voice pipeline.

/// Top-level error type for synthesis, playback and expression plumbing.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// The synthesis service rejected the request or returned garbage.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Playback of a synthesized clip failed (device or codec).
    #[error("playback error: {0}")]
    Playback(String),

    /// Synthesized audio could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A bounded operation ran past its deadline.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The operation was cancelled by `clear()`/`stop()`.
    #[error("cancelled")]
    Cancelled,

    /// The caller handed us something unusable (empty text and the like).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error from the synthesis client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl SpeechError {
    /// Whether a synthesis attempt that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Synthesis(_) | Self::Timeout(_) | Self::Http(_) | Self::Io(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
