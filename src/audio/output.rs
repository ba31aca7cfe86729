//! Output sinks and the avatar-first / device-second selection.

use crate::audio::clip::AudioClip;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One clip to make audible, plus the text it speaks.
#[derive(Debug)]
pub struct PlaybackRequest {
    pub clip: AudioClip,
    /// Used by sinks that animate the mouth from text timing.
    pub text: String,
}

/// Something that can play a clip to completion.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the clip and return once it finished (or failed).
    ///
    /// Implementations stop promptly and return `Err(SpeechError::Cancelled)`
    /// when `cancel` fires. The clip is consumed either way.
    async fn play(&self, request: PlaybackRequest, cancel: CancellationToken) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// The playback capabilities available to a queue or speaker.
#[derive(Clone, Default)]
pub struct PlaybackOutput {
    /// Avatar-provided audio (may animate the mouth itself).
    pub avatar: Option<Arc<dyn AudioSink>>,
    /// Bare output device.
    pub device: Option<Arc<dyn AudioSink>>,
}

impl PlaybackOutput {
    pub fn device_only(device: Arc<dyn AudioSink>) -> Self {
        Self {
            avatar: None,
            device: Some(device),
        }
    }

    pub fn with_avatar(avatar: Arc<dyn AudioSink>, device: Option<Arc<dyn AudioSink>>) -> Self {
        Self {
            avatar: Some(avatar),
            device,
        }
    }

    /// Avatar sink if present, else the device, else nothing.
    pub fn select(&self) -> Option<Arc<dyn AudioSink>> {
        self.avatar.clone().or_else(|| self.device.clone())
    }

    pub fn is_available(&self) -> bool {
        self.avatar.is_some() || self.device.is_some()
    }
}

impl std::fmt::Debug for PlaybackOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackOutput")
            .field("avatar", &self.avatar.as_ref().map(|s| s.name().to_owned()))
            .field("device", &self.device.as_ref().map(|s| s.name().to_owned()))
            .finish()
    }
}
