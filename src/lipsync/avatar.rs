//! Avatar-side playback with text-timed mouth animation.
//!
//! Used when the avatar integration plays audio itself and cannot expose the
//! audible signal for live analysis. The mouth walks the kana of the spoken
//! text, spread over the clip duration, while the audio plays.

use crate::audio::decode::clip_duration;
use crate::audio::output::{AudioSink, PlaybackRequest};
use crate::error::{Result, SpeechError};
use crate::expression::ExpressionManager;
use crate::viseme::{PhonemeStep, estimate_duration, phoneme_timeline};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Mouth weight used for each walked vowel.
const WALK_WEIGHT: f32 = 0.8;

pub struct AvatarPlayback {
    manager: Arc<ExpressionManager>,
    /// Where the audio actually goes; `None` only animates for the clip's length.
    inner: Option<Arc<dyn AudioSink>>,
}

impl AvatarPlayback {
    pub fn new(manager: Arc<ExpressionManager>, inner: Option<Arc<dyn AudioSink>>) -> Self {
        Self { manager, inner }
    }

    async fn walk(&self, steps: &[PhonemeStep]) {
        for step in steps {
            match step.vowel {
                Some(vowel) => {
                    self.manager.apply_phoneme(vowel, WALK_WEIGHT);
                }
                None => self.manager.reset_visemes(),
            }
            tokio::time::sleep(step.duration).await;
        }
        self.manager.reset_visemes();
    }
}

#[async_trait]
impl AudioSink for AvatarPlayback {
    async fn play(&self, request: PlaybackRequest, cancel: CancellationToken) -> Result<()> {
        let duration = clip_duration(&request.clip).unwrap_or_else(|e| {
            debug!("clip duration unknown ({e}), estimating from text");
            estimate_duration(&request.text)
        });
        let steps = phoneme_timeline(&request.text);
        debug!(steps = steps.len(), ?duration, "avatar playback");

        let audio = async {
            match &self.inner {
                Some(sink) => sink.play(request, cancel.clone()).await,
                None => {
                    drop(request);
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        };
        let walk = async {
            self.walk(&steps).await;
            std::future::pending::<Duration>().await
        };

        let result = tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            result = audio => result,
            _ = walk => Ok(()),
        };
        self.manager.reset_visemes();
        result
    }

    fn name(&self) -> &str {
        "avatar"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::clip::ClipLedger;
    use crate::audio::decode::encode_wav;
    use crate::config::AudioFormat;
    use crate::test_utils::RecordingRig;

    #[tokio::test(start_paused = true)]
    async fn walks_vowels_then_closes_mouth() {
        let rig = Arc::new(RecordingRig::vrm1());
        let manager = Arc::new(ExpressionManager::new(rig.clone()));
        let sink = AvatarPlayback::new(Arc::clone(&manager), None);

        // Half a second of audio for a three-kana word.
        let bytes = encode_wav(&vec![0.0; 12_000], 24_000).unwrap();
        let clip = ClipLedger::new().register(AudioFormat::Wav, bytes);
        let request = PlaybackRequest {
            clip,
            text: "あいう".into(),
        };

        let started = tokio::time::Instant::now();
        sink.play(request, CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));

        let shown: Vec<String> = rig
            .calls()
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(name, _)| name)
            .collect();
        assert_eq!(shown, vec!["aa", "ih", "ou"]);
        assert!(manager.snapshot().visemes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_early() {
        let rig = Arc::new(RecordingRig::vrm1());
        let manager = Arc::new(ExpressionManager::new(rig));
        let sink = AvatarPlayback::new(manager, None);
        let clip = ClipLedger::new().register(AudioFormat::Wav, bytes::Bytes::from_static(b"??"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sink
            .play(PlaybackRequest { clip, text: "長い文章です".into() }, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
    }
}
