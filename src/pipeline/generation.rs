//! Bounded, retried synthesis calls.

use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use crate::tts::{SynthesisRequest, Synthesizer};
use bytes::Bytes;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Timeout and retry settings for one synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline per attempt.
    pub timeout: Duration,
    /// Attempts after the first.
    pub max_retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Synthesize with a per-attempt timeout and linear backoff.
///
/// Cancellation is checked around every await and is never retried;
/// non-retryable errors (see [`SpeechError::is_retryable`]) return at once.
///
/// # Errors
///
/// The last attempt's error, [`SpeechError::Timeout`] if it ran out of time,
/// or [`SpeechError::Cancelled`].
pub async fn generate_with_retry(
    synthesizer: &dyn Synthesizer,
    request: &SynthesisRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Bytes> {
    let timeout_ms = u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX);
    let mut attempt: u32 = 0;

    loop {
        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(SpeechError::Cancelled),
            result = tokio::time::timeout(policy.timeout, synthesizer.synthesize(request, cancel.clone())) => {
                result.unwrap_or_else(|_| Err(SpeechError::Timeout(timeout_ms)))
            }
        };

        match outcome {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && attempt < policy.max_retries && !cancel.is_cancelled() => {
                attempt += 1;
                warn!(
                    "synthesis attempt {attempt} of {} failed: {e}",
                    policy.max_retries + 1
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(SpeechError::Cancelled),
                    () = tokio::time::sleep(policy.backoff * attempt) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::test_utils::ScriptedSynthesizer;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&TtsConfig::default())
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest::new(text, &TtsConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let synth = ScriptedSynthesizer::new().fail_times("こんにちは", 2);
        let started = tokio::time::Instant::now();

        let bytes = generate_with_retry(&synth, &request("こんにちは"), &policy(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(synth.requests().len(), 3);
        // 1000 ms after the first failure, 2000 ms after the second.
        assert!(started.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let synth = ScriptedSynthesizer::new().fail_always("だめです");
        let err = generate_with_retry(&synth, &request("だめです"), &policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis(_)));
        assert_eq!(synth.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out() {
        let synth = ScriptedSynthesizer::new().with_delay(Duration::from_secs(60));
        let policy = RetryPolicy {
            max_retries: 0,
            ..policy()
        };
        let err = generate_with_retry(&synth, &request("遅い応答です"), &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Timeout(10_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_retried() {
        let synth = ScriptedSynthesizer::new().with_delay(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = generate_with_retry(&synth, &request("キャンセル"), &policy(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
        assert_eq!(synth.requests().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_not_retried() {
        let synth = ScriptedSynthesizer::new().reject_invalid(true);
        let err = generate_with_retry(&synth, &request(" "), &policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::InvalidInput(_)));
        assert_eq!(synth.requests().len(), 1);
    }
}
