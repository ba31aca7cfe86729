//! Sentiment readings and the mood stage that applies them.
//!
//! A sentiment source reports a score from 0 (very negative) to 100 (very
//! positive). Scores are bucketed into five categories, and each category
//! maps to a mood preset on the avatar. Non-neutral moods are held for a
//! few seconds and then fall back to the neutral baseline.
//!
//! When no external source is available, [`classify`] gives a fast keyword
//! estimate from response text. A response may also carry an explicit
//! `[sentiment:NN]` prefix, which always wins.

use crate::expression::ExpressionManager;
use crate::expression::presets::{BASELINE, sentiment_preset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentCategory {
    StrongPositive,
    MildPositive,
    Neutral,
    MildNegative,
    StrongNegative,
}

impl SentimentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongPositive => "strong_positive",
            Self::MildPositive => "mild_positive",
            Self::Neutral => "neutral",
            Self::MildNegative => "mild_negative",
            Self::StrongNegative => "strong_negative",
        }
    }
}

impl std::fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a 0–100 score.
pub fn category_for_score(score: u8) -> SentimentCategory {
    match score {
        81.. => SentimentCategory::StrongPositive,
        61..=80 => SentimentCategory::MildPositive,
        40..=60 => SentimentCategory::Neutral,
        21..=39 => SentimentCategory::MildNegative,
        _ => SentimentCategory::StrongNegative,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub category: SentimentCategory,
    pub score: u8,
}

impl SentimentReading {
    pub fn from_score(score: u8) -> Self {
        let score = score.min(100);
        Self {
            category: category_for_score(score),
            score,
        }
    }
}

const NEUTRAL_SCORE: i32 = 50;
const KEYWORD_STEP: i32 = 15;

const POSITIVE: &[&str] = &[
    "嬉しい",
    "うれしい",
    "楽しい",
    "ありがとう",
    "素晴らしい",
    "すごい",
    "よかった",
    "大好き",
    "great",
    "wonderful",
    "love",
    "awesome",
    "thank",
];

const NEGATIVE: &[&str] = &[
    "悲しい",
    "残念",
    "ごめん",
    "申し訳",
    "つらい",
    "辛い",
    "困った",
    "心配",
    "sorry",
    "unfortunately",
    "sad",
    "problem",
];

/// Estimate sentiment from response text.
///
/// An explicit `[sentiment:NN]` prefix is used as-is. Otherwise each
/// positive keyword adds 15 to a neutral 50 and each negative one subtracts
/// 15.
pub fn classify(text: &str) -> SentimentReading {
    if let Some((_, score)) = strip_sentiment_tag(text) {
        return SentimentReading::from_score(score);
    }

    let lower = text.to_lowercase();
    let hits = |table: &[&str]| -> i32 {
        let n = table.iter().filter(|kw| lower.contains(*kw)).count();
        i32::try_from(n).unwrap_or(i32::MAX)
    };
    let score = NEUTRAL_SCORE
        .saturating_add(KEYWORD_STEP.saturating_mul(hits(POSITIVE)))
        .saturating_sub(KEYWORD_STEP.saturating_mul(hits(NEGATIVE)))
        .clamp(0, 100);
    SentimentReading::from_score(u8::try_from(score).unwrap_or(50))
}

/// Split a leading `[sentiment:NN]` tag off `text`.
///
/// Returns the text after the tag and the score, or `None` when there is no
/// well-formed tag.
pub fn strip_sentiment_tag(text: &str) -> Option<(String, u8)> {
    let trimmed = text.trim_start();
    let body = trimmed.strip_prefix("[sentiment:")?;
    let end = body.find(']')?;
    let score: u8 = body[..end].trim().parse().ok()?;
    if score > 100 {
        return None;
    }
    Some((body[end + 1..].trim_start().to_owned(), score))
}

/// Apply sentiment readings to the mood channel until the channel closes or
/// `cancel` fires.
///
/// A reading with the same category as the one currently shown is ignored
/// (it does not extend the hold). When a held mood expires the avatar
/// returns to the neutral baseline.
pub async fn run_mood_stage(
    mut rx: mpsc::Receiver<SentimentReading>,
    manager: Arc<ExpressionManager>,
    cancel: CancellationToken,
) {
    let mut current: Option<SentimentCategory> = None;
    let mut expires: Option<Instant> = None;

    loop {
        let deadline = expires;
        let hold_expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            () = hold_expired => {
                debug!("mood hold expired");
                manager.set_baseline_mood(BASELINE.mood, BASELINE.weight);
                current = None;
                expires = None;
            }
            reading = rx.recv() => {
                let Some(reading) = reading else { break };
                if current == Some(reading.category) {
                    continue;
                }
                let preset = sentiment_preset(reading.category);
                info!("sentiment {} ({}) -> {} {}", reading.category, reading.score, preset.mood, preset.weight);
                match preset.hold {
                    Some(hold) => {
                        manager.set_mood(preset.mood, preset.weight);
                        expires = Some(Instant::now() + hold);
                    }
                    None => {
                        manager.set_baseline_mood(preset.mood, preset.weight);
                        expires = None;
                    }
                }
                current = Some(reading.category);
            }
        }
    }
    debug!("mood stage stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::expression::Mood;
    use crate::test_utils::RecordingRig;
    use std::time::Duration;

    #[test]
    fn score_thresholds() {
        assert_eq!(category_for_score(100), SentimentCategory::StrongPositive);
        assert_eq!(category_for_score(81), SentimentCategory::StrongPositive);
        assert_eq!(category_for_score(80), SentimentCategory::MildPositive);
        assert_eq!(category_for_score(61), SentimentCategory::MildPositive);
        assert_eq!(category_for_score(60), SentimentCategory::Neutral);
        assert_eq!(category_for_score(40), SentimentCategory::Neutral);
        assert_eq!(category_for_score(39), SentimentCategory::MildNegative);
        assert_eq!(category_for_score(21), SentimentCategory::MildNegative);
        assert_eq!(category_for_score(20), SentimentCategory::StrongNegative);
        assert_eq!(category_for_score(0), SentimentCategory::StrongNegative);
    }

    #[test]
    fn reading_clamps_score() {
        let reading = SentimentReading::from_score(250);
        assert_eq!(reading.score, 100);
        assert_eq!(reading.category, SentimentCategory::StrongPositive);
    }

    #[test]
    fn explicit_tag_wins() {
        let reading = classify("[sentiment:10] 嬉しい！ありがとう！");
        assert_eq!(reading.category, SentimentCategory::StrongNegative);
        assert_eq!(
            strip_sentiment_tag("  [sentiment:72] はい"),
            Some(("はい".to_owned(), 72))
        );
        assert_eq!(strip_sentiment_tag("[sentiment:abc] x"), None);
        assert_eq!(strip_sentiment_tag("[sentiment:101] x"), None);
    }

    #[test]
    fn keywords_shift_score() {
        assert_eq!(classify("今日は晴れです").category, SentimentCategory::Neutral);
        assert_eq!(classify("ありがとう、嬉しいです").score, 80);
        assert_eq!(
            classify("ありがとう、嬉しいです。楽しい！").category,
            SentimentCategory::StrongPositive
        );
        assert_eq!(classify("ごめんなさい、残念です").score, 20);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&SentimentCategory::MildNegative).unwrap();
        assert_eq!(json, "\"mild_negative\"");
    }

    #[tokio::test(start_paused = true)]
    async fn held_mood_returns_to_baseline() {
        let rig = Arc::new(RecordingRig::vrm1());
        let manager = Arc::new(ExpressionManager::new(rig.clone()));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let stage = tokio::spawn(run_mood_stage(rx, Arc::clone(&manager), cancel.clone()));

        tx.send(SentimentReading::from_score(90)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snap = manager.snapshot();
        assert_eq!(snap.mood, Some((Mood::Happy, 0.6)));
        assert!(snap.mood_explicit);

        // Same category again does not extend the hold.
        tx.send(SentimentReading::from_score(95)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        let snap = manager.snapshot();
        assert_eq!(snap.mood, Some((Mood::Neutral, 0.3)));
        assert!(!snap.mood_explicit);
        assert_eq!(rig.weight("happy"), Some(0.0));

        cancel.cancel();
        stage.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn newer_reading_replaces_held_mood() {
        let rig = Arc::new(RecordingRig::vrm0());
        let manager = Arc::new(ExpressionManager::new(rig.clone()));
        let (tx, rx) = mpsc::channel(8);
        let stage = tokio::spawn(run_mood_stage(rx, Arc::clone(&manager), CancellationToken::new()));

        tx.send(SentimentReading::from_score(70)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.weight("joy"), Some(0.4));

        tx.send(SentimentReading::from_score(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.weight("joy"), Some(0.0));
        assert_eq!(rig.weight("sorrow"), Some(0.4));

        drop(tx);
        stage.await.unwrap();
    }
}
