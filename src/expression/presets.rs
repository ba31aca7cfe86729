//! Baseline moods for animation clips and sentiment categories.

use super::Mood;
use crate::sentiment::SentimentCategory;
use std::path::Path;
use std::time::Duration;

/// A mood to apply, and how long it holds before returning to baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodPreset {
    pub mood: Mood,
    pub weight: f32,
    /// `None` means it is the baseline and never expires.
    pub hold: Option<Duration>,
}

const SENTIMENT_HOLD: Duration = Duration::from_secs(5);

/// The resting expression.
pub const BASELINE: MoodPreset = MoodPreset {
    mood: Mood::Neutral,
    weight: 0.3,
    hold: None,
};

/// Known clips and the mood they start with.
const MOTION_DEFAULTS: &[(&str, Mood, f32)] = &[
    ("Walking", Mood::Neutral, 0.3),
    ("StandingIdle", Mood::Neutral, 0.3),
    ("Thinking", Mood::Neutral, 0.7),
    ("VRMA_01", Mood::Neutral, 0.3),
    ("VRMA_02", Mood::Relaxed, 0.3),
];

/// Default `(mood, weight)` for an animation clip.
///
/// Matches on the file stem, so `/Motion/StandingIdle.vrma` and
/// `StandingIdle` are the same clip. Unknown clips get the baseline.
pub fn motion_default(clip: &str) -> (Mood, f32) {
    let stem = Path::new(clip)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(clip);
    MOTION_DEFAULTS
        .iter()
        .find(|(name, _, _)| *name == stem)
        .map_or((BASELINE.mood, BASELINE.weight), |&(_, mood, weight)| {
            (mood, weight)
        })
}

pub fn sentiment_preset(category: SentimentCategory) -> MoodPreset {
    let (mood, weight) = match category {
        SentimentCategory::StrongPositive => (Mood::Happy, 0.6),
        SentimentCategory::MildPositive => (Mood::Happy, 0.4),
        SentimentCategory::Neutral => return BASELINE,
        SentimentCategory::MildNegative => (Mood::Sad, 0.4),
        SentimentCategory::StrongNegative => (Mood::Sad, 0.6),
    };
    MoodPreset {
        mood,
        weight,
        hold: Some(SENTIMENT_HOLD),
    }
}
