//! Two-channel expression state on top of an [`ExpressionRig`].
//!
//! The mood channel is driven by sentiment and motion defaults, the viseme
//! channel by lip-sync. Each setter resets only its own channel before
//! applying, so a mouth update never wipes the current mood and vice versa.

use super::presets::motion_default;
use super::resolve::try_set_expression;
use super::{ExpressionRig, Mood, Viseme};
use crate::lipsync::Vowel;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// At or below this volume the mouth is closed.
pub const MOUTH_FLOOR: f32 = 0.05;

/// Volume tiers for the volume-only blend.
const LOUD: f32 = 0.7;
const MEDIUM: f32 = 0.4;

/// Bounds of the acoustic (phoneme + volume) mouth weight.
const ACOUSTIC_MIN: f32 = 0.15;
const ACOUSTIC_MAX: f32 = 1.0;

/// What the manager last applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionSnapshot {
    pub mood: Option<(Mood, f32)>,
    /// Whether `mood` came from an explicit `set_mood` (not a motion default).
    pub mood_explicit: bool,
    /// Non-zero visemes, in [`Viseme::ALL`] order.
    pub visemes: Vec<(Viseme, f32)>,
    pub motion: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    mood: Option<(Mood, f32)>,
    mood_explicit: bool,
    visemes: [f32; 5],
    motion: Option<String>,
}

pub struct ExpressionManager {
    rig: Arc<dyn ExpressionRig>,
    state: Mutex<State>,
}

impl ExpressionManager {
    pub fn new(rig: Arc<dyn ExpressionRig>) -> Self {
        Self {
            rig,
            state: Mutex::new(State::default()),
        }
    }

    /// Replace the mood channel with a single mood.
    ///
    /// Returns whether the rig showed it (through a fallback name if needed).
    pub fn set_mood(&self, mood: Mood, weight: f32) -> bool {
        self.apply_mood(mood, weight, true)
    }

    /// Apply a mood that later motions may override.
    pub fn set_baseline_mood(&self, mood: Mood, weight: f32) -> bool {
        self.apply_mood(mood, weight, false)
    }

    /// Zero every mood expression.
    pub fn clear_mood(&self) {
        self.reset_mood_channel();
        if let Ok(mut state) = self.state.lock() {
            state.mood = None;
            state.mood_explicit = false;
        }
    }

    /// Replace the viseme channel with a single mouth shape.
    pub fn set_viseme(&self, viseme: Viseme, weight: f32) -> bool {
        self.set_visemes(&[(viseme, weight)])
    }

    /// Replace the viseme channel with a blend.
    ///
    /// Returns whether at least one shape was shown.
    pub fn set_visemes(&self, blend: &[(Viseme, f32)]) -> bool {
        self.reset_viseme_channel();
        let mut any = false;
        let mut applied = [0.0f32; 5];
        for &(viseme, weight) in blend {
            let weight = weight.clamp(0.0, 1.0);
            if try_set_expression(self.rig.as_ref(), viseme.name(), weight) {
                any = true;
                applied[viseme_slot(viseme)] = weight;
            }
        }
        if let Ok(mut state) = self.state.lock() {
            state.visemes = applied;
        }
        any
    }

    /// Close the mouth.
    pub fn reset_visemes(&self) {
        self.reset_viseme_channel();
        if let Ok(mut state) = self.state.lock() {
            state.visemes = [0.0; 5];
        }
    }

    /// Clear both channels.
    pub fn reset_all(&self) {
        self.clear_mood();
        self.reset_visemes();
    }

    /// Volume-only mouth blend.
    pub fn apply_volume(&self, volume: f32) {
        if volume <= MOUTH_FLOOR {
            self.reset_visemes();
            return;
        }
        let v = volume.min(1.0);
        let blend: &[(Viseme, f32)] = if v > LOUD {
            &[(Viseme::Aa, v)]
        } else if v > MEDIUM {
            &[(Viseme::Aa, v * 0.7), (Viseme::Oh, v * 0.3)]
        } else {
            &[(Viseme::Ih, v * 0.8), (Viseme::Ou, v * 0.2)]
        };
        self.set_visemes(blend);
    }

    /// Show the mouth shape for one vowel.
    pub fn apply_phoneme(&self, vowel: Vowel, weight: f32) -> bool {
        self.set_viseme(vowel.viseme(), weight)
    }

    /// Mouth from a live analyzer reading.
    ///
    /// With a phoneme, its viseme gets a weight shaped by volume and scaled
    /// by confidence; without one, the volume-only blend is used.
    pub fn apply_acoustic(&self, volume: f32, phoneme: Option<Vowel>, confidence: Option<f32>) {
        if volume <= MOUTH_FLOOR {
            self.reset_visemes();
            return;
        }
        match phoneme {
            Some(vowel) => {
                let weight = acoustic_weight(volume, confidence.unwrap_or(0.0));
                self.apply_phoneme(vowel, weight);
            }
            None => self.apply_volume(volume),
        }
    }

    /// Start an animation clip and apply its baseline mood.
    ///
    /// The baseline is skipped while an explicit mood is in effect.
    pub fn play_motion(&self, clip: &str) -> bool {
        let started = self.rig.play_animation_clip(clip);
        let explicit = self.state.lock().map(|s| s.mood_explicit).unwrap_or(false);
        if let Ok(mut state) = self.state.lock() {
            state.motion = Some(clip.to_owned());
        }
        if !explicit {
            let (mood, weight) = motion_default(clip);
            debug!("motion '{clip}' baseline {mood} {weight}");
            self.apply_mood(mood, weight, false);
        }
        started
    }

    /// Return the mood channel to its resting state.
    pub fn restore_baseline(&self) {
        let motion = self.state.lock().ok().and_then(|s| s.motion.clone());
        let (mood, weight) = motion_default(motion.as_deref().unwrap_or_default());
        self.apply_mood(mood, weight, false);
    }

    pub fn snapshot(&self) -> ExpressionSnapshot {
        let Ok(state) = self.state.lock() else {
            return ExpressionSnapshot::default();
        };
        ExpressionSnapshot {
            mood: state.mood,
            mood_explicit: state.mood_explicit,
            visemes: Viseme::ALL
                .iter()
                .zip(state.visemes)
                .filter(|(_, w)| *w > 0.0)
                .map(|(v, w)| (*v, w))
                .collect(),
            motion: state.motion.clone(),
        }
    }

    fn apply_mood(&self, mood: Mood, weight: f32, explicit: bool) -> bool {
        self.reset_mood_channel();
        let weight = weight.clamp(0.0, 1.0);
        let shown = try_set_expression(self.rig.as_ref(), mood.name(), weight);
        if let Ok(mut state) = self.state.lock() {
            state.mood = Some((mood, weight));
            state.mood_explicit = explicit;
        }
        shown
    }

    fn reset_mood_channel(&self) {
        for mood in Mood::ALL {
            try_set_expression(self.rig.as_ref(), mood.name(), 0.0);
        }
    }

    fn reset_viseme_channel(&self) {
        for viseme in Viseme::ALL {
            try_set_expression(self.rig.as_ref(), viseme.name(), 0.0);
        }
    }
}

/// `0.6 * (volume^0.7 * 1.2) * clamp(confidence, 0.2, 1)`, kept within [0.15, 1].
pub fn acoustic_weight(volume: f32, confidence: f32) -> f32 {
    let shaped = volume.clamp(0.0, 1.0).powf(0.7) * 1.2;
    (0.6 * shaped * confidence.clamp(0.2, 1.0)).clamp(ACOUSTIC_MIN, ACOUSTIC_MAX)
}

fn viseme_slot(viseme: Viseme) -> usize {
    match viseme {
        Viseme::Aa => 0,
        Viseme::Ih => 1,
        Viseme::Ou => 2,
        Viseme::Ee => 3,
        Viseme::Oh => 4,
    }
}
