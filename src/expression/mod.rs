//! Avatar expression channels: mood and mouth shape.
//!
//! The avatar runtime is external. It is reached only through
//! [`ExpressionRig`], which sets a named expression weight and starts an
//! animation clip. Everything here decides *which* names to set and keeps
//! the mood and viseme channels independent of each other.

pub mod manager;
pub mod presets;
pub mod resolve;

pub use manager::{ExpressionManager, ExpressionSnapshot};
pub use presets::{MoodPreset, motion_default};
pub use resolve::{resolve_expression, try_set_expression};

use std::fmt;

/// Emotional expressions on the mood channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mood {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Relaxed,
}

impl Mood {
    pub const ALL: [Mood; 6] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Surprised,
        Mood::Relaxed,
    ];

    /// Expression name on the rig.
    pub fn name(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mouth shapes on the viseme channel, one per Japanese vowel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Viseme {
    /// Wide open.
    Aa,
    /// Spread.
    Ih,
    /// Rounded, small.
    Ou,
    /// Half open, spread.
    Ee,
    /// Rounded, open.
    Oh,
}

impl Viseme {
    pub const ALL: [Viseme; 5] = [Viseme::Aa, Viseme::Ih, Viseme::Ou, Viseme::Ee, Viseme::Oh];

    pub fn name(self) -> &'static str {
        match self {
            Self::Aa => "aa",
            Self::Ih => "ih",
            Self::Ou => "ou",
            Self::Ee => "ee",
            Self::Oh => "oh",
        }
    }
}

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The avatar's expression capability.
///
/// Implementations are expected to be cheap and non-blocking; they are
/// called from the lip-sync tick.
pub trait ExpressionRig: Send + Sync {
    /// Whether the loaded model has an expression with this exact name.
    fn supports(&self, name: &str) -> bool;

    /// Set `name` to `weight`. Returns whether the model accepted it.
    fn set_expression(&self, name: &str, weight: f32) -> bool;

    /// Start an animation clip by name or path. Returns whether it started.
    fn play_animation_clip(&self, clip: &str) -> bool;
}
