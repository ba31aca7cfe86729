//! Lip-sync: live spectral analysis and text-driven mouth animation.

pub mod analyzer;
pub mod avatar;
pub mod driver;

pub use analyzer::{LipSyncReading, SpectralAnalyzer, compute_volume, estimate_phoneme};
pub use avatar::AvatarPlayback;
pub use driver::run_lipsync_stage;

use crate::expression::Viseme;
use std::fmt;

/// The five Japanese vowels the analyzer and the text walk distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vowel {
    A,
    I,
    U,
    E,
    O,
}

impl Vowel {
    pub const ALL: [Vowel; 5] = [Vowel::A, Vowel::I, Vowel::U, Vowel::E, Vowel::O];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::I => "i",
            Self::U => "u",
            Self::E => "e",
            Self::O => "o",
        }
    }

    /// Mouth shape for this vowel.
    pub fn viseme(self) -> Viseme {
        match self {
            Self::A => Viseme::Aa,
            Self::I => Viseme::Ih,
            Self::U => Viseme::Ou,
            Self::E => Viseme::Ee,
            Self::O => Viseme::Oh,
        }
    }

    /// Parse a phoneme label such as `a`, `I` or `oh`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "a" | "aa" => Some(Self::A),
            "i" | "ih" => Some(Self::I),
            "u" | "ou" => Some(Self::U),
            "e" | "ee" => Some(Self::E),
            "o" | "oh" => Some(Self::O),
            _ => None,
        }
    }
}

impl fmt::Display for Vowel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
