//! Text-driven mouth timing.
//!
//! When live analysis is not available the mouth is animated from the text
//! alone: each kana maps to its vowel, and the clip duration is split evenly
//! across the resulting phonemes.

use crate::lipsync::Vowel;
use std::time::Duration;

/// Shortest time a single phoneme is held.
const MIN_PHONEME: Duration = Duration::from_millis(80);
/// Per-character share of the clip used to size each phoneme.
const PER_CHAR: Duration = Duration::from_millis(60);

/// Speaking-rate estimate used when the real clip length is unknown.
const ESTIMATE_PER_CHAR_MS: u64 = 200;
const ESTIMATE_PADDING_MS: u64 = 1_000;

/// One step of a mouth walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhonemeStep {
    /// `None` closes the mouth (ん, small っ).
    pub vowel: Option<Vowel>,
    pub start: Duration,
    pub duration: Duration,
}

/// Vowel sound of a single kana (hiragana or katakana).
///
/// Returns `Some(None)` for kana that close the mouth and `None` for
/// characters that are not speakable kana.
pub fn kana_vowel(c: char) -> Option<Option<Vowel>> {
    // Fold katakana onto hiragana.
    let c = match c {
        '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        other => other,
    };
    let vowel = match c {
        'あ' | 'か' | 'さ' | 'た' | 'な' | 'は' | 'ま' | 'や' | 'ら' | 'わ' | 'が' | 'ざ' | 'だ'
        | 'ば' | 'ぱ' | 'ぁ' | 'ゃ' | 'ゎ' | 'a' | 'A' => Vowel::A,
        'い' | 'き' | 'し' | 'ち' | 'に' | 'ひ' | 'み' | 'り' | 'ぎ' | 'じ' | 'ぢ' | 'び' | 'ぴ'
        | 'ぃ' | 'ゐ' | 'i' | 'I' => Vowel::I,
        'う' | 'く' | 'す' | 'つ' | 'ぬ' | 'ふ' | 'む' | 'ゆ' | 'る' | 'ぐ' | 'ず' | 'づ' | 'ぶ'
        | 'ぷ' | 'ぅ' | 'ゅ' | 'ゔ' | 'u' | 'U' => Vowel::U,
        'え' | 'け' | 'せ' | 'て' | 'ね' | 'へ' | 'め' | 'れ' | 'げ' | 'ぜ' | 'で' | 'べ' | 'ぺ'
        | 'ぇ' | 'ゑ' | 'e' | 'E' => Vowel::E,
        'お' | 'こ' | 'そ' | 'と' | 'の' | 'ほ' | 'も' | 'よ' | 'ろ' | 'を' | 'ご' | 'ぞ' | 'ど'
        | 'ぼ' | 'ぽ' | 'ぉ' | 'ょ' | 'o' | 'O' => Vowel::O,
        'ん' | 'っ' => return Some(None),
        _ => return None,
    };
    Some(Some(vowel))
}

/// Phoneme sequence for `text`.
///
/// The long-vowel mark `ー` repeats the previous vowel. Small ゃゅょ merge
/// into the preceding kana. Anything else that is not kana is skipped.
pub fn text_to_phonemes(text: &str) -> Vec<Option<Vowel>> {
    let mut out: Vec<Option<Vowel>> = Vec::new();
    for c in text.chars() {
        if c == 'ー' {
            if let Some(&prev) = out.last() {
                out.push(prev);
            }
            continue;
        }
        if matches!(c, 'ゃ' | 'ゅ' | 'ょ' | 'ャ' | 'ュ' | 'ョ')
            && let Some(last) = out.last_mut()
        {
            *last = kana_vowel(c).flatten();
            continue;
        }
        if let Some(vowel) = kana_vowel(c) {
            out.push(vowel);
        }
    }
    out
}

/// Evenly timed mouth walk for `text`.
///
/// Each phoneme lasts `max(chars × 60 ms / phonemes, 80 ms)`.
pub fn phoneme_timeline(text: &str) -> Vec<PhonemeStep> {
    let phonemes = text_to_phonemes(text);
    if phonemes.is_empty() {
        return Vec::new();
    }
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    let count = u32::try_from(phonemes.len()).unwrap_or(u32::MAX);
    let step = (PER_CHAR * chars / count).max(MIN_PHONEME);

    phonemes
        .into_iter()
        .zip(0u32..)
        .map(|(vowel, i)| PhonemeStep {
            vowel,
            start: step * i,
            duration: step,
        })
        .collect()
}

/// Rough spoken length of `text`: 200 ms per character plus one second.
pub fn estimate_duration(text: &str) -> Duration {
    let chars = text.chars().count() as u64;
    Duration::from_millis(chars * ESTIMATE_PER_CHAR_MS + ESTIMATE_PADDING_MS)
}
