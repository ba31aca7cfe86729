//! Sentence segmentation of a streaming text source.
//!
//! Text arrives in arbitrary fragments (an LLM token stream). The segmenter
//! buffers it and cuts complete, speakable units at delimiter characters once
//! they reach a minimum length. Whatever trails the last cut is scored for
//! "how finished does this look" so callers can synthesize speculatively
//! before the delimiter shows up.

use crate::config::SegmenterConfig;

/// Characters that separate clauses inside a sentence.
const CLAUSE_SEPARATORS: &[char] = &['、', '，', ',', ';', '；'];

/// Single-character Japanese particles.
const PARTICLES: &[char] = &['は', 'が', 'を', 'に', 'へ', 'と', 'で', 'も', 'の'];

/// Sentence-final endings that usually precede a full stop.
const SENTENCE_ENDINGS: &[&str] = &["です", "ます", "である", "だ", "た", "る"];

/// Lengths (in characters) of a typical spoken sentence.
const TYPICAL_MIN_CHARS: usize = 10;
const TYPICAL_MAX_CHARS: usize = 50;

/// Outcome of feeding one fragment into the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResult {
    /// Units closed by this fragment, in input order.
    pub complete_units: Vec<String>,
    /// Text after the last emitted unit.
    pub remainder: String,
    /// Heuristic score in `0.0..=1.0` that the remainder is already a sentence.
    pub completeness: f32,
    /// `completeness` crossed the configured prefetch trigger.
    pub should_prefetch: bool,
}

/// Inspectable segmenter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterState {
    pub buffer: String,
    /// Byte offset into `buffer` already turned into units.
    pub cursor: usize,
    pub remainder: String,
}

/// Stateful buffer turning fragments into complete units.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    delimiters: Vec<char>,
    min_len: usize,
    prefetch_trigger: f32,
    buffer: String,
    cursor: usize,
}

impl SentenceSegmenter {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            delimiters: config.delimiters.chars().collect(),
            min_len: config.min_sentence_length,
            prefetch_trigger: config.prefetch_trigger,
            buffer: String::new(),
            cursor: 0,
        }
    }

    /// Append a fragment and extract every unit it completes.
    pub fn add_chunk(&mut self, chunk: &str) -> SegmentResult {
        self.buffer.push_str(chunk);

        let mut complete_units = Vec::new();
        // Byte offset (relative to the buffer) where the next delimiter search begins.
        let mut search_from = self.cursor;

        while let Some((delim_at, delim_len)) = self.find_delimiter(search_from) {
            let candidate = self.buffer[self.cursor..delim_at].trim();
            if candidate.chars().count() >= self.min_len {
                complete_units.push(candidate.to_owned());
                self.cursor = delim_at + delim_len;
                search_from = self.cursor;
            } else {
                // Too short: keep it attached to whatever comes next.
                search_from = delim_at + delim_len;
            }
        }

        let remainder = self.remainder().to_owned();
        let completeness = completeness_score(&remainder, self.min_len);
        SegmentResult {
            complete_units,
            remainder,
            completeness,
            should_prefetch: completeness >= self.prefetch_trigger,
        }
    }

    /// Flush the remainder as a unit if it is long enough.
    ///
    /// A remainder shorter than the minimum is left in place (and dropped by
    /// the next [`reset`](Self::reset)).
    pub fn finalize(&mut self) -> Vec<String> {
        let tail = self.remainder().trim();
        if tail.chars().count() >= self.min_len {
            let unit = tail.to_owned();
            self.cursor = self.buffer.len();
            vec![unit]
        } else {
            Vec::new()
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Unconsumed suffix of the buffer.
    pub fn remainder(&self) -> &str {
        &self.buffer[self.cursor..]
    }

    pub fn state(&self) -> SegmenterState {
        SegmenterState {
            buffer: self.buffer.clone(),
            cursor: self.cursor,
            remainder: self.remainder().to_owned(),
        }
    }

    fn find_delimiter(&self, from: usize) -> Option<(usize, usize)> {
        self.buffer[from..]
            .char_indices()
            .find(|(_, c)| self.delimiters.contains(c))
            .map(|(i, c)| (from + i, c.len_utf8()))
    }
}

/// Weighted sum of independent "looks like a sentence" indicators, capped at 1.
pub fn completeness_score(text: &str, min_len: usize) -> f32 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    let chars = text.chars().count();

    let mut score = 0.0f32;
    if chars >= min_len {
        score += 0.3;
    }
    if text.contains(CLAUSE_SEPARATORS) {
        score += 0.2;
    }
    if text.contains(PARTICLES) {
        score += 0.2;
    }
    if (TYPICAL_MIN_CHARS..=TYPICAL_MAX_CHARS).contains(&chars) {
        score += 0.2;
    }
    if SENTENCE_ENDINGS.iter().any(|ending| text.ends_with(ending)) {
        score += 0.1;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn segmenter() -> SentenceSegmenter {
        SentenceSegmenter::new(&SegmenterConfig::default())
    }

    fn visible(text: &str, delimiters: &str) -> String {
        text.chars()
            .filter(|c| !c.is_whitespace() && !delimiters.contains(*c))
            .collect()
    }

    #[test]
    fn splits_two_japanese_sentences() {
        let mut seg = segmenter();
        let result = seg.add_chunk("こんにちは。元気ですか？");
        assert_eq!(result.complete_units, vec!["こんにちは", "元気ですか"]);
        assert_eq!(result.remainder, "");
        assert_eq!(result.completeness, 0.0);
        assert!(seg.finalize().is_empty());
    }

    #[test]
    fn units_complete_across_fragments() {
        let mut seg = segmenter();
        assert!(seg.add_chunk("こんに").complete_units.is_empty());
        assert!(seg.add_chunk("ちは").complete_units.is_empty());
        let result = seg.add_chunk("。元気");
        assert_eq!(result.complete_units, vec!["こんにちは"]);
        assert_eq!(result.remainder, "元気");
    }

    #[test]
    fn short_match_is_carried_into_next_unit() {
        let mut seg = segmenter();
        let result = seg.add_chunk("はい。わかりました。");
        assert_eq!(result.complete_units, vec!["はい。わかりました"]);
    }

    #[test]
    fn newline_is_a_delimiter() {
        let mut seg = segmenter();
        let result = seg.add_chunk("first line\nsecond line\n");
        assert_eq!(result.complete_units, vec!["first line", "second line"]);
    }

    #[test]
    fn finalize_flushes_long_remainder_once() {
        let mut seg = segmenter();
        seg.add_chunk("終わりのない文章");
        assert_eq!(seg.finalize(), vec!["終わりのない文章"]);
        assert!(seg.finalize().is_empty());
        assert_eq!(seg.remainder(), "");
    }

    #[test]
    fn finalize_discards_short_remainder() {
        let mut seg = segmenter();
        seg.add_chunk("はい");
        assert!(seg.finalize().is_empty());
        assert_eq!(seg.remainder(), "はい");
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut seg = segmenter();
        let result = seg.add_chunk("");
        assert!(result.complete_units.is_empty());
        assert!(!result.should_prefetch);
        assert!(seg.finalize().is_empty());
    }

    #[test]
    fn reset_clears_buffer_and_cursor() {
        let mut seg = segmenter();
        seg.add_chunk("こんにちは。途中");
        seg.reset();
        let state = seg.state();
        assert_eq!(state.buffer, "");
        assert_eq!(state.cursor, 0);
        assert_eq!(state.remainder, "");
    }

    #[test]
    fn cursor_never_exceeds_buffer() {
        let mut seg = segmenter();
        for chunk in ["あいうえお。", "かきく", "けこ！", "", "\n\n", "さしすせそ"] {
            seg.add_chunk(chunk);
            let state = seg.state();
            assert!(state.cursor <= state.buffer.len());
        }
    }

    #[test]
    fn no_characters_lost_for_any_chunking() {
        let input = "今日は晴れです。明日は雨かもしれません！はい。それでは、また明日会いましょう？ね";
        let delimiters = SegmenterConfig::default().delimiters;
        let chars: Vec<char> = input.chars().collect();
        for split in 0..=chars.len() {
            let (a, b): (String, String) = (
                chars[..split].iter().collect(),
                chars[split..].iter().collect(),
            );
            let mut seg = segmenter();
            let mut units = seg.add_chunk(&a).complete_units;
            units.extend(seg.add_chunk(&b).complete_units);
            units.extend(seg.finalize());
            let discarded = seg.remainder().to_owned();

            let accounted = format!("{}{}", units.concat(), discarded);
            assert_eq!(
                visible(&accounted, &delimiters),
                visible(input, &delimiters),
                "split at {split}"
            );
        }
    }

    #[test]
    fn completeness_indicators_accumulate() {
        // length >= 5, particle, sentence ending; nine chars is below typical.
        let score = completeness_score("私は学校に行きます", 5);
        assert!((score - 0.6).abs() < 1e-6, "score = {score}");
        // All indicators.
        let score = completeness_score("今日は、学校に行きます", 5);
        assert!((score - 1.0).abs() < 1e-6, "score = {score}");
        // Short fragment with nothing else.
        assert_eq!(completeness_score("えっ", 5), 0.0);
    }

    #[test]
    fn prefetch_flag_follows_trigger() {
        let mut seg = segmenter();
        let result = seg.add_chunk("今日は、学校に行きます");
        assert!(result.should_prefetch);
        assert!(result.complete_units.is_empty());

        let mut strict = SentenceSegmenter::new(&SegmenterConfig {
            prefetch_trigger: 1.0,
            ..SegmenterConfig::default()
        });
        assert!(!strict.add_chunk("私は学校に行きます").should_prefetch);
    }
}
