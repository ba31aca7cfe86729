//! Volume and vowel estimation from the audible signal.
//!
//! Each tick reads the newest samples from a [`SignalTap`]:
//!
//! - **Volume** mixes peak and RMS (`0.7·peak + 0.3·rms`) and squashes the
//!   result through `1 / (1 + e^(-35x + 3))`. Values under 0.03 become 0.
//! - **Vowel** takes the strongest bin in the F1 band (200–1000 Hz) and in
//!   the F2 band (800–2500 Hz) and picks the nearest of five reference
//!   formant pairs. When the mean bin amplitude is below −40 dB there is
//!   no vowel.
//!
//! The analyzer only reads; it makes no playback decisions.

use super::Vowel;
use crate::audio::SignalTap;
use crate::config::LipSyncConfig;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const F1_BAND: (f32, f32) = (200.0, 1000.0);
const F2_BAND: (f32, f32) = (800.0, 2500.0);

/// Average (F1, F2) in Hz per vowel.
const FORMANTS: [(Vowel, f32, f32); 5] = [
    (Vowel::A, 730.0, 1090.0),
    (Vowel::I, 240.0, 2400.0),
    (Vowel::U, 300.0, 870.0),
    (Vowel::E, 530.0, 1840.0),
    (Vowel::O, 500.0, 1000.0),
];

const SILENCE_DB: f32 = -40.0;
/// dB range mapped linearly onto a 0..1 confidence factor.
const FLOOR_DB: f32 = -60.0;
const RANGE_DB: f32 = 40.0;

const VOLUME_FLOOR: f32 = 0.03;

/// One analyzer tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LipSyncReading {
    pub volume: f32,
    pub phoneme: Option<Vowel>,
    /// `None` when nothing is playing; `Some(0.0)` for audible silence.
    pub confidence: Option<f32>,
}

impl LipSyncReading {
    pub const IDLE: Self = Self {
        volume: 0.0,
        phoneme: None,
        confidence: None,
    };
}

/// Per-tick magnitude spectrum. Not retained past the tick.
#[derive(Debug, Clone)]
pub struct FrequencyFrame {
    /// Amplitude-normalized magnitude per bin, in dB.
    pub magnitudes_db: Vec<f32>,
    /// Width of one bin in Hz.
    pub bin_hz: f32,
}

pub struct SpectralAnalyzer {
    tap: SignalTap,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    time_domain_len: usize,
    window: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(tap: SignalTap, config: &LipSyncConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        Self {
            tap,
            fft: planner.plan_fft_forward(fft_size),
            fft_size,
            time_domain_len: config.time_domain_len.max(1),
            window: blackman_window(fft_size),
        }
    }

    pub fn is_active(&self) -> bool {
        self.tap.is_active()
    }

    /// Analyze whatever is audible right now.
    pub fn sample_tick(&self) -> LipSyncReading {
        if !self.tap.is_active() {
            return LipSyncReading::IDLE;
        }
        let samples = self.tap.latest(self.fft_size.max(self.time_domain_len));
        let skip = samples.len().saturating_sub(self.time_domain_len);
        let volume = compute_volume(&samples[skip..]);

        let frame = self.frequency_frame(&samples, self.tap.sample_rate());
        let (phoneme, confidence) = estimate_phoneme(&frame);
        LipSyncReading {
            volume,
            phoneme,
            confidence: Some(confidence),
        }
    }

    /// Windowed FFT over the newest `fft_size` samples (zero-padded in front).
    pub fn frequency_frame(&self, samples: &[f32], sample_rate: u32) -> FrequencyFrame {
        let n = self.fft_size;
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();

        let mut buf: Vec<Complex32> = (0..n)
            .map(|i| {
                let s = if i < pad { 0.0 } else { tail[i - pad] };
                Complex32::new(s * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut buf);

        let window_sum: f32 = self.window.iter().sum::<f32>().max(f32::EPSILON);
        let magnitudes_db = buf
            .iter()
            .take(n / 2)
            .map(|c| to_db(2.0 * c.norm() / window_sum))
            .collect();

        FrequencyFrame {
            magnitudes_db,
            bin_hz: sample_rate as f32 / n as f32,
        }
    }
}

/// Perceptual mouth-opening volume in `[0, 1]`.
pub fn compute_volume(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    let x = 0.7 * peak + 0.3 * rms;
    let volume = 1.0 / (1.0 + (-35.0 * x + 3.0).exp());
    if volume < VOLUME_FLOOR { 0.0 } else { volume }
}

/// Nearest vowel for the F1/F2 peaks of `frame`, with a confidence in `[0, 1]`.
pub fn estimate_phoneme(frame: &FrequencyFrame) -> (Option<Vowel>, f32) {
    let energy_db = mean_level_db(&frame.magnitudes_db);
    if energy_db < SILENCE_DB {
        return (None, 0.0);
    }

    let (Some((f1, f1_db)), Some((f2, f2_db))) = (
        band_peak(frame, F1_BAND),
        band_peak(frame, F2_BAND),
    ) else {
        return (None, 0.0);
    };

    let vowel = FORMANTS
        .iter()
        .map(|&(v, rf1, rf2)| (v, (f1 - rf1).hypot(f2 - rf2)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(v, _)| v);

    let energy_factor = db_factor(energy_db);
    let clarity_factor = db_factor((f1_db + f2_db) / 2.0);
    (vowel, (energy_factor + clarity_factor) / 2.0)
}

/// Frequency and level of the strongest bin within `[lo, hi]` Hz.
fn band_peak(frame: &FrequencyFrame, (lo, hi): (f32, f32)) -> Option<(f32, f32)> {
    if frame.bin_hz <= 0.0 {
        return None;
    }
    let first = (lo / frame.bin_hz).ceil() as usize;
    let last = ((hi / frame.bin_hz).floor() as usize).min(frame.magnitudes_db.len().checked_sub(1)?);
    (first..=last)
        .map(|bin| (bin, frame.magnitudes_db[bin]))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(bin, db)| (bin as f32 * frame.bin_hz, db))
}

/// Mean linear amplitude of all bins, back in dB.
fn mean_level_db(magnitudes_db: &[f32]) -> f32 {
    if magnitudes_db.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum: f32 = magnitudes_db.iter().map(|db| 10f32.powf(db / 20.0)).sum();
    to_db(sum / magnitudes_db.len() as f32)
}

fn db_factor(db: f32) -> f32 {
    ((db - FLOOR_DB) / RANGE_DB).clamp(0.0, 1.0)
}

fn to_db(mag: f32) -> f32 {
    20.0 * mag.max(1e-10).log10()
}

fn blackman_window(n: usize) -> Vec<f32> {
    let denom = (n.max(2) - 1) as f32;
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / denom;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}
