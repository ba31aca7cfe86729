//! A tap on the audible signal for live analysis.
//!
//! The output path writes every sample it renders; the lip-sync analyzer
//! reads the most recent window. Only the newest `capacity` samples are kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct SignalTap {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
    sample_rate: Arc<AtomicU32>,
    active: Arc<AtomicBool>,
}

impl SignalTap {
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
            sample_rate: Arc::new(AtomicU32::new(sample_rate)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the start of a clip.
    pub fn begin(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.clear();
        self.active.store(true, Ordering::Release);
    }

    /// Mark the end of a clip; the analyzer sees silence from now on.
    pub fn end(&self) {
        self.active.store(false, Ordering::Release);
        self.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn push(&self, rendered: &[f32]) {
        let Ok(mut buf) = self.samples.lock() else {
            return;
        };
        let skip = rendered.len().saturating_sub(self.capacity);
        buf.extend(rendered[skip..].iter().copied());
        let excess = buf.len().saturating_sub(self.capacity);
        buf.drain(..excess);
    }

    /// Copy the newest `len` samples (fewer if not enough were written).
    pub fn latest(&self, len: usize) -> Vec<f32> {
        let Ok(buf) = self.samples.lock() else {
            return Vec::new();
        };
        let skip = buf.len().saturating_sub(len);
        buf.iter().skip(skip).copied().collect()
    }

    fn clear(&self) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_newest_samples() {
        let tap = SignalTap::new(4, 24_000);
        tap.push(&[1.0, 2.0, 3.0]);
        tap.push(&[4.0, 5.0, 6.0]);
        assert_eq!(tap.latest(10), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(tap.latest(2), vec![5.0, 6.0]);
    }

    #[test]
    fn end_clears_and_deactivates() {
        let tap = SignalTap::new(8, 24_000);
        tap.begin(16_000);
        tap.push(&[0.5; 4]);
        assert!(tap.is_active());
        assert_eq!(tap.sample_rate(), 16_000);
        tap.end();
        assert!(!tap.is_active());
        assert!(tap.latest(8).is_empty());
    }
}
