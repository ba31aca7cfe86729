//! Owned synthesized audio with exactly-once release accounting.
//!
//! Every clip produced by a synthesizer is registered in a [`ClipLedger`].
//! Dropping the clip marks it released; since a clip cannot be cloned,
//! release happens once per clip no matter which path discards it
//! (played, evicted, cleared, or never played at all).

use crate::config::AudioFormat;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every clip created through the same ledger.
#[derive(Debug, Clone, Default)]
pub struct ClipLedger {
    inner: Arc<LedgerCounters>,
}

#[derive(Debug, Default)]
struct LedgerCounters {
    created: AtomicU64,
    released: AtomicU64,
}

impl ClipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap encoded bytes into a tracked clip.
    pub fn register(&self, format: AudioFormat, bytes: Bytes) -> AudioClip {
        let id = self.inner.created.fetch_add(1, Ordering::AcqRel);
        AudioClip {
            id,
            format,
            bytes,
            ledger: Arc::clone(&self.inner),
        }
    }

    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::Acquire)
    }

    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Clips that are still alive somewhere.
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.released())
    }
}

/// Encoded audio for one utterance.
#[derive(Debug)]
pub struct AudioClip {
    id: u64,
    format: AudioFormat,
    bytes: Bytes,
    ledger: Arc<LedgerCounters>,
}

impl AudioClip {
    /// Ledger-local sequence number.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Encoded bytes (cheap to clone).
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for AudioClip {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::AcqRel);
    }
}
