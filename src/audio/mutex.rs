//! Process-wide single-voice playback gate.
//!
//! Every path that wants to make the avatar speak (the streaming queue and
//! the legacy single-shot speaker) asks this gate first. A request is granted
//! only when nobody holds it. Legacy requests are additionally refused while
//! a streaming holder is active or released less than the grace window ago,
//! so a slow legacy fallback cannot talk over streaming output that is about
//! to continue.
//!
//! Handles are cheap clones of one shared state; inject the same handle into
//! every queue and speaker that must be mutually exclusive. [`PlaybackMutex::global`]
//! provides the process singleton for callers that have nowhere to inject from.

use crate::config::PlaybackConfig;
use crate::pipeline::messages::StreamingState;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default suppression window for legacy playback after streaming released.
pub const DEFAULT_LEGACY_GRACE: Duration = Duration::from_millis(1_000);

static GLOBAL: OnceLock<PlaybackMutex> = OnceLock::new();

/// Which synthesis path is asking for the speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackKind {
    /// Sentence-by-sentence queue fed by a text stream.
    Streaming,
    /// Single-shot synthesize-and-play of a whole response.
    Legacy,
}

impl fmt::Display for PlaybackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => f.write_str("streaming"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStatus {
    pub playing: bool,
    pub kind: Option<PlaybackKind>,
    pub source: Option<String>,
}

#[derive(Debug)]
struct Holder {
    kind: PlaybackKind,
    source: String,
    ticket: u64,
}

#[derive(Debug, Default)]
struct GateState {
    holder: Option<Holder>,
    next_ticket: u64,
    last_kind: Option<PlaybackKind>,
    last_streaming_release: Option<Instant>,
}

/// Shared handle to the playback gate.
#[derive(Debug, Clone)]
pub struct PlaybackMutex {
    inner: Arc<Mutex<GateState>>,
    legacy_grace: Duration,
}

impl Default for PlaybackMutex {
    fn default() -> Self {
        Self::with_grace(DEFAULT_LEGACY_GRACE)
    }
}

impl PlaybackMutex {
    /// A fresh, isolated gate with the default grace window.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace(legacy_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateState::default())),
            legacy_grace,
        }
    }

    /// A fresh gate using `playback.legacy_grace_ms`.
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::with_grace(Duration::from_millis(config.legacy_grace_ms))
    }

    /// The process-wide gate, created with the default grace window unless
    /// [`PlaybackMutex::init_global`] ran first.
    pub fn global() -> Self {
        GLOBAL.get_or_init(PlaybackMutex::new).clone()
    }

    /// Create the process-wide gate from `config` and return it.
    ///
    /// Only the first initialisation wins; later calls log and return the
    /// existing gate.
    pub fn init_global(config: &PlaybackConfig) -> Self {
        let wanted = Duration::from_millis(config.legacy_grace_ms);
        let gate = GLOBAL.get_or_init(|| Self::with_grace(wanted)).clone();
        if gate.legacy_grace != wanted {
            warn!(
                "global playback mutex already created with {:?} grace, ignoring {wanted:?}",
                gate.legacy_grace
            );
        }
        gate
    }

    pub fn legacy_grace(&self) -> Duration {
        self.legacy_grace
    }

    /// Try to take the gate. `None` means "not now"; it is never an error.
    pub fn try_acquire(&self, kind: PlaybackKind, source: &str) -> Option<PlaybackGuard> {
        let Ok(mut state) = self.inner.lock() else {
            warn!("playback mutex poisoned, denying {kind}/{source}");
            return None;
        };

        if let Some(holder) = &state.holder {
            warn!(
                "playback denied for {kind}/{source}: held by {}/{}",
                holder.kind, holder.source
            );
            return None;
        }

        if kind == PlaybackKind::Legacy
            && state.last_kind == Some(PlaybackKind::Streaming)
            && let Some(released) = state.last_streaming_release
            && released.elapsed() < self.legacy_grace
        {
            warn!("playback denied for legacy/{source}: streaming released {:?} ago", released.elapsed());
            return None;
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.holder = Some(Holder {
            kind,
            source: source.to_owned(),
            ticket,
        });
        state.last_kind = Some(kind);
        debug!("playback granted to {kind}/{source}");

        Some(PlaybackGuard {
            gate: self.clone(),
            kind,
            ticket,
        })
    }

    /// Run `f` while holding the gate.
    ///
    /// Returns `None` without polling `f` when the gate is not granted. The
    /// hold is released when `f` completes, fails, or is dropped mid-flight;
    /// whatever `f` returns (including its errors) is handed back unchanged.
    pub async fn acquire_and_run<F, Fut, T>(&self, kind: PlaybackKind, source: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.try_acquire(kind, source)?;
        let out = f().await;
        drop(guard);
        Some(out)
    }

    /// Release only if the current holder matches `(kind, source)`.
    ///
    /// Returns whether anything was released. Used by `clear()` paths that
    /// must not free a hold taken by someone else.
    pub fn release_if_held_by(&self, kind: PlaybackKind, source: &str) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        let matches = state
            .holder
            .as_ref()
            .is_some_and(|h| h.kind == kind && h.source == source);
        if matches {
            Self::release_locked(&mut state, kind);
            debug!("playback released by {kind}/{source}");
        }
        matches
    }

    /// Drop any hold regardless of owner.
    pub fn force_release(&self) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if let Some(holder) = state.holder.take() {
            warn!("playback force-released from {}/{}", holder.kind, holder.source);
            if holder.kind == PlaybackKind::Streaming {
                state.last_streaming_release = Some(Instant::now());
            }
        }
    }

    pub fn status(&self) -> AudioStatus {
        let Ok(state) = self.inner.lock() else {
            return AudioStatus {
                playing: false,
                kind: None,
                source: None,
            };
        };
        AudioStatus {
            playing: state.holder.is_some(),
            kind: state.holder.as_ref().map(|h| h.kind),
            source: state.holder.as_ref().map(|h| h.source.clone()),
        }
    }

    pub fn is_streaming_active(&self) -> bool {
        self.status().kind == Some(PlaybackKind::Streaming)
    }

    /// Whether a legacy utterance may start after the fallback delay.
    ///
    /// True only when the streaming path is completely idle: never started,
    /// not playing, not generating, nothing queued, and not holding the gate.
    pub fn should_allow_fallback(&self, streaming: &StreamingState) -> bool {
        let idle = !streaming.started
            && !streaming.playing
            && !streaming.generating
            && !streaming.has_queue
            && !self.is_streaming_active();
        debug!(?streaming, idle, "fallback check");
        idle
    }

    fn release_ticket(&self, kind: PlaybackKind, ticket: u64) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if state.holder.as_ref().is_some_and(|h| h.ticket == ticket) {
            Self::release_locked(&mut state, kind);
        }
    }

    fn release_locked(state: &mut GateState, kind: PlaybackKind) {
        state.holder = None;
        if kind == PlaybackKind::Streaming {
            state.last_streaming_release = Some(Instant::now());
        }
    }
}

/// Proof of holding the gate; releases on drop.
///
/// A guard whose hold was already force-released (or released by
/// `release_if_held_by`) does nothing on drop, so it cannot free a later
/// holder's grant.
#[derive(Debug)]
#[must_use = "the playback gate is released as soon as the guard is dropped"]
pub struct PlaybackGuard {
    gate: PlaybackMutex,
    kind: PlaybackKind,
    ticket: u64,
}

impl PlaybackGuard {
    pub fn kind(&self) -> PlaybackKind {
        self.kind
    }
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        self.gate.release_ticket(self.kind, self.ticket);
    }
}
