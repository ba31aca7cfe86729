//! Streaming synthesis queue.
//!
//! Text from the model is segmented into utterances and appended here.
//! Generation runs ahead of playback: up to `max_concurrent_generations`
//! synthesis calls are in flight at once, always picking the lowest-index
//! utterance that still needs audio. A single playback task plays ready
//! utterances one at a time through the shared [`PlaybackMutex`].
//!
//! Work is event driven. Every state change (enqueue, generation finished,
//! playback finished) calls `pump`, which starts whatever became possible.
//! All queue methods must be called from inside a Tokio runtime.
//!
//! Capacity is a hard bound: inserting beyond `max_queue_size` evicts the
//! oldest utterances whatever their state, so text can be dropped before
//! it is ever spoken when the model outruns playback.

use super::generation::{RetryPolicy, generate_with_retry};
use super::messages::{
    EnqueueReport, QueueSnapshot, UtteranceId, UtteranceStatus, UtteranceView,
};
use crate::audio::clip::{AudioClip, ClipLedger};
use crate::audio::mutex::{PlaybackKind, PlaybackMutex};
use crate::audio::output::{PlaybackOutput, PlaybackRequest};
use crate::config::{AudioFormat, PlaybackOrder, QueueConfig, SpeechConfig, TtsConfig};
use crate::error::SpeechError;
use crate::runtime::RuntimeEvent;
use crate::segmenter::SentenceSegmenter;
use crate::tts::{SynthesisRequest, Synthesizer};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One queued sentence.
#[derive(Debug)]
struct Utterance {
    id: UtteranceId,
    text: String,
    clip: Option<AudioClip>,
    generating: bool,
    playing: bool,
    error: Option<String>,
    /// Cancelled when the utterance is evicted while generating.
    cancel: CancellationToken,
    /// Nonce of the in-flight prefetch this utterance took over.
    prefetch: Option<u64>,
}

impl Utterance {
    fn needs_audio(&self) -> bool {
        self.clip.is_none() && !self.generating && !self.playing && self.error.is_none()
    }

    fn is_ready(&self) -> bool {
        self.clip.is_some() && !self.playing && self.error.is_none()
    }

    fn view(&self) -> UtteranceView {
        let status = if let Some(err) = &self.error {
            UtteranceStatus::Failed(err.clone())
        } else if self.playing {
            UtteranceStatus::Playing
        } else if self.clip.is_some() {
            UtteranceStatus::Ready
        } else if self.generating {
            UtteranceStatus::Generating
        } else {
            UtteranceStatus::Pending
        };
        UtteranceView {
            id: self.id,
            text: self.text.clone(),
            status,
        }
    }
}

/// Speculative synthesis of the segmenter tail.
///
/// Once an utterance takes over an in-flight prefetch it leaves this slot,
/// so a newer speculation never cancels audio somebody is waiting for.
#[derive(Debug)]
struct Prefetch {
    nonce: u64,
    text: String,
    cancel: CancellationToken,
    ready: Option<Bytes>,
}

#[derive(Debug)]
struct QueueState {
    segmenter: SentenceSegmenter,
    items: VecDeque<Utterance>,
    next_id: u64,
    /// Bumped by `clear()`; tasks from an older epoch discard their results.
    epoch: u64,
    cancel: CancellationToken,
    generating: usize,
    player_running: bool,
    playing: Option<UtteranceId>,
    streaming_started: bool,
    last_error: Option<String>,
    prefetch: Option<Prefetch>,
    next_prefetch: u64,
}

struct Shared {
    config: QueueConfig,
    tts: TtsConfig,
    policy: RetryPolicy,
    source_id: String,
    synthesizer: Arc<dyn Synthesizer>,
    output: PlaybackOutput,
    gate: PlaybackMutex,
    ledger: ClipLedger,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    state: Mutex<QueueState>,
    changed: Notify,
}

/// Handle to a streaming synthesis queue. Clones share the same queue.
#[derive(Clone)]
pub struct SynthesisQueue {
    shared: Arc<Shared>,
}

impl SynthesisQueue {
    pub fn new(
        config: &SpeechConfig,
        synthesizer: Arc<dyn Synthesizer>,
        output: PlaybackOutput,
        gate: PlaybackMutex,
    ) -> Self {
        let source_id = format!("streaming-{}", uuid::Uuid::new_v4());
        info!("synthesis queue {source_id} (capacity {})", config.queue.max_queue_size);
        Self {
            shared: Arc::new(Shared {
                config: config.queue.clone(),
                tts: config.tts.clone(),
                policy: RetryPolicy::from_config(&config.tts),
                source_id,
                synthesizer,
                output,
                gate,
                ledger: ClipLedger::new(),
                runtime_tx: None,
                state: Mutex::new(QueueState {
                    segmenter: SentenceSegmenter::new(&config.segmenter),
                    items: VecDeque::new(),
                    next_id: 0,
                    epoch: 0,
                    cancel: CancellationToken::new(),
                    generating: 0,
                    player_running: false,
                    playing: None,
                    streaming_started: false,
                    last_error: None,
                    prefetch: None,
                    next_prefetch: 0,
                }),
                changed: Notify::new(),
            }),
        }
    }

    /// Emit [`RuntimeEvent`]s on `tx`. Call before the queue is shared.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.runtime_tx = Some(tx);
        } else {
            warn!("runtime events attached after the queue was shared; ignored");
        }
        self
    }

    /// Mutex tag used for this queue's playback.
    pub fn source_id(&self) -> &str {
        &self.shared.source_id
    }

    /// Ledger of every clip this queue created.
    pub fn audio_ledger(&self) -> ClipLedger {
        self.shared.ledger.clone()
    }

    /// Feed a text fragment; complete sentences become utterances.
    pub fn enqueue(&self, text: &str) -> EnqueueReport {
        let report = {
            let Some(mut state) = self.lock() else {
                return EnqueueReport::default();
            };
            if !text.is_empty() {
                state.streaming_started = true;
            }
            let result = state.segmenter.add_chunk(text);
            let report = self.push_units(&mut state, result.complete_units);

            if self.shared.config.speculative_prefetch && result.should_prefetch {
                self.start_prefetch(&mut state, result.remainder.trim());
            }
            report
        };
        self.pump();
        report
    }

    /// Flush the segmenter remainder as a final utterance and reset it.
    pub fn finalize(&self) -> EnqueueReport {
        let report = {
            let Some(mut state) = self.lock() else {
                return EnqueueReport::default();
            };
            let units = state.segmenter.finalize();
            let report = self.push_units(&mut state, units);
            state.segmenter.reset();
            report
        };
        self.pump();
        report
    }

    /// Cancel all generation and playback, release the mutex if this queue
    /// holds it, and drop every utterance with its audio.
    ///
    /// Idempotent; safe to call from teardown paths.
    pub fn clear(&self) {
        let (old_cancel, dropped, prefetch) = {
            let Some(mut state) = self.lock() else {
                return;
            };
            state.epoch = state.epoch.wrapping_add(1);
            let old_cancel = std::mem::replace(&mut state.cancel, CancellationToken::new());
            let dropped: Vec<Utterance> = state.items.drain(..).collect();
            state.generating = 0;
            state.player_running = false;
            state.playing = None;
            state.streaming_started = false;
            state.segmenter.reset();
            (old_cancel, dropped, state.prefetch.take())
        };

        old_cancel.cancel();
        if let Some(p) = prefetch {
            p.cancel.cancel();
        }
        let count = dropped.len();
        drop(dropped);

        if self
            .shared
            .gate
            .release_if_held_by(PlaybackKind::Streaming, &self.shared.source_id)
        {
            debug!("released playback mutex on clear");
        }
        if count > 0 {
            info!("queue cleared ({count} utterances dropped)");
        }
        self.emit(RuntimeEvent::QueueCleared);
        self.shared.changed.notify_waiters();
    }

    /// Alias of [`clear`](Self::clear) used on cancellation.
    pub fn stop(&self) {
        self.clear();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let Some(state) = self.lock() else {
            return QueueSnapshot::default();
        };
        QueueSnapshot {
            utterances: state.items.iter().map(Utterance::view).collect(),
            is_generating: state.generating > 0
                || state.items.iter().any(|u| u.generating)
                || state.prefetch.as_ref().is_some_and(|p| p.ready.is_none()),
            is_playing: state.playing.is_some(),
            streaming_started: state.streaming_started,
            last_error: state.last_error.clone(),
        }
    }

    /// Resolve once nothing is generating or playing and every remaining
    /// utterance has failed.
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.shared.changed.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    fn is_settled(&self) -> bool {
        let Some(state) = self.lock() else {
            return true;
        };
        state.generating == 0
            && !state.player_running
            && state.items.iter().all(|u| u.error.is_some())
    }

    fn lock(&self) -> Option<MutexGuard<'_, QueueState>> {
        match self.shared.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                error!("synthesis queue state poisoned");
                None
            }
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.shared.runtime_tx {
            let _ = tx.send(event);
        }
    }

    fn push_units(&self, state: &mut QueueState, units: Vec<String>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for text in units {
            let id = UtteranceId(state.next_id);
            state.next_id += 1;

            let mut utterance = Utterance {
                id,
                text,
                clip: None,
                generating: false,
                playing: false,
                error: None,
                cancel: state.cancel.child_token(),
                prefetch: None,
            };

            debug!("queued {id}: {}", utterance.text);
            self.emit(RuntimeEvent::UtteranceQueued {
                id,
                text: utterance.text.clone(),
            });
            self.adopt_prefetch(state, &mut utterance);
            state.items.push_back(utterance);
            report.queued.push(id);

            while state.items.len() > self.shared.config.max_queue_size {
                let Some(evicted) = state.items.pop_front() else {
                    break;
                };
                warn!("queue full, evicting {}: {}", evicted.id, evicted.text);
                evicted.cancel.cancel();
                self.emit(RuntimeEvent::UtteranceEvicted { id: evicted.id });
                report.evicted.push(evicted.id);
            }
        }
        report
    }

    /// Attach a matching speculative result to a new utterance, or discard
    /// the speculation if the real sentence turned out different.
    ///
    /// An in-flight speculation is handed to the utterance: its token becomes
    /// the utterance's token and the prefetch slot is freed.
    fn adopt_prefetch(&self, state: &mut QueueState, utterance: &mut Utterance) {
        let Some(prefetch) = state.prefetch.take() else {
            return;
        };
        if prefetch.text != utterance.text {
            debug!("prefetch for '{}' discarded", prefetch.text);
            prefetch.cancel.cancel();
            return;
        }
        let id = utterance.id;
        self.emit(RuntimeEvent::GenerationStarted { id });
        match prefetch.ready {
            Some(bytes) => {
                debug!("{id} reuses prefetched audio");
                utterance.clip = Some(self.register(bytes));
                self.emit(RuntimeEvent::GenerationFinished { id });
            }
            None => {
                debug!("{id} waits for prefetch {}", prefetch.nonce);
                utterance.generating = true;
                utterance.cancel = prefetch.cancel;
                utterance.prefetch = Some(prefetch.nonce);
            }
        }
    }

    fn start_prefetch(&self, state: &mut QueueState, text: &str) {
        if text.is_empty() || state.prefetch.as_ref().is_some_and(|p| p.text == text) {
            return;
        }
        if let Some(old) = state.prefetch.take() {
            old.cancel.cancel();
        }
        let nonce = state.next_prefetch;
        state.next_prefetch += 1;
        let cancel = state.cancel.child_token();
        state.prefetch = Some(Prefetch {
            nonce,
            text: text.to_owned(),
            cancel: cancel.clone(),
            ready: None,
        });

        debug!("prefetching tail '{text}'");
        let queue = self.clone();
        let epoch = state.epoch;
        let request = SynthesisRequest::new(text, &self.shared.tts);
        tokio::spawn(async move {
            let result = generate_with_retry(
                queue.shared.synthesizer.as_ref(),
                &request,
                &queue.shared.policy,
                &cancel,
            )
            .await;
            queue.finish_prefetch(epoch, nonce, result);
        });
    }

    fn finish_prefetch(&self, epoch: u64, nonce: u64, result: crate::Result<Bytes>) {
        {
            let Some(mut state) = self.lock() else {
                return;
            };
            if state.epoch != epoch {
                return;
            }

            if let Some(prefetch) = state.prefetch.as_mut().filter(|p| p.nonce == nonce) {
                match result {
                    Ok(bytes) => prefetch.ready = Some(bytes),
                    Err(e) => {
                        debug!("prefetch failed: {e}");
                        state.prefetch = None;
                    }
                }
            } else if let Some(item) = state.items.iter_mut().find(|u| u.prefetch == Some(nonce)) {
                let id = item.id;
                item.prefetch = None;
                item.generating = false;
                match result {
                    Ok(bytes) => {
                        item.clip = Some(self.register(bytes));
                        debug!("generated {id} from prefetch");
                        self.emit(RuntimeEvent::GenerationFinished { id });
                    }
                    // Not evicted or cleared, so `pump` generates it afresh.
                    Err(SpeechError::Cancelled) => {}
                    Err(e) => {
                        let message = e.to_string();
                        warn!("generation failed for {id}: {message}");
                        item.error = Some(message.clone());
                        state.last_error = Some(message.clone());
                        self.emit(RuntimeEvent::GenerationFailed { id, error: message });
                    }
                }
            } else {
                return;
            }
        }
        self.shared.changed.notify_waiters();
        self.pump();
    }

    fn register(&self, bytes: Bytes) -> AudioClip {
        let format: AudioFormat = self.shared.tts.format;
        self.shared.ledger.register(format, bytes)
    }

    /// Start generation and playback work that became possible.
    fn pump(&self) {
        let Some(mut state) = self.lock() else {
            return;
        };
        let epoch = state.epoch;

        while state.generating < self.shared.config.max_concurrent_generations {
            let Some(item) = state.items.iter_mut().find(|u| u.needs_audio()) else {
                break;
            };
            item.generating = true;
            let id = item.id;
            let request = SynthesisRequest::new(item.text.clone(), &self.shared.tts);
            let cancel = item.cancel.clone();
            state.generating += 1;

            debug!("generating {id}");
            self.emit(RuntimeEvent::GenerationStarted { id });
            let queue = self.clone();
            tokio::spawn(async move {
                let result = generate_with_retry(
                    queue.shared.synthesizer.as_ref(),
                    &request,
                    &queue.shared.policy,
                    &cancel,
                )
                .await;
                queue.finish_generation(epoch, id, result);
            });
        }

        if !state.player_running && self.next_playable(&state).is_some() {
            state.player_running = true;
            let cancel = state.cancel.clone();
            let queue = self.clone();
            tokio::spawn(async move {
                queue.run_player(epoch, cancel).await;
            });
        }
    }

    fn finish_generation(&self, epoch: u64, id: UtteranceId, result: crate::Result<Bytes>) {
        {
            let Some(mut state) = self.lock() else {
                return;
            };
            if state.epoch != epoch {
                return;
            }
            state.generating = state.generating.saturating_sub(1);

            let clip = match &result {
                Ok(bytes) => Some(self.register(bytes.clone())),
                Err(_) => None,
            };
            let Some(item) = state.items.iter_mut().find(|u| u.id == id) else {
                debug!("{id} left the queue before its audio arrived");
                drop(state);
                self.shared.changed.notify_waiters();
                self.pump();
                return;
            };
            item.generating = false;

            match result {
                Ok(_) => {
                    item.clip = clip;
                    debug!("generated {id}");
                    self.emit(RuntimeEvent::GenerationFinished { id });
                }
                Err(SpeechError::Cancelled) => {}
                Err(e) => {
                    let message = e.to_string();
                    warn!("generation failed for {id}: {message}");
                    item.error = Some(message.clone());
                    state.last_error = Some(message.clone());
                    self.emit(RuntimeEvent::GenerationFailed { id, error: message });
                }
            }
        }
        self.shared.changed.notify_waiters();
        self.pump();
    }

    fn next_playable(&self, state: &QueueState) -> Option<UtteranceId> {
        if state.playing.is_some() {
            return None;
        }
        match self.shared.config.playback_order {
            PlaybackOrder::Strict => state
                .items
                .iter()
                .find(|u| u.error.is_none())
                .filter(|u| u.is_ready())
                .map(|u| u.id),
            PlaybackOrder::ReadyFirst => state.items.iter().find(|u| u.is_ready()).map(|u| u.id),
        }
    }

    async fn run_player(&self, epoch: u64, cancel: CancellationToken) {
        let retry = Duration::from_millis(self.shared.config.mutex_retry_ms.max(1));

        loop {
            {
                let Some(mut state) = self.lock() else {
                    return;
                };
                if state.epoch != epoch {
                    return;
                }
                if self.next_playable(&state).is_none() {
                    state.player_running = false;
                    drop(state);
                    self.shared.changed.notify_waiters();
                    return;
                }
            }

            // Hold the utterance in the queue until the mutex is granted.
            let guard = loop {
                if let Some(guard) = self
                    .shared
                    .gate
                    .try_acquire(PlaybackKind::Streaming, &self.shared.source_id)
                {
                    break guard;
                }
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(retry) => {}
                }
            };

            let (id, clip, text) = {
                let Some(mut state) = self.lock() else {
                    return;
                };
                if state.epoch != epoch {
                    return;
                }
                let Some(id) = self.next_playable(&state) else {
                    continue;
                };
                let Some(item) = state.items.iter_mut().find(|u| u.id == id) else {
                    continue;
                };
                let Some(clip) = item.clip.take() else {
                    continue;
                };
                item.playing = true;
                let text = item.text.clone();
                state.playing = Some(id);
                (id, clip, text)
            };

            info!("playing {id}: {text}");
            self.emit(RuntimeEvent::PlaybackStarted { id });
            self.shared.changed.notify_waiters();

            let result = match self.shared.output.select() {
                Some(sink) => {
                    let request = PlaybackRequest { clip, text };
                    tokio::select! {
                        () = cancel.cancelled() => Err(SpeechError::Cancelled),
                        result = sink.play(request, cancel.clone()) => result,
                    }
                }
                None => {
                    drop(clip);
                    Err(SpeechError::Playback("no playback device".into()))
                }
            };
            drop(guard);

            {
                let Some(mut state) = self.lock() else {
                    return;
                };
                if state.epoch != epoch {
                    return;
                }
                state.playing = None;
                state.items.retain(|u| u.id != id);
                match result {
                    Ok(()) => {
                        debug!("finished {id}");
                        self.emit(RuntimeEvent::PlaybackFinished { id });
                    }
                    Err(SpeechError::Cancelled) => {}
                    Err(e) => {
                        let message = e.to_string();
                        error!("playback failed for {id}: {message}");
                        state.last_error = Some(message.clone());
                        self.emit(RuntimeEvent::PlaybackFailed { id, error: message });
                    }
                }
            }
            self.shared.changed.notify_waiters();
            self.pump();
        }
    }
}

impl std::fmt::Debug for SynthesisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisQueue")
            .field("source_id", &self.shared.source_id)
            .field("output", &self.shared.output)
            .finish_non_exhaustive()
    }
}
