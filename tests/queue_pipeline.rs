//! End-to-end behaviour of the streaming synthesis queue.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use avatar_voice::pipeline::{TextEvent, UtteranceStatus, run_text_stage};
use avatar_voice::{PlaybackMutex, PlaybackOutput, RuntimeEvent, SpeechConfig, SynthesisQueue};
use common::{FakeSynthesizer, SlowSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const SENTENCES: [&str; 6] = [
    "一番目の文です",
    "二番目の文です",
    "三番目の文です",
    "四番目の文です",
    "五番目の文です",
    "六番目の文です",
];

fn joined() -> String {
    SENTENCES.iter().map(|s| format!("{s}。")).collect()
}

#[tokio::test(start_paused = true)]
async fn capacity_three_keeps_the_last_three_sentences() {
    let mut config = SpeechConfig::default();
    config.queue.max_queue_size = 3;
    let sink = Arc::new(SlowSink::new(Duration::from_millis(100)));
    let queue = SynthesisQueue::new(
        &config,
        Arc::new(FakeSynthesizer::new(Duration::from_secs(2))),
        PlaybackOutput::device_only(sink.clone()),
        PlaybackMutex::new(),
    );

    let report = queue.enqueue(&joined());
    assert_eq!(report.evicted.len(), 3);
    assert_eq!(queue.snapshot().texts(), SENTENCES[3..].to_vec());

    queue.wait_until_settled().await;
    assert_eq!(sink.played(), SENTENCES[3..].to_vec());
}

#[tokio::test(start_paused = true)]
async fn streamed_fragments_play_in_order_one_at_a_time() {
    let mut config = SpeechConfig::default();
    config.queue.max_concurrent_generations = 2;
    let sink = Arc::new(SlowSink::new(Duration::from_millis(300)));
    let queue = SynthesisQueue::new(
        &config,
        Arc::new(FakeSynthesizer::new(Duration::from_millis(120))),
        PlaybackOutput::device_only(sink.clone()),
        PlaybackMutex::new(),
    );
    let (events_tx, mut events) = broadcast::channel(128);
    let queue = queue.with_runtime_events(events_tx);

    let (tx, rx) = mpsc::channel(8);
    let stage = tokio::spawn(run_text_stage(rx, queue.clone(), CancellationToken::new()));

    // Split every sentence across two fragments.
    for sentence in SENTENCES {
        let mid = sentence.char_indices().nth(3).unwrap().0;
        tx.send(TextEvent::Fragment(sentence[..mid].to_owned())).await.unwrap();
        tx.send(TextEvent::Fragment(format!("{}。", &sentence[mid..]))).await.unwrap();
    }
    tx.send(TextEvent::Done).await.unwrap();
    drop(tx);
    stage.await.unwrap();
    queue.wait_until_settled().await;

    assert_eq!(sink.played(), SENTENCES.to_vec());
    assert_eq!(sink.max_active(), 1);

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::PlaybackStarted { id } = event {
            started.push(id.0);
        }
    }
    assert_eq!(started, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn clear_mid_stream_releases_all_audio() {
    let sink = Arc::new(SlowSink::new(Duration::from_secs(5)));
    let gate = PlaybackMutex::new();
    let queue = SynthesisQueue::new(
        &SpeechConfig::default(),
        Arc::new(FakeSynthesizer::new(Duration::from_millis(50))),
        PlaybackOutput::device_only(sink.clone()),
        gate.clone(),
    );

    queue.enqueue(&joined());
    tokio::time::sleep(Duration::from_secs(1)).await;
    let ledger = queue.audio_ledger();
    assert!(ledger.live() > 0);

    queue.clear();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ledger.live(), 0);
    assert!(!gate.status().playing);
    assert!(queue.snapshot().utterances.is_empty());

    // The queue is usable again after a clear.
    queue.enqueue("新しい文章です。");
    queue.wait_until_settled().await;
    assert_eq!(sink.played(), vec!["新しい文章です"]);
}

#[tokio::test(start_paused = true)]
async fn rejected_sentence_is_skipped_and_reported() {
    let synth = FakeSynthesizer::new(Duration::from_millis(10)).failing_on("二番目の文です");
    let sink = Arc::new(SlowSink::new(Duration::from_millis(10)));
    let queue = SynthesisQueue::new(
        &SpeechConfig::default(),
        Arc::new(synth),
        PlaybackOutput::device_only(sink.clone()),
        PlaybackMutex::new(),
    );

    queue.enqueue("一番目の文です。二番目の文です。三番目の文です。");
    queue.wait_until_settled().await;

    assert_eq!(sink.played(), vec!["一番目の文です", "三番目の文です"]);
    let snap = queue.snapshot();
    assert_eq!(snap.utterances.len(), 1);
    assert!(matches!(snap.utterances[0].status, UtteranceStatus::Failed(_)));
    assert!(snap.last_error.unwrap().contains("rejected"));
}
