//! Speak stdin through the streaming pipeline on the default output device.
//!
//! Each input line is sent as a text fragment, so sentence boundaries are
//! found exactly as they would be for streamed model output. Expression
//! changes are logged instead of driving a real avatar.
//!
//! Usage: `avatar-voice-say [config.toml]`

use avatar_voice::audio::SignalTap;
use avatar_voice::audio::playback::DevicePlayback;
use avatar_voice::lipsync::{SpectralAnalyzer, run_lipsync_stage};
use avatar_voice::pipeline::run_text_stage;
use avatar_voice::{
    ExpressionManager, ExpressionRig, HttpSynthesizer, PlaybackMutex, PlaybackOutput,
    SpeechConfig, SynthesisQueue, TextEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Tap history kept for the analyzer (one second at 48 kHz).
const TAP_CAPACITY: usize = 48_000;

/// Rig that accepts every VRM 1.0 expression and logs it.
struct LoggingRig;

const EXPRESSIONS: &[&str] = &[
    "neutral", "happy", "sad", "angry", "surprised", "relaxed", "aa", "ih", "ou", "ee", "oh",
];

impl ExpressionRig for LoggingRig {
    fn supports(&self, name: &str) -> bool {
        EXPRESSIONS.contains(&name)
    }

    fn set_expression(&self, name: &str, weight: f32) -> bool {
        if weight > 0.0 {
            debug!("expression {name} = {weight:.2}");
        }
        self.supports(name)
    }

    fn play_animation_clip(&self, clip: &str) -> bool {
        info!("motion {clip}");
        true
    }
}

fn load_config() -> anyhow::Result<SpeechConfig> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SpeechConfig::default_config_path);
    if path.exists() {
        info!("loading config from {}", path.display());
        Ok(SpeechConfig::from_file(&path)?)
    } else {
        Ok(SpeechConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avatar_voice=info,reqwest=warn")),
        )
        .init();

    let config = load_config()?;
    println!("avatar-voice v{}", env!("CARGO_PKG_VERSION"));

    let tap = SignalTap::new(TAP_CAPACITY, config.playback.output_sample_rate);
    let device = DevicePlayback::new(&config.playback)?.with_tap(tap.clone());
    let synthesizer = Arc::new(HttpSynthesizer::new(&config.tts)?);
    let manager = Arc::new(ExpressionManager::new(Arc::new(LoggingRig)));
    manager.play_motion("StandingIdle");

    let queue = SynthesisQueue::new(
        &config,
        synthesizer,
        PlaybackOutput::device_only(Arc::new(device)),
        PlaybackMutex::init_global(&config.playback),
    );

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_on_signal.cancel();
        }
    });

    let analyzer = SpectralAnalyzer::new(tap, &config.lipsync);
    let lipsync = tokio::spawn(run_lipsync_stage(
        analyzer,
        Arc::clone(&manager),
        Duration::from_millis(config.lipsync.tick_interval_ms),
        None,
        cancel.clone(),
    ));

    let (tx, rx) = mpsc::channel(32);
    let text_stage = tokio::spawn(run_text_stage(rx, queue.clone(), cancel.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    if tx.send(TextEvent::Fragment(format!("{line}\n"))).await.is_err() {
                        warn!("text stage stopped early");
                        break;
                    }
                }
                None => {
                    let _ = tx.send(TextEvent::Done).await;
                    break;
                }
            }
        }
    }
    drop(tx);
    text_stage.await?;

    tokio::select! {
        () = cancel.cancelled() => queue.stop(),
        () = queue.wait_until_settled() => {}
    }
    if let Some(err) = queue.snapshot().last_error {
        warn!("last error: {err}");
    }

    cancel.cancel();
    lipsync.await?;
    Ok(())
}
