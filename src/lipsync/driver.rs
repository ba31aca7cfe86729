//! The live lip-sync stage.

use super::analyzer::SpectralAnalyzer;
use crate::expression::ExpressionManager;
use crate::runtime::RuntimeEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sample the analyzer every `tick` and drive the viseme channel.
///
/// While the tap is idle nothing is applied; the mouth is closed once on
/// each transition to idle and again on shutdown.
pub async fn run_lipsync_stage(
    analyzer: SpectralAnalyzer,
    manager: Arc<ExpressionManager>,
    tick: Duration,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    cancel: CancellationToken,
) {
    info!("lip-sync stage running every {tick:?}");
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut was_active = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !analyzer.is_active() {
                    if was_active {
                        debug!("audio idle, closing mouth");
                        manager.reset_visemes();
                        was_active = false;
                    }
                    continue;
                }
                was_active = true;

                let reading = analyzer.sample_tick();
                manager.apply_acoustic(reading.volume, reading.phoneme, reading.confidence);
                if let Some(rt) = &runtime_tx {
                    let _ = rt.send(RuntimeEvent::LipSync {
                        volume: reading.volume,
                        phoneme: reading.phoneme,
                    });
                }
            }
        }
    }

    manager.reset_visemes();
    info!("lip-sync stage stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::SignalTap;
    use crate::config::LipSyncConfig;
    use crate::expression::Viseme;
    use crate::test_utils::RecordingRig;
    use std::f32::consts::PI;

    #[tokio::test(start_paused = true)]
    async fn opens_mouth_while_audible_and_closes_when_idle() {
        let rig = Arc::new(RecordingRig::vrm1());
        let manager = Arc::new(ExpressionManager::new(rig.clone()));
        let tap = SignalTap::new(4096, 24_000);
        let config = LipSyncConfig {
            fft_size: 256,
            ..LipSyncConfig::default()
        };
        let analyzer = SpectralAnalyzer::new(tap.clone(), &config);
        let (tx, mut rx) = broadcast::channel(64);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_lipsync_stage(
            analyzer,
            Arc::clone(&manager),
            Duration::from_millis(30),
            Some(tx),
            cancel.clone(),
        ));

        tap.begin(24_000);
        let tone: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f32 / 24_000.0;
                0.6 * (2.0 * PI * 240.0 * t).sin() + 0.4 * (2.0 * PI * 2400.0 * t).sin()
            })
            .collect();
        tap.push(&tone);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let visemes = manager.snapshot().visemes;
        assert_eq!(visemes.len(), 1);
        assert_eq!(visemes[0].0, Viseme::Ih);
        assert!(matches!(rx.try_recv(), Ok(RuntimeEvent::LipSync { .. })));

        tap.end();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.snapshot().visemes.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
