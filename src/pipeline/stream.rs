//! Text stage: feeds model output into the synthesis queue.

use super::messages::TextEvent;
use super::queue::SynthesisQueue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Forward text fragments to `queue` until the stream ends or `cancel` fires.
///
/// `Done` flushes the segmenter tail; a closed channel does the same before
/// returning. Cancellation clears the queue, stopping playback at once.
pub async fn run_text_stage(
    mut rx: mpsc::Receiver<TextEvent>,
    queue: SynthesisQueue,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("text stage cancelled, clearing queue");
                queue.stop();
                break;
            }
            event = rx.recv() => match event {
                Some(TextEvent::Fragment(text)) => {
                    let report = queue.enqueue(&text);
                    if !report.queued.is_empty() {
                        debug!("{} utterances queued", report.queued.len());
                    }
                }
                Some(TextEvent::Done) => {
                    queue.finalize();
                }
                None => {
                    queue.finalize();
                    break;
                }
            }
        }
    }
    debug!("text stage stopped");
}
