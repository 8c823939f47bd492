//! Grant-modification ingestion: long-poll the event queue, normalize each
//! message into a canonical grant row, upsert it, acknowledge on success.

pub mod normalize;
pub mod processor;
pub mod queue;

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use self::processor::BatchProcessor;
use self::queue::MessageQueue;

/// Drives the poll → process loop until `shutdown` resolves.
///
/// Shutdown is cooperative and checked at loop-iteration boundaries: an
/// in-flight poll may be abandoned, but an in-flight batch always runs to
/// completion before the loop exits. Receive-side transport errors are
/// treated as an empty batch so the loop stays alive indefinitely; they are
/// logged, never raised.
pub async fn run_ingest_loop(
    processor: BatchProcessor,
    queue: Arc<dyn MessageQueue>,
    shutdown: impl Future<Output = ()>,
) {
    info!("grant ingest loop started");
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => break,
            result = queue.receive_batch() => match result {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "queue receive failed; continuing with empty batch");
                    Vec::new()
                }
            },
        };

        if batch.is_empty() {
            continue;
        }
        processor.process_batch(batch).await;
    }

    info!("grant ingest loop stopped");
}
