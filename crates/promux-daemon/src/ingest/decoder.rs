//! Decoder worker pool.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use promux_core::protocol::update::{parse_updates, MetricUpdate};

use crate::obs::Telemetry;

/// Shared handle to the payload queue; workers take turns pulling from it.
pub type PayloadQueue = Arc<Mutex<mpsc::Receiver<Bytes>>>;

/// One decoder worker: pull raw payloads, decode each into a batch of
/// update events, and push every event individually to the run-loop. A
/// payload that fails to decode is counted and dropped in its entirety.
pub async fn run(queue: PayloadQueue, update_tx: mpsc::Sender<MetricUpdate>, telemetry: Telemetry) {
    loop {
        let payload = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(payload) = payload else {
            // listener is gone
            return;
        };

        let updates = match parse_updates(&payload) {
            Ok(updates) => updates,
            Err(err) => {
                telemetry.error();
                warn!(%err, "payload decode failed");
                continue;
            }
        };

        for update in updates {
            if update_tx.send(update).await.is_err() {
                return;
            }
        }
    }
}
