//! Continuous polling loop.
//!
//! One worker drives this loop for the lifetime of the process: dequeue a
//! request, pace the bus if the addressed device changed, attempt the query
//! inside a bounded retry budget, then emit the outcome before touching the
//! next request. Requests are never interleaved and never abandoned
//! mid-retry.

use crate::executor::QueryExecutor;
use crate::session::BusTransport;
use crate::snip::{ControlSnip, QuerySnip};
use crate::status::Status;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::warn;

/// Attempts per request before giving up.
pub const MAX_RETRY_COUNT: usize = 5;

/// Bus-quiet time required after a different device's transaction.
pub const DEVICE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause between failed attempts on the same request.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// The steady-state request consumer.
pub struct PollingLoop<T: BusTransport> {
    executor: QueryExecutor<T>,
    status: Arc<Status>,
}

impl<T: BusTransport> PollingLoop<T> {
    /// Create a loop driving the given executor.
    pub fn new(executor: QueryExecutor<T>, status: Arc<Status>) -> Self {
        Self { executor, status }
    }

    /// Serve requests until the inbound channel closes.
    ///
    /// In production the request source outlives the loop, so this runs for
    /// the remaining lifetime of the process. Exactly one [`ControlSnip`] is
    /// emitted per dequeued request, in dequeue order; completed snips are
    /// forwarded on `results` before their OK signal. A slow `results`
    /// consumer blocks the loop, which is the only backpressure path.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<QuerySnip>,
        results: mpsc::Sender<QuerySnip>,
        control: mpsc::Sender<ControlSnip>,
    ) {
        let mut previous_device: Option<u8> = None;

        while let Some(mut snip) = requests.recv().await {
            // Multi-drop devices need a little bus-quiet time after a
            // different device's transaction.
            if previous_device != Some(snip.device_id) {
                sleep(DEVICE_SETTLE_DELAY).await;
            }
            previous_device = Some(snip.device_id);

            let mut reading = None;
            for attempt in 1..=MAX_RETRY_COUNT {
                match self.executor.query(&snip).await {
                    Ok(words) => {
                        reading = Some(words);
                        break;
                    }
                    Err(e) => {
                        self.status.increment_reconnect_counter();
                        warn!(
                            "Device {} failed to respond ({}) - retry attempt {} of {}",
                            snip.device_id, e, attempt, MAX_RETRY_COUNT
                        );
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }

            match reading {
                Some(words) => {
                    snip.value = Some(snip.transform.apply(&words));
                    snip.read_timestamp = Some(Utc::now());
                    let device_id = snip.device_id;

                    if results.send(snip).await.is_err() {
                        break;
                    }
                    if control.send(ControlSnip::ok(device_id)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let failure = ControlSnip::error(
                        snip.device_id,
                        format!("Device {} did not respond.", snip.device_id),
                    );
                    if control.send(failure).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
