//! Request generation for the steady-state loop.
//!
//! Enqueues each configured meter's reference read on a fixed cycle. The
//! polling loop owns pacing and retries; the scheduler only keeps the
//! request channel fed.

use crate::config::MeterConfig;
use crate::producer::Producer;
use crate::snip::QuerySnip;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::info;

/// Cyclic request source over the configured meters.
pub struct RequestScheduler {
    meters: Vec<(u8, Box<dyn Producer>)>,
    cycle: Duration,
}

impl RequestScheduler {
    /// Build a scheduler from the configured meter list.
    pub fn new(meters: &[MeterConfig], cycle: Duration) -> Self {
        let meters = meters
            .iter()
            .map(|m| (m.device_id, m.meter_type.producer()))
            .collect();

        Self { meters, cycle }
    }

    /// Feed the request channel until the consumer hangs up.
    pub async fn run(self, requests: mpsc::Sender<QuerySnip>) {
        info!(
            "Scheduling reads for {} meter(s) every {:?}",
            self.meters.len(),
            self.cycle
        );

        loop {
            for (device_id, producer) in &self.meters {
                if requests.send(producer.probe(*device_id)).await.is_err() {
                    return;
                }
            }
            sleep(self.cycle).await;
        }
    }
}
