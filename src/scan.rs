//! One-shot bus discovery.
//!
//! Sweeps every valid slave address and probes each registered producer in
//! order until one answers. The sweep runs with a deliberately short
//! timeout so absent addresses cost little; the previous timeout is
//! restored when the sweep finishes, however it exits.

use crate::executor::QueryExecutor;
use crate::producer::Producer;
use crate::session::BusTransport;
use crate::snip::{FIRST_DEVICE_ID, LAST_DEVICE_ID};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Per-probe timeout during the sweep.
pub const SCAN_PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// Bus recovery time before probing the next address.
pub const SCAN_SETTLE_DELAY: Duration = Duration::from_millis(40);

/// One discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHit {
    /// Slave address that answered.
    pub device_id: u8,
    /// Meter type of the first producer whose probe it answered.
    pub meter_type: String,
}

/// Result of a full address sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub devices: Vec<ScanHit>,
}

/// Address-sweep discovery over an exclusive executor.
pub struct BusScanner<'a, T: BusTransport> {
    executor: &'a mut QueryExecutor<T>,
    producers: &'a [Box<dyn Producer>],
}

impl<'a, T: BusTransport> BusScanner<'a, T> {
    /// Create a scanner probing with the given producers, in order.
    ///
    /// The list order is the probe order: on an ambiguous bus the first
    /// producer whose probe a device answers determines its reported type.
    pub fn new(executor: &'a mut QueryExecutor<T>, producers: &'a [Box<dyn Producer>]) -> Self {
        Self {
            executor,
            producers,
        }
    }

    /// Sweep addresses 1-247 and report what answered.
    pub async fn scan(self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut executor = self.executor.with_timeout(SCAN_PROBE_TIMEOUT);

        info!("Starting bus scan");

        'addresses: for device_id in FIRST_DEVICE_ID..=LAST_DEVICE_ID {
            // Give the bus some time to recover before querying the next
            // device.
            sleep(SCAN_SETTLE_DELAY).await;

            for producer in self.producers {
                let snip = producer.probe(device_id);
                match executor.query(&snip).await {
                    Ok(words) => {
                        let value = snip.transform.apply(&words);
                        info!(
                            "Device {}: {} type device found, probe value {:.2}",
                            device_id,
                            producer.meter_type(),
                            value
                        );
                        report.devices.push(ScanHit {
                            device_id,
                            meter_type: producer.meter_type().to_string(),
                        });
                        continue 'addresses;
                    }
                    Err(e) => {
                        debug!(
                            "Device {}: no answer to {} probe: {}",
                            device_id,
                            producer.meter_type(),
                            e
                        );
                    }
                }
            }

            info!("Device {}: n/a", device_id);
        }

        drop(executor);

        info!("Found {} active devices:", report.devices.len());
        for hit in &report.devices {
            info!("* slave address {}: type {}", hit.device_id, hit.meter_type);
        }
        warn!(
            "This lists only the devices that responded to a known probe \
             request. Devices with different function code definitions \
             might not be detected."
        );

        report
    }
}
