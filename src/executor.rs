//! Single-query execution.
//!
//! [`QueryExecutor`] issues exactly one request at a time through the bus
//! transport and reports the outcome. It never retries; retry policy lives
//! in the polling loop.

use crate::error::Result;
use crate::session::BusTransport;
use crate::snip::QuerySnip;
use crate::status::Status;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Executes logical read requests against the bus, one at a time.
pub struct QueryExecutor<T: BusTransport> {
    transport: T,
    status: Arc<Status>,
    verbose: bool,
}

impl<T: BusTransport> QueryExecutor<T> {
    /// Create an executor owning the transport.
    pub fn new(transport: T, status: Arc<Status>, verbose: bool) -> Self {
        Self {
            transport,
            status,
            verbose,
        }
    }

    /// Issue one read request and return the raw register words.
    ///
    /// Panics if the snip declares a zero read length: a request that reads
    /// nothing is a construction defect, never a bus condition, and the
    /// process aborts rather than operate on an undefined request stream.
    pub async fn query(&mut self, snip: &QuerySnip) -> Result<Vec<u16>> {
        self.status.increment_request_counter();

        assert!(
            snip.read_len > 0,
            "invalid read length 0 for device {} opcode {:#06x}",
            snip.device_id,
            snip.op_code
        );

        let result = self
            .transport
            .read_registers(snip.device_id, snip.function, snip.op_code, snip.read_len)
            .await;

        if self.verbose {
            if let Err(e) = &result {
                debug!(
                    "Device {}: failed to retrieve opcode {:#06x} ({}): {}",
                    snip.device_id, snip.op_code, snip.function, e
                );
            }
        }

        result
    }

    /// Override the transport timeout for a scope.
    ///
    /// The previous timeout is restored when the returned guard drops, on
    /// every exit path including early return.
    pub fn with_timeout(&mut self, timeout: Duration) -> TimeoutGuard<'_, T> {
        let previous = self.transport.set_timeout(timeout);
        TimeoutGuard {
            executor: self,
            previous,
        }
    }
}

/// Scoped timeout override over a [`QueryExecutor`].
pub struct TimeoutGuard<'a, T: BusTransport> {
    executor: &'a mut QueryExecutor<T>,
    previous: Duration,
}

impl<T: BusTransport> Deref for TimeoutGuard<'_, T> {
    type Target = QueryExecutor<T>;

    fn deref(&self) -> &Self::Target {
        self.executor
    }
}

impl<T: BusTransport> DerefMut for TimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.executor
    }
}

impl<T: BusTransport> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        self.executor.transport.set_timeout(self.previous);
    }
}
