//! Engine counters for external monitoring.
//!
//! The counters are injected into the executor and polling loop as an
//! `Arc<Status>` at construction, so each run (and each test) gets its own
//! instance. Nothing in the engine depends on their values for correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe request and reconnect counters.
#[derive(Debug)]
pub struct Status {
    started_at: DateTime<Utc>,
    modbus_requests: AtomicU64,
    modbus_reconnects: AtomicU64,
}

impl Status {
    /// Create fresh counters stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            modbus_requests: AtomicU64::new(0),
            modbus_reconnects: AtomicU64::new(0),
        }
    }

    /// Record one issued bus request.
    pub fn increment_request_counter(&self) {
        self.modbus_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one retry after a failed attempt.
    pub fn increment_reconnect_counter(&self) {
        self.modbus_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests issued so far.
    pub fn requests(&self) -> u64 {
        self.modbus_requests.load(Ordering::Relaxed)
    }

    /// Total retries recorded so far.
    pub fn reconnects(&self) -> u64 {
        self.modbus_reconnects.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters for reporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            modbus_requests: self.requests(),
            modbus_reconnects: self.reconnects(),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub uptime_secs: u64,
    pub modbus_requests: u64,
    pub modbus_reconnects: u64,
}
