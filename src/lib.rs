//! Modbus RTU polling engine for multi-drop energy meter buses.
//!
//! One exclusive bus owner issues, paces, retries, and decodes register
//! reads over a half-duplex serial line shared by up to 247 addressed
//! devices, and discovers device types on an unknown bus:
//!
//! - [`session`] - Exclusive serial link ownership and the bus transport seam
//! - [`executor`] - Single-in-flight query execution
//! - [`poll`] - Continuous polling loop with retry and device-switch pacing
//! - [`scan`] - One-shot address-sweep discovery
//! - [`decode`] - Raw-register-to-physical-value transforms
//! - [`producer`] - Per-meter-family probe capabilities
//! - [`snip`] - Request/status data model
//! - [`status`] - Injected request/reconnect counters
//! - [`config`] - JSON5 configuration

pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod poll;
pub mod producer;
pub mod scan;
pub mod scheduler;
pub mod session;
pub mod snip;
pub mod status;

// Re-export commonly used types at the crate root
pub use config::{Comset, ConfigError, EngineConfig, LogFormat, LoggingConfig, MeterConfig, MeterType};
pub use decode::Transform;
pub use error::{Result, TransportError};
pub use executor::{QueryExecutor, TimeoutGuard};
pub use poll::{DEVICE_SETTLE_DELAY, MAX_RETRY_COUNT, PollingLoop, RETRY_BACKOFF};
pub use producer::{Producer, default_producers};
pub use scan::{BusScanner, SCAN_PROBE_TIMEOUT, SCAN_SETTLE_DELAY, ScanHit, ScanReport};
pub use scheduler::RequestScheduler;
pub use session::{BusTransport, TransportSession};
pub use snip::{ControlKind, ControlSnip, FIRST_DEVICE_ID, FunctionCode, LAST_DEVICE_ID, QuerySnip};
pub use status::{Status, StatusSnapshot};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - [`LogFormat::Text`] (default): Human-readable text format
/// - [`LogFormat::Json`]: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
