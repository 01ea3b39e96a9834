//! Request and status snip data model.
//!
//! A [`QuerySnip`] is one logical register read addressed to one device on
//! the bus; a [`ControlSnip`] is the out-of-band outcome signal emitted once
//! per request. Snips travel over the engine's mpsc channels and are
//! consumed exactly once.

use crate::decode::Transform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest valid slave address on a Modbus RTU bus.
pub const FIRST_DEVICE_ID: u8 = 1;
/// Highest valid slave address on a Modbus RTU bus.
pub const LAST_DEVICE_ID: u8 = 247;

/// Modbus read operation selector.
///
/// The engine only ever reads; the two read function codes are the closed
/// set of operations it can issue. Codes from outside the engine go through
/// [`FunctionCode::try_from`], which rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionCode {
    /// Function code 3.
    ReadHolding,
    /// Function code 4.
    ReadInput,
}

impl FunctionCode {
    /// The numeric Modbus function code.
    pub fn code(&self) -> u8 {
        match self {
            FunctionCode::ReadHolding => 3,
            FunctionCode::ReadInput => 4,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        match code {
            3 => Ok(FunctionCode::ReadHolding),
            4 => Ok(FunctionCode::ReadInput),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionCode::ReadHolding => write!(f, "read holding registers"),
            FunctionCode::ReadInput => write!(f, "read input registers"),
        }
    }
}

/// A single logical register-read request with its result slot.
#[derive(Debug, Clone)]
pub struct QuerySnip {
    /// Target slave address (1-247).
    pub device_id: u8,
    /// Read operation to issue.
    pub function: FunctionCode,
    /// Starting register address.
    pub op_code: u16,
    /// Number of registers to read.
    pub read_len: u16,
    /// Decode strategy for the returned words.
    pub transform: Transform,
    /// Decoded physical value, filled in after a successful read.
    pub value: Option<f64>,
    /// Time the value was read, filled in together with `value`.
    pub read_timestamp: Option<DateTime<Utc>>,
}

impl QuerySnip {
    /// Create a new request with an empty result slot.
    ///
    /// Panics if `device_id` is outside the valid 1-247 slave range; an
    /// out-of-range address is a request-construction defect.
    pub fn new(
        device_id: u8,
        function: FunctionCode,
        op_code: u16,
        read_len: u16,
        transform: Transform,
    ) -> Self {
        assert!(
            (FIRST_DEVICE_ID..=LAST_DEVICE_ID).contains(&device_id),
            "device address {} is outside the valid {}-{} range",
            device_id,
            FIRST_DEVICE_ID,
            LAST_DEVICE_ID
        );

        Self {
            device_id,
            function,
            op_code,
            read_len,
            transform,
            value: None,
            read_timestamp: None,
        }
    }
}

/// Outcome classification carried by a [`ControlSnip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Ok,
    Error,
}

/// Out-of-band status signal for one device, one per request outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSnip {
    /// Device the outcome belongs to.
    pub device_id: u8,
    /// Success or failure.
    pub kind: ControlKind,
    /// Human-readable detail.
    pub message: String,
}

impl ControlSnip {
    /// Success signal for a device.
    pub fn ok(device_id: u8) -> Self {
        Self {
            device_id,
            kind: ControlKind::Ok,
            message: "OK".to_string(),
        }
    }

    /// Failure signal for a device.
    pub fn error(device_id: u8, message: impl Into<String>) -> Self {
        Self {
            device_id,
            kind: ControlKind::Error,
            message: message.into(),
        }
    }
}
