//! Serial bus transport.
//!
//! [`TransportSession`] owns the one physical RTU link. The bus is
//! half-duplex with no concurrency: callers must serialize all reads, and
//! the session is designed to be driven exclusively through
//! [`crate::executor::QueryExecutor`]. The [`BusTransport`] trait is the
//! seam that lets tests substitute a scripted bus for the serial port.

use crate::config::Comset;
use crate::error::{Result, TransportError};
use crate::snip::FunctionCode;
use async_trait::async_trait;
use std::time::Duration;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::info;

/// Read access to a half-duplex register bus with a mutable per-call
/// timeout.
#[async_trait]
pub trait BusTransport: Send {
    /// Read `count` registers from `start` on the addressed device,
    /// dispatching by function code.
    async fn read_registers(
        &mut self,
        device_id: u8,
        function: FunctionCode,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Current per-call timeout.
    fn timeout(&self) -> Duration;

    /// Replace the per-call timeout, returning the previous value.
    fn set_timeout(&mut self, timeout: Duration) -> Duration;
}

/// Exclusive owner of the serial RTU link.
pub struct TransportSession {
    ctx: Context,
    timeout: Duration,
}

impl TransportSession {
    /// Open the serial device and attach an RTU client.
    ///
    /// A failure here is an unrecoverable precondition; the caller is
    /// expected to terminate the process.
    pub fn connect(device: &str, comset: Comset, timeout: Duration) -> Result<Self> {
        let parity = if comset.even_parity() {
            tokio_serial::Parity::Even
        } else {
            tokio_serial::Parity::None
        };

        let builder = tokio_serial::new(device, comset.baud_rate())
            .parity(parity)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One);

        let serial = tokio_serial::SerialStream::open(&builder)
            .map_err(|e| TransportError::Connect(format!("{}: {}", device, e)))?;

        info!("Connected to RTU bus via {} ({})", device, comset);

        // The active slave is switched per query; the initial value is
        // irrelevant.
        let ctx = rtu::attach_slave(serial, Slave(1));

        Ok(Self { ctx, timeout })
    }
}

#[async_trait]
impl BusTransport for TransportSession {
    async fn read_registers(
        &mut self,
        device_id: u8,
        function: FunctionCode,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.ctx.set_slave(Slave(device_id));
        let timeout = self.timeout;

        let request = async {
            let response = match function {
                FunctionCode::ReadHolding => self.ctx.read_holding_registers(start, count).await,
                FunctionCode::ReadInput => self.ctx.read_input_registers(start, count).await,
            };

            response
                .map_err(|e| TransportError::Link(e.to_string()))?
                .map_err(|e| TransportError::Link(format!("Exception: {:?}", e)))
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Duration {
        std::mem::replace(&mut self.timeout, timeout)
    }
}
