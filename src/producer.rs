//! Meter-family capabilities.
//!
//! A [`Producer`] knows how to detect one meter family on the bus: it hands
//! out a short reference read (the probe) that only that family answers
//! sensibly, plus a label for reporting. The engine never constructs
//! producers itself; it is handed an ordered list.

use crate::config::MeterType;
use crate::decode::Transform;
use crate::snip::{FunctionCode, QuerySnip};

/// Capability describing how to probe for one meter family.
pub trait Producer: Send + Sync {
    /// Label identifying the meter family.
    fn meter_type(&self) -> &'static str;

    /// A read request suitable for detecting this family at an address.
    fn probe(&self, device_id: u8) -> QuerySnip;
}

/// Eastron SDM series.
///
/// Probes the L1 voltage input register, an IEEE-754 single across two
/// registers starting at 0x0000.
pub struct SdmProducer;

impl Producer for SdmProducer {
    fn meter_type(&self) -> &'static str {
        "SDM"
    }

    fn probe(&self, device_id: u8) -> QuerySnip {
        QuerySnip::new(device_id, FunctionCode::ReadInput, 0x0000, 2, Transform::Raw32)
    }
}

/// Janitza B-series.
///
/// Probes the L1 voltage holding register at 0x4A38 (float).
pub struct JanitzaProducer;

impl Producer for JanitzaProducer {
    fn meter_type(&self) -> &'static str {
        "JANITZA"
    }

    fn probe(&self, device_id: u8) -> QuerySnip {
        QuerySnip::new(device_id, FunctionCode::ReadHolding, 0x4A38, 2, Transform::Raw32)
    }
}

/// DZG DVH4013.
///
/// Probes the L1 voltage holding register at 0x0004, a fixed-point integer
/// scaled by 10.
pub struct DzgProducer;

impl Producer for DzgProducer {
    fn meter_type(&self) -> &'static str {
        "DZG"
    }

    fn probe(&self, device_id: u8) -> QuerySnip {
        QuerySnip::new(
            device_id,
            FunctionCode::ReadHolding,
            0x0004,
            2,
            Transform::Scaled32 { scalar: 10.0 },
        )
    }
}

impl MeterType {
    /// Producer for this meter family.
    pub fn producer(&self) -> Box<dyn Producer> {
        match self {
            MeterType::Sdm => Box::new(SdmProducer),
            MeterType::Janitza => Box::new(JanitzaProducer),
            MeterType::Dzg => Box::new(DzgProducer),
        }
    }
}

/// All supported producers in default probe order.
pub fn default_producers() -> Vec<Box<dyn Producer>> {
    vec![
        Box::new(SdmProducer),
        Box::new(JanitzaProducer),
        Box::new(DzgProducer),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdm_probe_shape() {
        let snip = SdmProducer.probe(7);
        assert_eq!(snip.device_id, 7);
        assert_eq!(snip.function, FunctionCode::ReadInput);
        assert_eq!(snip.op_code, 0x0000);
        assert_eq!(snip.read_len, 2);
        assert_eq!(snip.transform, Transform::Raw32);
    }

    #[test]
    fn test_janitza_probe_uses_holding_registers() {
        let snip = JanitzaProducer.probe(3);
        assert_eq!(snip.function, FunctionCode::ReadHolding);
        assert_eq!(snip.op_code, 0x4A38);
    }

    #[test]
    fn test_dzg_probe_is_scaled() {
        let snip = DzgProducer.probe(3);
        assert_eq!(snip.transform, Transform::Scaled32 { scalar: 10.0 });
    }

    #[test]
    fn test_default_producer_order() {
        let producers = default_producers();
        let labels: Vec<_> = producers.iter().map(|p| p.meter_type()).collect();
        assert_eq!(labels, vec!["SDM", "JANITZA", "DZG"]);
    }

    #[test]
    fn test_meter_type_mapping() {
        assert_eq!(MeterType::Sdm.producer().meter_type(), "SDM");
        assert_eq!(MeterType::Janitza.producer().meter_type(), "JANITZA");
        assert_eq!(MeterType::Dzg.producer().meter_type(), "DZG");
    }
}
