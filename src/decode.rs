//! Register-to-physical-value decoding.
//!
//! Modbus devices deliver readings as big-endian 16-bit register words;
//! meters pack physical values either as an IEEE-754 single across two
//! words, or as a fixed-point integer that must be divided by a per-register
//! scale factor. The decode variants here are the closed set of layouts the
//! supported meter families use.

use serde::{Deserialize, Serialize};

/// Decode strategy attached to a read request.
///
/// `apply` expects exactly [`Transform::registers_needed`] words; handing it
/// a payload of any other length is a request-construction defect and
/// panics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transform {
    /// Single register, plain unsigned integer.
    Raw16,
    /// Two registers, IEEE-754 single-precision bit pattern.
    Raw32,
    /// Single register, unsigned integer divided by `scalar`.
    Scaled16 { scalar: f64 },
    /// Two registers, unsigned integer divided by `scalar`.
    Scaled32 { scalar: f64 },
}

impl Transform {
    /// Number of 16-bit registers this transform consumes.
    pub fn registers_needed(&self) -> u16 {
        match self {
            Transform::Raw16 | Transform::Scaled16 { .. } => 1,
            Transform::Raw32 | Transform::Scaled32 { .. } => 2,
        }
    }

    /// Convert raw register words into a physical value.
    pub fn apply(&self, words: &[u16]) -> f64 {
        assert_eq!(
            words.len(),
            self.registers_needed() as usize,
            "payload length {} does not match transform {:?}",
            words.len(),
            self
        );

        match self {
            Transform::Raw16 => words[0] as f64,
            Transform::Raw32 => f32::from_bits(compose_u32(words)) as f64,
            Transform::Scaled16 { scalar } => words[0] as f64 / scalar,
            Transform::Scaled32 { scalar } => compose_u32(words) as f64 / scalar,
        }
    }
}

/// Compose two big-endian register words into one 32-bit value.
fn compose_u32(words: &[u16]) -> u32 {
    ((words[0] as u32) << 16) | (words[1] as u32)
}
