//! Fixed-point encoder (§4.2): plaintext reals/integers <-> ring elements.

use crate::error::{MpcError, Result};
use crate::tensor::RingTensor;

/// Default fractional bit count, `f`.
pub const DEFAULT_PRECISION_BITS: u32 = 16;

/// Encodes/decodes between real-valued tensors and ring-element tensors at a
/// fixed scale `2^f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointEncoder {
    precision_bits: u32,
}

impl Default for FixedPointEncoder {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PRECISION_BITS))
    }
}

impl FixedPointEncoder {
    /// `precision_bits = None` defaults to [`DEFAULT_PRECISION_BITS`];
    /// `Some(0)` denotes an integer-valued (unscaled) encoder.
    pub fn new(precision_bits: Option<u32>) -> Self {
        Self {
            precision_bits: precision_bits.unwrap_or(DEFAULT_PRECISION_BITS),
        }
    }

    pub fn precision_bits(&self) -> u32 {
        self.precision_bits
    }

    /// `scale = 2^f`. A scale of 1 denotes an integer-valued encoder.
    pub fn scale(&self) -> u64 {
        1u64 << self.precision_bits
    }

    /// Encodes a real-valued tensor: `round(x * scale)`.
    ///
    /// Encoding an integer-valued tensor through a scale-1 encoder is the
    /// identity. Encoding a non-integral tensor through a scale-1 encoder
    /// raises [`MpcError::InvalidConfiguration`]: integers alone are
    /// representable at that scale.
    pub fn encode(&self, plain: &[f64]) -> Result<RingTensor> {
        let scale = self.scale() as f64;
        let mut values = Vec::with_capacity(plain.len());
        for &x in plain {
            if self.precision_bits == 0 && x.fract() != 0.0 {
                return Err(MpcError::InvalidConfiguration(format!(
                    "cannot encode non-integral value {x} at scale 1"
                )));
            }
            values.push((x * scale).round() as i64);
        }
        Ok(RingTensor::from_flat(values, vec![plain.len()]))
    }

    /// Encodes a tensor that already carries a shape.
    pub fn encode_tensor(&self, plain: &[f64], shape: Vec<usize>) -> Result<RingTensor> {
        let mut t = self.encode(plain)?;
        t.reshape_in_place(shape);
        Ok(t)
    }

    /// Decodes a ring tensor back to reals: signed division by `scale`.
    pub fn decode(&self, ring: &RingTensor) -> Vec<f64> {
        let scale = self.scale() as f64;
        ring.data().iter().map(|&v| v as f64 / scale).collect()
    }
}
