//! Fixed-point error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixedPointError {
    #[error("Invalid resolution: {0} (must be 2^-k with 0 <= k <= {max})", max = crate::MAX_FRAC_BITS)]
    InvalidResolution(f64),

    #[error("Invalid range: [{min}, {max}) at resolution {res}")]
    InvalidRange { min: f64, max: f64, res: f64 },

    #[error("Non-finite value cannot be quantized: {0}")]
    NonFinite(f64),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Format mismatch at element {index}")]
    FormatMismatch { index: usize },

    #[error("Index out of range: {index} >= {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Format [{min}, {max}) cannot be packed into a {width}-bit lane")]
    NotPackable { min: f64, max: f64, width: u32 },
}

pub type Result<T> = std::result::Result<T, FixedPointError>;
