//! sgnsim Fixed-Point Encoding
//!
//! Range/resolution fixed-point values for the accelerator datapath.
//! Values are scaled integers with resolution 2^-k and a declared `[min, max)`
//! range; results that leave the range wrap like a hardware register.

mod error;
mod fixed;
mod format;
mod vector;

pub use error::{FixedPointError, Result};
pub use fixed::{reset_wrap_count, wrap_count, Fixed};
pub use format::{FixedFormat, MAX_FRAC_BITS};
pub use vector::{EmbeddingVector, PackedVector};
