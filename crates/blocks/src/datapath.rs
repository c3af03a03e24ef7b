//! Constants shared by the datapath blocks

use sgnsim_fixed_point::{EmbeddingVector, Fixed, FixedFormat};
use sgnsim_kernel::{Result, SimError};

/// Wiring-time parameters of the word-context datapath
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatapathConfig {
    /// Embedding dimensionality
    pub embedding_dim: usize,
    /// Leaky rectifier slope for non-positive inputs (0 for plain ReLU)
    pub leaky_val: f64,
    /// Learning rate
    pub rate_val: f64,
    /// Format shared by every datapath signal
    pub format: FixedFormat,
}

impl DatapathConfig {
    pub fn new(
        embedding_dim: usize,
        leaky_val: f64,
        rate_val: f64,
        format: FixedFormat,
    ) -> Result<Self> {
        if embedding_dim == 0 {
            return Err(SimError::Config(
                "embedding_dim must be at least 1".to_string(),
            ));
        }
        // Products of two datapath values must have a representable accumulator
        format.widened()?;
        Ok(Self {
            embedding_dim,
            leaky_val,
            rate_val,
            format,
        })
    }

    /// Leaky slope quantized to the datapath format
    pub fn leaky(&self) -> Result<Fixed> {
        Ok(Fixed::from_f64(self.leaky_val, self.format)?)
    }

    /// Learning rate quantized to the datapath format
    pub fn rate(&self) -> Result<Fixed> {
        Ok(Fixed::from_f64(self.rate_val, self.format)?)
    }

    pub fn zero_vector(&self) -> EmbeddingVector {
        EmbeddingVector::zeros(self.embedding_dim, self.format)
    }

    pub fn zero(&self) -> Fixed {
        Fixed::zero(self.format)
    }
}
