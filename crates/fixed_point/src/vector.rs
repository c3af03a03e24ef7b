//! Fixed-point embedding vectors and their packed bus form

use crate::error::{FixedPointError, Result};
use crate::fixed::Fixed;
use crate::format::FixedFormat;

/// An ordered vector of fixed-point values sharing one format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingVector {
    values: Vec<Fixed>,
    format: FixedFormat,
}

impl EmbeddingVector {
    /// Create a zero vector of given length
    pub fn zeros(len: usize, format: FixedFormat) -> Self {
        Self {
            values: vec![Fixed::zero(format); len],
            format,
        }
    }

    /// Create a vector from floating-point values
    pub fn from_f64_slice(values: &[f64], format: FixedFormat) -> Result<Self> {
        let values = values
            .iter()
            .map(|&v| Fixed::from_f64(v, format))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values, format })
    }

    /// Create from values that must all share `format`
    pub fn from_values(values: Vec<Fixed>, format: FixedFormat) -> Result<Self> {
        if let Some(index) = values.iter().position(|v| v.format() != format) {
            return Err(FixedPointError::FormatMismatch { index });
        }
        Ok(Self { values, format })
    }

    pub fn format(&self) -> FixedFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Fixed> {
        self.values.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Fixed] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = Fixed> + '_ {
        self.values.iter().copied()
    }

    /// Replace one element, re-quantizing it into the vector's format
    pub fn set(&mut self, index: usize, value: Fixed) -> Result<()> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(FixedPointError::IndexOutOfRange { index, len })?;
        *slot = value.requantize(self.format);
        Ok(())
    }

    /// Convert to floating-point vector
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.to_f64()).collect()
    }

    /// Dot product, accumulated exactly in the widened format and narrowed to `out`
    pub fn dot(&self, other: &Self, out: FixedFormat) -> Result<Fixed> {
        if self.len() != other.len() {
            return Err(FixedPointError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }

        let wide = self.format.widened()?;
        let sum = self
            .iter()
            .zip(other.iter())
            .fold(Fixed::zero(wide), |acc, (a, b)| acc.add(a.mul(b, wide), wide));

        Ok(sum.requantize(out))
    }

    /// Multiply each element by a scalar, re-quantized to this vector's format
    pub fn scale_by(&self, scalar: Fixed) -> Self {
        Self {
            values: self.iter().map(|x| scalar.mul(x, self.format)).collect(),
            format: self.format,
        }
    }

    /// Concatenate into a single bus: element `j` occupies bits
    /// `[j*width, (j+1)*width)`.
    pub fn pack(&self) -> Result<PackedVector> {
        let width = self.format.width();
        let total_bits = width as usize * self.len();
        let mut words = vec![0u64; total_bits.div_ceil(64)];

        for (j, value) in self.iter().enumerate() {
            let bits = value.to_bits()?;
            let offset = j * width as usize;
            let (word, shift) = (offset / 64, offset % 64);
            words[word] |= bits << shift;
            if shift + width as usize > 64 {
                words[word + 1] |= bits >> (64 - shift);
            }
        }

        Ok(PackedVector {
            words,
            dim: self.len(),
            width,
        })
    }

    /// Split a bus back into its elements
    pub fn unpack(packed: &PackedVector, format: FixedFormat) -> Result<Self> {
        if format.width() != packed.width {
            return Err(FixedPointError::NotPackable {
                min: format.min(),
                max: format.max(),
                width: packed.width,
            });
        }
        let values = (0..packed.dim)
            .map(|j| Fixed::from_bits(packed.lane(j), format))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values, format })
    }
}

/// Bit-concatenated form of an [`EmbeddingVector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedVector {
    /// Little-endian 64-bit words
    words: Vec<u64>,
    dim: usize,
    width: u32,
}

impl PackedVector {
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Bits per element
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn total_bits(&self) -> usize {
        self.dim * self.width as usize
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Raw bits of element `j`
    pub fn lane(&self, j: usize) -> u64 {
        let width = self.width as usize;
        let offset = j * width;
        let (word, shift) = (offset / 64, offset % 64);
        let mut bits = self.words.get(word).copied().unwrap_or(0) >> shift;
        if shift + width > 64 {
            bits |= self.words.get(word + 1).copied().unwrap_or(0) << (64 - shift);
        }
        if width == 64 {
            bits
        } else {
            bits & ((1u64 << width) - 1)
        }
    }
}

impl std::fmt::Display for PackedVector {
    /// Hexadecimal, most significant word first
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.total_bits().div_ceil(4).max(1);
        let mut hex = String::with_capacity(self.words.len() * 16);
        for word in self.words.iter().rev() {
            hex.push_str(&format!("{:016x}", word));
        }
        let start = hex.len().saturating_sub(digits);
        write!(f, "0x{}", &hex[start..])
    }
}
