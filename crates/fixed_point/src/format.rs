//! Fixed-point format: declared range and resolution

use crate::error::{FixedPointError, Result};

/// Largest supported number of fractional bits (resolution 2^-48)
pub const MAX_FRAC_BITS: u8 = 48;

/// Raw bounds are kept well inside i64 so that products fit in i128.
const MAX_RAW_MAGNITUDE: i64 = 1 << 62;

/// Declared range `[min, max)` and resolution `2^-frac_bits` of a fixed-point value.
///
/// Bounds are stored in raw steps, so `min_raw = min / res` and
/// `max_raw = max / res` (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedFormat {
    min_raw: i64,
    max_raw: i64,
    frac_bits: u8,
}

impl FixedFormat {
    /// Create a format from real-valued bounds and a power-of-two resolution
    pub fn new(min: f64, max: f64, res: f64) -> Result<Self> {
        let frac_bits = frac_bits_for(res)?;
        let scale = (1u64 << frac_bits) as f64;
        let min_scaled = min * scale;
        let max_scaled = max * scale;

        let aligned = min_scaled.fract() == 0.0 && max_scaled.fract() == 0.0;
        let in_bounds = min_scaled.abs() < MAX_RAW_MAGNITUDE as f64
            && max_scaled.abs() < MAX_RAW_MAGNITUDE as f64;
        if !(min < max) || !aligned || !in_bounds {
            return Err(FixedPointError::InvalidRange { min, max, res });
        }

        Ok(Self {
            min_raw: min_scaled as i64,
            max_raw: max_scaled as i64,
            frac_bits,
        })
    }

    /// Create a format directly from raw bounds
    pub fn from_raw_bounds(min_raw: i64, max_raw: i64, frac_bits: u8) -> Result<Self> {
        let res = resolution_of(frac_bits);
        if frac_bits > MAX_FRAC_BITS {
            return Err(FixedPointError::InvalidResolution(res));
        }
        if min_raw >= max_raw
            || min_raw.abs() >= MAX_RAW_MAGNITUDE
            || max_raw.abs() >= MAX_RAW_MAGNITUDE
        {
            return Err(FixedPointError::InvalidRange {
                min: min_raw as f64 * res,
                max: max_raw as f64 * res,
                res,
            });
        }
        Ok(Self {
            min_raw,
            max_raw,
            frac_bits,
        })
    }

    /// Format wide enough to hold the exact product or pairwise sum of two
    /// operands of this format: `[-2·m², 2·m²)` at resolution `res²`, where
    /// `m` is the larger bound magnitude.
    pub fn widened(&self) -> Result<Self> {
        let frac_bits = self.frac_bits.saturating_mul(2);
        let magnitude = self.min_raw.unsigned_abs().max(self.max_raw.unsigned_abs()) as u128;
        let bound = 2 * magnitude * magnitude;
        if bound >= MAX_RAW_MAGNITUDE as u128 {
            return Err(FixedPointError::InvalidRange {
                min: -2.0 * self.min().abs().max(self.max().abs()).powi(2),
                max: 2.0 * self.min().abs().max(self.max().abs()).powi(2),
                res: resolution_of(frac_bits),
            });
        }
        Self::from_raw_bounds(-(bound as i64), bound as i64, frac_bits)
    }

    pub fn min(&self) -> f64 {
        self.min_raw as f64 * self.resolution()
    }

    pub fn max(&self) -> f64 {
        self.max_raw as f64 * self.resolution()
    }

    pub fn resolution(&self) -> f64 {
        resolution_of(self.frac_bits)
    }

    pub fn frac_bits(&self) -> u8 {
        self.frac_bits
    }

    pub fn min_raw(&self) -> i64 {
        self.min_raw
    }

    pub fn max_raw(&self) -> i64 {
        self.max_raw
    }

    /// Number of representable steps
    pub fn span(&self) -> u128 {
        (self.max_raw as i128 - self.min_raw as i128) as u128
    }

    /// Bit width `ceil(log2((max - min) / res))`
    pub fn width(&self) -> u32 {
        let span = self.span();
        if span <= 1 {
            return 0;
        }
        u128::BITS - (span - 1).leading_zeros()
    }

    /// Whether a raw value lies inside `[min_raw, max_raw)`
    pub fn contains_raw(&self, raw: i128) -> bool {
        raw >= self.min_raw as i128 && raw < self.max_raw as i128
    }

    /// Whether the format occupies a full two's complement (or unsigned) lane
    /// of `width()` bits, so values can be bit-packed without loss.
    pub fn is_packable(&self) -> bool {
        let width = self.width();
        if width == 0 || width > 64 {
            return false;
        }
        let lane = 1i128 << width;
        if self.min_raw < 0 {
            self.min_raw as i128 == -(lane / 2) && self.max_raw as i128 == lane / 2
        } else {
            self.min_raw == 0 && self.max_raw as i128 <= lane
        }
    }

    /// Reduce a raw value modulo the span into `[min_raw, max_raw)`.
    /// Returns the wrapped value and whether wrapping occurred.
    pub(crate) fn wrap(&self, raw: i128) -> (i64, bool) {
        if self.contains_raw(raw) {
            return (raw as i64, false);
        }
        let span = self.span() as i128;
        let min = self.min_raw as i128;
        let wrapped = (raw - min).rem_euclid(span) + min;
        (wrapped as i64, true)
    }
}

fn resolution_of(frac_bits: u8) -> f64 {
    (-(frac_bits as f64)).exp2()
}

fn frac_bits_for(res: f64) -> Result<u8> {
    if !(res > 0.0) || res > 1.0 {
        return Err(FixedPointError::InvalidResolution(res));
    }
    let bits = -res.log2();
    if bits.fract() != 0.0 || bits > MAX_FRAC_BITS as f64 {
        return Err(FixedPointError::InvalidResolution(res));
    }
    Ok(bits as u8)
}
