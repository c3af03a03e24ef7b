//! Fixed-point scalar type

use std::cell::Cell;
use std::cmp::Ordering;

use crate::error::{FixedPointError, Result};
use crate::format::FixedFormat;

thread_local! {
    static WRAP_EVENTS: Cell<u64> = const { Cell::new(0) };
}

/// Number of range wraps observed on this thread since the last reset.
///
/// Only counted in debug builds; release builds always report 0.
pub fn wrap_count() -> u64 {
    WRAP_EVENTS.with(|c| c.get())
}

/// Reset this thread's wrap counter
pub fn reset_wrap_count() {
    WRAP_EVENTS.with(|c| c.set(0));
}

#[inline]
fn note_wrap(raw: i128, format: &FixedFormat) {
    if cfg!(debug_assertions) {
        WRAP_EVENTS.with(|c| c.set(c.get() + 1));
        tracing::trace!(
            raw = %raw,
            min = format.min(),
            max = format.max(),
            "fixed-point value wrapped"
        );
    }
}

/// Shift `value` right by `shift` bits rounding to nearest, ties away from zero.
/// A negative shift scales up instead.
fn shift_round(value: i128, shift: i32) -> i128 {
    match shift.cmp(&0) {
        Ordering::Equal => value,
        Ordering::Less => value << (-shift),
        Ordering::Greater => {
            let half = 1i128 << (shift - 1);
            if value >= 0 {
                (value + half) >> shift
            } else {
                -((-value + half) >> shift)
            }
        }
    }
}

/// A fixed-point number: raw integer steps of `2^-frac_bits` in a declared range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixed {
    raw: i64,
    format: FixedFormat,
}

impl Fixed {
    /// Create from a raw step count, wrapping into the format's range
    pub fn from_raw(raw: i64, format: FixedFormat) -> Self {
        Self::from_wide_raw(raw as i128, format)
    }

    fn from_wide_raw(raw: i128, format: FixedFormat) -> Self {
        let (raw, wrapped) = format.wrap(raw);
        if wrapped {
            note_wrap(raw as i128, &format);
        }
        Self { raw, format }
    }

    /// Quantize a real value to the nearest step, wrapping out-of-range results
    pub fn from_f64(value: f64, format: FixedFormat) -> Result<Self> {
        if !value.is_finite() {
            return Err(FixedPointError::NonFinite(value));
        }
        let scale_factor = (1u64 << format.frac_bits()) as f64;
        let scaled = (value * scale_factor).round();
        if scaled.abs() >= i128::MAX as f64 {
            return Err(FixedPointError::NonFinite(value));
        }
        Ok(Self::from_wide_raw(scaled as i128, format))
    }

    pub fn zero(format: FixedFormat) -> Self {
        Self::from_raw(0, format)
    }

    /// 1.0 in the given format (wraps if 1.0 is out of range)
    pub fn one(format: FixedFormat) -> Self {
        Self::from_wide_raw(1i128 << format.frac_bits(), format)
    }

    pub fn raw(self) -> i64 {
        self.raw
    }

    pub fn format(self) -> FixedFormat {
        self.format
    }

    /// Convert back to floating-point
    pub fn to_f64(self) -> f64 {
        self.raw as f64 * self.format.resolution()
    }

    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    /// Strictly greater than zero
    pub fn is_positive(self) -> bool {
        self.raw > 0
    }

    /// Re-quantize into another format: round to the nearest step of the
    /// target resolution, then wrap into the target range.
    pub fn requantize(self, out: FixedFormat) -> Self {
        let shift = self.format.frac_bits() as i32 - out.frac_bits() as i32;
        Self::from_wide_raw(shift_round(self.raw as i128, shift), out)
    }

    /// Align two operands to their finer resolution
    fn aligned(self, rhs: Self) -> (i128, i128, u8) {
        let frac = self.format.frac_bits().max(rhs.format.frac_bits());
        let a = (self.raw as i128) << (frac - self.format.frac_bits());
        let b = (rhs.raw as i128) << (frac - rhs.format.frac_bits());
        (a, b, frac)
    }

    fn narrow(exact: i128, exact_frac: u8, out: FixedFormat) -> Self {
        let shift = exact_frac as i32 - out.frac_bits() as i32;
        Self::from_wide_raw(shift_round(exact, shift), out)
    }

    /// Exact sum, re-quantized to `out`
    pub fn add(self, rhs: Self, out: FixedFormat) -> Self {
        let (a, b, frac) = self.aligned(rhs);
        Self::narrow(a + b, frac, out)
    }

    /// Exact difference, re-quantized to `out`
    pub fn sub(self, rhs: Self, out: FixedFormat) -> Self {
        let (a, b, frac) = self.aligned(rhs);
        Self::narrow(a - b, frac, out)
    }

    /// Exact product, re-quantized to `out`
    pub fn mul(self, rhs: Self, out: FixedFormat) -> Self {
        let exact = self.raw as i128 * rhs.raw as i128;
        let frac = self.format.frac_bits() + rhs.format.frac_bits();
        Self::narrow(exact, frac, out)
    }

    /// Negate within the same format (wraps at the minimum)
    pub fn neg(self) -> Self {
        Self::from_wide_raw(-(self.raw as i128), self.format)
    }

    /// Compare real values regardless of format
    pub fn value_cmp(self, other: Self) -> Ordering {
        let (a, b, _) = self.aligned(other);
        a.cmp(&b)
    }

    /// Lane encoding: two's complement for signed formats, plain for unsigned
    pub fn to_bits(self) -> Result<u64> {
        if !self.format.is_packable() {
            return Err(self.not_packable());
        }
        let width = self.format.width();
        let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        Ok(self.raw as u64 & mask)
    }

    /// Decode a lane produced by [`Fixed::to_bits`]
    pub fn from_bits(bits: u64, format: FixedFormat) -> Result<Self> {
        if !format.is_packable() {
            return Err(FixedPointError::NotPackable {
                min: format.min(),
                max: format.max(),
                width: format.width(),
            });
        }
        let width = format.width();
        let raw = if format.min_raw() < 0 {
            // sign-extend
            let shift = 64 - width;
            ((bits << shift) as i64) >> shift
        } else {
            bits as i64
        };
        Ok(Self::from_raw(raw, format))
    }

    fn not_packable(self) -> FixedPointError {
        FixedPointError::NotPackable {
            min: self.format.min(),
            max: self.format.max(),
            width: self.format.width(),
        }
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}
