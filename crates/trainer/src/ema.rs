//! Exponential moving average of the training loss

use sgnsim_fixed_point::{Fixed, FixedFormat};

use crate::error::Result;

/// `ema ← ema + weight · (error - ema)`, kept in the datapath format.
///
/// The difference is taken in the widened format so that a large error never
/// wraps before it is scaled down by `weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossEma {
    value: Fixed,
    weight: Fixed,
    format: FixedFormat,
    wide: FixedFormat,
}

impl LossEma {
    pub fn new(init: f64, weight: f64, format: FixedFormat) -> Result<Self> {
        Ok(Self {
            value: Fixed::from_f64(init, format)?,
            weight: Fixed::from_f64(weight, format)?,
            format,
            wide: format.widened()?,
        })
    }

    pub fn value(&self) -> Fixed {
        self.value
    }

    /// Fold one instantaneous loss into the average and return the new value
    pub fn update(&mut self, error: Fixed) -> Fixed {
        let gap = error.sub(self.value, self.wide);
        let delta = self.weight.mul(gap, self.format);
        self.value = self.value.add(delta, self.format);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q8() -> FixedFormat {
        FixedFormat::new(-128.0, 128.0, 2f64.powi(-8)).unwrap()
    }

    fn fx(v: f64) -> Fixed {
        Fixed::from_f64(v, q8()).unwrap()
    }

    #[test]
    fn test_weight_is_quantized() {
        let ema = LossEma::new(1.0, 0.01, q8()).unwrap();
        assert_eq!(ema.value().to_f64(), 1.0);
        // 0.01 * 256 = 2.56 -> 3 steps
        assert_eq!(ema.weight.raw(), 3);
    }

    #[test]
    fn test_update_moves_toward_error() {
        let mut ema = LossEma::new(1.0, 0.25, q8()).unwrap();
        assert_eq!(ema.update(fx(0.0)).to_f64(), 0.75);
        assert_eq!(ema.update(fx(0.0)).to_f64(), 0.5625);
        assert_eq!(ema.update(fx(2.0)).to_f64(), 0.5625 + 0.25 * (2.0 - 0.5625));
    }

    #[test]
    fn test_small_gap_rounds_to_no_change() {
        let mut ema = LossEma::new(1.0, 0.01, q8()).unwrap();
        // 3/256 * (1.0 + 1/256 - 1.0) is far below one step
        let before = ema.value();
        assert_eq!(ema.update(fx(1.0 + 1.0 / 256.0)), before);
    }

    #[test]
    fn test_large_error_does_not_wrap_the_gap() {
        let mut ema = LossEma::new(-100.0, 0.5, q8()).unwrap();
        // 100 - (-100) = 200 is outside the narrow range but fits the widened one
        assert_eq!(ema.update(fx(100.0)).to_f64(), 0.0);
    }
}
