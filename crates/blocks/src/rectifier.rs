//! Leaky rectified linear unit

use sgnsim_fixed_point::{Fixed, FixedFormat};
use sgnsim_kernel::{CombContext, Combinational, Result, Signal, SignalId};

/// Rectifier value and slope at `x`.
///
/// `x > 0` passes through with slope 1; anything else, including exactly 0,
/// is scaled by `leaky` and has slope `leaky`.
pub fn leaky_relu(x: Fixed, leaky: Fixed, format: FixedFormat) -> (Fixed, Fixed) {
    if x.is_positive() {
        (x.requantize(format), Fixed::one(format))
    } else {
        (leaky.mul(x, format), leaky.requantize(format))
    }
}

/// Combinational leaky rectifier with a derivative output
pub struct Rectifier {
    name: String,
    x: Signal<Fixed>,
    y: Signal<Fixed>,
    dy: Signal<Fixed>,
    leaky: Fixed,
    format: FixedFormat,
}

impl Rectifier {
    pub fn new(
        name: impl Into<String>,
        x: Signal<Fixed>,
        y: Signal<Fixed>,
        dy: Signal<Fixed>,
        leaky_val: f64,
        format: FixedFormat,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            x,
            y,
            dy,
            leaky: Fixed::from_f64(leaky_val, format)?,
            format,
        })
    }
}

impl Combinational for Rectifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.x.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.y.id(), self.dy.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let x = ctx.get(self.x)?;
        let (y, dy) = leaky_relu(x, self.leaky, self.format);
        ctx.drive(self.y, y)?;
        ctx.drive(self.dy, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgnsim_kernel::{Netlist, Process, Resume, TaskContext, Wait};

    fn q8() -> FixedFormat {
        FixedFormat::new(-128.0, 128.0, 2f64.powi(-8)).unwrap()
    }

    #[test]
    fn test_zero_takes_leaky_branch() {
        let fmt = q8();
        let leaky = Fixed::from_f64(0.01, fmt).unwrap();
        let (y, dy) = leaky_relu(Fixed::zero(fmt), leaky, fmt);
        assert!(y.is_zero());
        assert_eq!(dy, leaky);
        assert_eq!(dy.raw(), 3);
    }

    #[test]
    fn test_plain_relu_without_leak() {
        let fmt = q8();
        let leaky = Fixed::zero(fmt);
        let (y, dy) = leaky_relu(Fixed::from_f64(-3.5, fmt).unwrap(), leaky, fmt);
        assert!(y.is_zero());
        assert!(dy.is_zero());
    }

    /// Sweeps x through `step * i - step * n / 2` and records (x, y, dy)
    struct Sweep {
        x: Signal<Fixed>,
        y: Signal<Fixed>,
        dy: Signal<Fixed>,
        i: usize,
        n: usize,
        seen: std::rc::Rc<std::cell::RefCell<Vec<(f64, f64, f64)>>>,
    }

    impl Process for Sweep {
        fn name(&self) -> &str {
            "sweep"
        }

        fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
            if reason != Resume::Start {
                self.seen.borrow_mut().push((
                    ctx.get(self.x)?.to_f64(),
                    ctx.get(self.y)?.to_f64(),
                    ctx.get(self.dy)?.to_f64(),
                ));
            }
            if self.i == self.n {
                return Ok(Wait::Done);
            }
            let v = 0.5 * self.i as f64 - 0.5 * self.n as f64 / 2.0;
            ctx.set(self.x, Fixed::from_f64(v, q8())?)?;
            self.i += 1;
            Ok(Wait::delay(10))
        }
    }

    #[test]
    fn test_sweep_through_zero() {
        let fmt = q8();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut net = Netlist::new();
        let x = net.signal("x", Fixed::zero(fmt));
        let y = net.signal("y", Fixed::zero(fmt));
        let dy = net.signal("dy", Fixed::zero(fmt));
        net.add_block(Rectifier::new("relu", x, y, dy, 0.01, fmt).unwrap());
        net.spawn(Sweep {
            x,
            y,
            dy,
            i: 0,
            n: 10,
            seen: seen.clone(),
        });
        net.build().unwrap().run().unwrap();

        let leaky = 3.0 / 256.0;
        let seen = seen.borrow();
        assert_eq!(seen.len(), 10);
        for &(x, y, dy) in seen.iter() {
            if x > 0.0 {
                assert_eq!(y, x);
                assert_eq!(dy, 1.0);
            } else {
                let expected = Fixed::from_f64(leaky * x, fmt).unwrap().to_f64();
                assert_eq!(y, expected, "x = {}", x);
                assert_eq!(dy, leaky);
            }
        }
        // The sweep covers -2.5 ..= 2.0, including 0
        assert!(seen.iter().any(|&(x, _, _)| x == 0.0));
    }
}
