//! Free-running clock

use crate::error::{Result, SimError};
use crate::process::{Process, TaskContext};
use crate::signal::Signal;
use crate::wait::{Resume, Wait};

/// Toggles a bit signal every `half_period` time units.
///
/// The signal starts low, so the first rising edge is at `half_period` and
/// the first falling edge at `2 * half_period`.
pub struct ClockGenerator {
    clk: Signal<bool>,
    half_period: u64,
}

impl ClockGenerator {
    pub fn new(clk: Signal<bool>, half_period: u64) -> Result<Self> {
        if half_period == 0 {
            return Err(SimError::Config(
                "clock half period must be at least 1".to_string(),
            ));
        }
        Ok(Self { clk, half_period })
    }

    pub fn period(&self) -> u64 {
        2 * self.half_period
    }
}

impl Process for ClockGenerator {
    fn name(&self) -> &str {
        "clock"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait> {
        if reason != Resume::Start {
            let level = ctx.get(self.clk)?;
            ctx.set(self.clk, !level)?;
        }
        Ok(Wait::delay(self.half_period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::Netlist;
    use crate::scheduler::RunOutcome;

    #[test]
    fn test_zero_half_period_rejected() {
        let mut net = Netlist::new();
        let clk = net.signal("clk", false);
        assert!(matches!(
            ClockGenerator::new(clk, 0),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_clock_levels() {
        let mut net = Netlist::new();
        let clk = net.signal("clk", false);
        net.spawn(ClockGenerator::new(clk, 5).unwrap());
        let mut sim = net.build().unwrap();

        assert_eq!(sim.run_until(4).unwrap(), RunOutcome::TimeLimit { time: 0 });
        assert!(!sim.peek(clk).unwrap());
        sim.run_until(5).unwrap();
        assert!(sim.peek(clk).unwrap());
        sim.run_until(12).unwrap();
        assert!(!sim.peek(clk).unwrap());
        assert_eq!(sim.now(), 10);
    }
}
