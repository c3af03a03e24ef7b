//! Task sensitivities: triggers, waits and resume reasons

use crate::signal::{Signal, SignalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// A single wake-up condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Transition of a bit signal
    Edge { signal: SignalId, edge: Edge },
    /// Bit signal at the given level (fires immediately if already there)
    Level { signal: SignalId, level: bool },
    /// Any committed change of the signal's value
    Changed { signal: SignalId },
    /// Fixed number of time units after the wait began
    Delay(u64),
}

impl Trigger {
    pub fn rising(signal: Signal<bool>) -> Self {
        Self::Edge {
            signal: signal.id(),
            edge: Edge::Rising,
        }
    }

    pub fn falling(signal: Signal<bool>) -> Self {
        Self::Edge {
            signal: signal.id(),
            edge: Edge::Falling,
        }
    }

    pub fn level(signal: Signal<bool>, level: bool) -> Self {
        Self::Level {
            signal: signal.id(),
            level,
        }
    }

    pub fn changed<T>(signal: Signal<T>) -> Self {
        Self::Changed {
            signal: signal.id(),
        }
    }

    pub fn delay(time: u64) -> Self {
        Self::Delay(time)
    }
}

/// What a task suspends on when it yields back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    /// Resume when the trigger fires
    On(Trigger),
    /// Resume once every trigger has fired at least once since the wait began
    Join(Vec<Trigger>),
    /// The task has finished and is never resumed again
    Done,
}

impl Wait {
    pub fn rising(signal: Signal<bool>) -> Self {
        Self::On(Trigger::rising(signal))
    }

    pub fn falling(signal: Signal<bool>) -> Self {
        Self::On(Trigger::falling(signal))
    }

    pub fn level(signal: Signal<bool>, level: bool) -> Self {
        Self::On(Trigger::level(signal, level))
    }

    pub fn changed<T>(signal: Signal<T>) -> Self {
        Self::On(Trigger::changed(signal))
    }

    pub fn delay(time: u64) -> Self {
        Self::On(Trigger::delay(time))
    }

    pub fn join(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        Self::Join(triggers.into_iter().collect())
    }
}

/// Why a task is being re-entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// First activation at time 0
    Start,
    /// The single trigger of a [`Wait::On`] fired
    Fired(Trigger),
    /// Every trigger of a [`Wait::Join`] has fired
    Joined,
}

/// An installed wait: a counter of outstanding triggers
#[derive(Debug)]
pub(crate) struct PendingWait {
    pub generation: u64,
    pub triggers: Vec<Trigger>,
    fired: Vec<bool>,
    outstanding: usize,
    joined: bool,
}

impl PendingWait {
    pub fn single(trigger: Trigger, generation: u64) -> Self {
        Self::new(vec![trigger], false, generation)
    }

    pub fn join(triggers: Vec<Trigger>, generation: u64) -> Self {
        Self::new(triggers, true, generation)
    }

    fn new(triggers: Vec<Trigger>, joined: bool, generation: u64) -> Self {
        let outstanding = triggers.len();
        Self {
            generation,
            fired: vec![false; outstanding],
            triggers,
            outstanding,
            joined,
        }
    }

    pub fn is_fired(&self, index: usize) -> bool {
        self.fired.get(index).copied().unwrap_or(true)
    }

    /// Mark a trigger as fired; repeated firings count once
    pub fn fire(&mut self, index: usize) {
        if let Some(flag) = self.fired.get_mut(index) {
            if !*flag {
                *flag = true;
                self.outstanding -= 1;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding == 0
    }

    pub fn resume_reason(&self) -> Resume {
        if self.joined {
            Resume::Joined
        } else {
            Resume::Fired(self.triggers[0].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_counts_each_trigger_once() {
        let mut wait = PendingWait::join(
            vec![
                Trigger::Changed { signal: SignalId(0) },
                Trigger::Changed { signal: SignalId(1) },
            ],
            7,
        );
        wait.fire(0);
        wait.fire(0);
        assert!(!wait.is_complete());
        wait.fire(1);
        assert!(wait.is_complete());
        assert_eq!(wait.resume_reason(), Resume::Joined);
    }

    #[test]
    fn test_single_reports_trigger() {
        let mut wait = PendingWait::single(Trigger::Delay(5), 1);
        wait.fire(0);
        assert_eq!(wait.resume_reason(), Resume::Fired(Trigger::Delay(5)));
    }
}
