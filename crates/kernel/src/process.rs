//! Tasks and combinational blocks, and the contexts they run in

use crate::error::{Result, SimError};
use crate::signal::{Change, Driver, Signal, SignalId, SignalStore, SignalValue};
use crate::wait::{Resume, Wait};

/// A suspendable task, re-entered by the scheduler with the reason it woke.
///
/// Each call runs until the task's next suspension point and returns the
/// [`Wait`] it suspends on. Writes made through the context are scheduled and
/// become visible at the following delta cycle.
pub trait Process {
    fn name(&self) -> &str;

    fn resume(&mut self, ctx: &mut TaskContext<'_>, reason: Resume) -> Result<Wait>;
}

/// View of the simulation handed to a resumed task
pub struct TaskContext<'a> {
    pub(crate) store: &'a mut SignalStore,
    pub(crate) block_names: &'a [String],
    pub(crate) stop: &'a mut bool,
    pub(crate) now: u64,
}

impl<'a> TaskContext<'a> {
    /// Current virtual time
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Read the current value of a signal
    pub fn get<T: SignalValue>(&self, signal: Signal<T>) -> Result<T> {
        self.store.get(signal)
    }

    /// Schedule `value` as the signal's next value
    pub fn set<T: SignalValue>(&mut self, signal: Signal<T>, value: T) -> Result<()> {
        if let Driver::Block(block) = self.store.driver(signal.id())? {
            return Err(SimError::DrivenByBlock {
                signal: self.store.name(signal.id()).to_string(),
                block: self.block_names.get(block).cloned().unwrap_or_default(),
            });
        }
        self.store.schedule(signal.id(), value.into_value())
    }

    /// Raise the stop condition; the run ends once the current instant settles
    pub fn stop(&mut self) {
        *self.stop = true;
    }
}

/// A block whose outputs are a pure function of its current inputs
pub trait Combinational {
    fn name(&self) -> &str;

    /// Signals read by [`Combinational::evaluate`]
    fn inputs(&self) -> Vec<SignalId>;

    /// Signals driven by this block; no other block or task may write them
    fn outputs(&self) -> Vec<SignalId>;

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()>;
}

/// View of the simulation handed to an evaluating block
pub struct CombContext<'a> {
    pub(crate) store: &'a mut SignalStore,
    pub(crate) block: usize,
    pub(crate) block_name: &'a str,
    pub(crate) changes: &'a mut Vec<Change>,
}

impl<'a> CombContext<'a> {
    pub fn get<T: SignalValue>(&self, signal: Signal<T>) -> Result<T> {
        self.store.get(signal)
    }

    /// Drive an output; the new value is visible to downstream blocks within
    /// the same settle pass.
    pub fn drive<T: SignalValue>(&mut self, signal: Signal<T>, value: T) -> Result<()> {
        if self.store.driver(signal.id())? != Driver::Block(self.block) {
            return Err(SimError::UndeclaredOutput {
                block: self.block_name.to_string(),
                signal: self.store.name(signal.id()).to_string(),
            });
        }
        if let Some(change) = self.store.drive_now(signal.id(), value.into_value())? {
            self.changes.push(change);
        }
        Ok(())
    }
}
