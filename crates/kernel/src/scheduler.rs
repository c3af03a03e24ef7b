//! Event scheduler
//!
//! Time advances in instants. Within an instant the scheduler repeats delta
//! cycles: ready tasks are resumed in registration order, their scheduled
//! writes are committed, the combinational blocks downstream of every change
//! are re-evaluated in dependency order until nothing changes, and the
//! committed changes are matched against the waits of suspended tasks. When
//! no task is ready and no write is pending, time jumps to the earliest timer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use crate::error::{Result, SimError};
use crate::process::{CombContext, Combinational, Process, TaskContext};
use crate::signal::{Change, Driver, Signal, SignalId, SignalStore, SignalValue, Value};
use crate::wait::{PendingWait, Resume, Trigger, Wait};

/// Default bound on delta cycles within one instant
pub const DEFAULT_DELTA_LIMIT: usize = 10_000;

/// Index of a task in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a call to [`Simulation::run_until`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A task raised the stop condition
    Stopped { time: u64 },
    /// No task is ready and no timer is pending
    Idle { time: u64 },
    /// The next event lies beyond the requested time
    TimeLimit { time: u64 },
}

impl RunOutcome {
    pub fn time(&self) -> u64 {
        match *self {
            RunOutcome::Stopped { time }
            | RunOutcome::Idle { time }
            | RunOutcome::TimeLimit { time } => time,
        }
    }
}

/// Work counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub deltas: u64,
    pub evaluations: u64,
    pub resumes: u64,
}

enum TaskState {
    Ready,
    Waiting(PendingWait),
    Done,
}

struct TaskSlot {
    name: String,
    process: Box<dyn Process>,
    state: TaskState,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Timer {
    at: u64,
    seq: u64,
    task: usize,
    generation: u64,
    index: usize,
}

/// A built design and its virtual clock
pub struct Simulation {
    now: u64,
    store: SignalStore,
    blocks: Vec<Box<dyn Combinational>>,
    block_names: Vec<String>,
    order: Vec<usize>,
    fanout: Vec<Vec<usize>>,
    tasks: Vec<TaskSlot>,
    timers: BinaryHeap<Reverse<Timer>>,
    ready: Vec<(usize, Resume)>,
    timer_seq: u64,
    generation: u64,
    started: bool,
    stopped: bool,
    delta_limit: usize,
    stats: SimStats,
}

impl Simulation {
    pub(crate) fn new(
        store: SignalStore,
        blocks: Vec<Box<dyn Combinational>>,
        block_names: Vec<String>,
        order: Vec<usize>,
        fanout: Vec<Vec<usize>>,
        processes: Vec<Box<dyn Process>>,
    ) -> Self {
        let tasks = processes
            .into_iter()
            .map(|process| TaskSlot {
                name: process.name().to_string(),
                process,
                state: TaskState::Ready,
            })
            .collect();

        Self {
            now: 0,
            store,
            blocks,
            block_names,
            order,
            fanout,
            tasks,
            timers: BinaryHeap::new(),
            ready: Vec::new(),
            timer_seq: 0,
            generation: 0,
            started: false,
            stopped: false,
            delta_limit: DEFAULT_DELTA_LIMIT,
            stats: SimStats::default(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn set_delta_limit(&mut self, limit: usize) {
        self.delta_limit = limit;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_done(&self, task: TaskId) -> bool {
        matches!(
            self.tasks.get(task.0).map(|t| &t.state),
            Some(TaskState::Done)
        )
    }

    pub fn signal_name(&self, id: SignalId) -> &str {
        self.store.name(id)
    }

    /// Read the current value of a signal
    pub fn peek<T: SignalValue>(&self, signal: Signal<T>) -> Result<T> {
        self.store.get(signal)
    }

    /// Schedule a write from outside the design, committed at the next delta
    pub fn poke<T: SignalValue>(&mut self, signal: Signal<T>, value: T) -> Result<()> {
        if let Driver::Block(block) = self.store.driver(signal.id())? {
            return Err(SimError::DrivenByBlock {
                signal: self.store.name(signal.id()).to_string(),
                block: self.block_names[block].clone(),
            });
        }
        self.store.schedule(signal.id(), value.into_value())
    }

    /// Run until a task raises stop or no further events exist
    pub fn run(&mut self) -> Result<RunOutcome> {
        self.run_until(u64::MAX)
    }

    /// Run until stop, idle, or the next event would lie beyond `limit`
    pub fn run_until(&mut self, limit: u64) -> Result<RunOutcome> {
        if self.stopped {
            return Ok(RunOutcome::Stopped { time: self.now });
        }
        if !self.started {
            self.start()?;
        }

        loop {
            self.run_instant()?;
            if self.stopped {
                debug!(time = self.now, "Simulation stopped");
                return Ok(RunOutcome::Stopped { time: self.now });
            }

            let Some(next) = self.next_timer() else {
                debug!(time = self.now, "Simulation idle");
                return Ok(RunOutcome::Idle { time: self.now });
            };
            if next > limit {
                return Ok(RunOutcome::TimeLimit { time: self.now });
            }

            self.now = next;
            self.fire_timers(next);
        }
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        debug!(
            blocks = self.blocks.len(),
            tasks = self.tasks.len(),
            "Simulation starting"
        );

        let mut changes = Vec::new();
        let mut dirty = vec![true; self.blocks.len()];
        self.settle(&mut dirty, &mut changes)?;

        self.ready = (0..self.tasks.len()).map(|t| (t, Resume::Start)).collect();
        Ok(())
    }

    /// Delta cycles at the current time until nothing is ready or pending
    fn run_instant(&mut self) -> Result<()> {
        let mut deltas = 0usize;

        while !self.ready.is_empty() || self.store.has_pending() {
            deltas += 1;
            if deltas > self.delta_limit {
                return Err(SimError::DeltaLimit {
                    time: self.now,
                    limit: self.delta_limit,
                });
            }
            self.stats.deltas += 1;

            let mut ready = std::mem::take(&mut self.ready);
            ready.sort_by_key(|(task, _)| *task);
            for (task, reason) in ready {
                self.resume_task(task, reason)?;
            }

            let mut changes = self.store.commit();
            let mut dirty = vec![false; self.blocks.len()];
            self.mark_readers(&changes, &mut dirty);
            self.settle(&mut dirty, &mut changes)?;
            trace!(time = self.now, delta = deltas, changes = changes.len(), "Delta cycle");

            if self.stopped {
                return Ok(());
            }
            self.match_changes(&changes);
        }
        Ok(())
    }

    fn mark_readers(&self, changes: &[Change], dirty: &mut [bool]) {
        for change in changes {
            for &block in &self.fanout[change.signal.index()] {
                dirty[block] = true;
            }
        }
    }

    /// Evaluate dirty blocks in dependency order, dirtying their readers
    fn settle(&mut self, dirty: &mut [bool], changes: &mut Vec<Change>) -> Result<()> {
        for pos in 0..self.order.len() {
            let block = self.order[pos];
            if !dirty[block] {
                continue;
            }
            dirty[block] = false;

            let start = changes.len();
            let mut ctx = CombContext {
                store: &mut self.store,
                block,
                block_name: &self.block_names[block],
                changes: &mut *changes,
            };
            self.blocks[block].evaluate(&mut ctx)?;
            self.stats.evaluations += 1;

            for change in &changes[start..] {
                for &reader in &self.fanout[change.signal.index()] {
                    dirty[reader] = true;
                }
            }
        }
        Ok(())
    }

    fn resume_task(&mut self, task: usize, reason: Resume) -> Result<()> {
        let slot = &mut self.tasks[task];
        if matches!(slot.state, TaskState::Done) {
            return Ok(());
        }

        let mut ctx = TaskContext {
            store: &mut self.store,
            block_names: &self.block_names,
            stop: &mut self.stopped,
            now: self.now,
        };
        let wait = slot.process.resume(&mut ctx, reason)?;
        self.stats.resumes += 1;
        self.install_wait(task, wait)
    }

    fn bit_value(&self, signal: SignalId) -> Result<bool> {
        match self.store.value(signal)? {
            Value::Bit(b) => Ok(*b),
            other => Err(SimError::TypeMismatch {
                signal: self.store.name(signal).to_string(),
                expected: "bit",
                found: other.kind(),
            }),
        }
    }

    fn install_wait(&mut self, task: usize, wait: Wait) -> Result<()> {
        self.generation += 1;
        let generation = self.generation;

        let mut pending = match wait {
            Wait::Done => {
                debug!(task = %self.tasks[task].name, time = self.now, "Task finished");
                self.tasks[task].state = TaskState::Done;
                return Ok(());
            }
            Wait::On(trigger) => PendingWait::single(trigger, generation),
            Wait::Join(triggers) => {
                if triggers.is_empty() {
                    return Err(SimError::EmptyJoin {
                        task: self.tasks[task].name.clone(),
                    });
                }
                PendingWait::join(triggers, generation)
            }
        };

        let mut fire_now = Vec::new();
        for (index, trigger) in pending.triggers.iter().enumerate() {
            match *trigger {
                Trigger::Delay(0) => fire_now.push(index),
                Trigger::Delay(delay) => {
                    let at = self
                        .now
                        .checked_add(delay)
                        .ok_or(SimError::TimeOverflow {
                            time: self.now,
                            delay,
                        })?;
                    self.timer_seq += 1;
                    self.timers.push(Reverse(Timer {
                        at,
                        seq: self.timer_seq,
                        task,
                        generation,
                        index,
                    }));
                }
                Trigger::Level { signal, level } => {
                    if self.bit_value(signal)? == level {
                        fire_now.push(index);
                    }
                }
                Trigger::Edge { signal, .. } => {
                    self.bit_value(signal)?;
                }
                Trigger::Changed { signal } => {
                    self.store.value(signal)?;
                }
            }
        }
        for index in fire_now {
            pending.fire(index);
        }

        if pending.is_complete() {
            self.ready.push((task, pending.resume_reason()));
            self.tasks[task].state = TaskState::Ready;
        } else {
            self.tasks[task].state = TaskState::Waiting(pending);
        }
        Ok(())
    }

    /// Fire signal triggers of every suspended task against one delta's changes
    fn match_changes(&mut self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }

        for (task, slot) in self.tasks.iter_mut().enumerate() {
            let TaskState::Waiting(pending) = &mut slot.state else {
                continue;
            };

            for index in 0..pending.triggers.len() {
                if pending.is_fired(index) {
                    continue;
                }
                let hit = match pending.triggers[index] {
                    Trigger::Edge { signal, edge } => changes
                        .iter()
                        .any(|c| c.signal == signal && c.edge() == Some(edge)),
                    Trigger::Level { signal, level } => changes
                        .iter()
                        .any(|c| c.signal == signal && c.new == Value::Bit(level)),
                    Trigger::Changed { signal } => changes.iter().any(|c| c.signal == signal),
                    Trigger::Delay(_) => false,
                };
                if hit {
                    pending.fire(index);
                }
            }

            if pending.is_complete() {
                let reason = pending.resume_reason();
                slot.state = TaskState::Ready;
                self.ready.push((task, reason));
            }
        }
    }

    fn is_live(&self, timer: &Timer) -> bool {
        matches!(
            &self.tasks[timer.task].state,
            TaskState::Waiting(pending) if pending.generation == timer.generation
        )
    }

    /// Earliest live timer, dropping stale ones from the queue
    fn next_timer(&mut self) -> Option<u64> {
        while let Some(Reverse(timer)) = self.timers.peek() {
            if self.is_live(timer) {
                return Some(timer.at);
            }
            self.timers.pop();
        }
        None
    }

    fn fire_timers(&mut self, at: u64) {
        while let Some(Reverse(timer)) = self.timers.peek() {
            if timer.at != at {
                break;
            }
            let Some(Reverse(timer)) = self.timers.pop() else {
                break;
            };

            let slot = &mut self.tasks[timer.task];
            if let TaskState::Waiting(pending) = &mut slot.state {
                if pending.generation != timer.generation {
                    continue;
                }
                pending.fire(timer.index);
                if pending.is_complete() {
                    let reason = pending.resume_reason();
                    slot.state = TaskState::Ready;
                    self.ready.push((timer.task, reason));
                }
            }
        }
    }
}
