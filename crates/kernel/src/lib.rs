//! sgnsim Simulation Kernel
//!
//! Discrete-event evaluation of a block graph in virtual time. Signals hold a
//! current and a pending next value, combinational blocks are re-evaluated
//! whenever an input changes, and tasks are explicit state machines resumed
//! on clock edges, levels, delays or joins over several of those.

mod clock;
mod error;
mod netlist;
mod process;
mod scheduler;
mod signal;
mod wait;

pub use clock::ClockGenerator;
pub use error::{Result, SimError};
pub use netlist::{BlockId, Netlist};
pub use process::{CombContext, Combinational, Process, TaskContext};
pub use scheduler::{RunOutcome, SimStats, Simulation, TaskId};
pub use signal::{Change, Signal, SignalId, SignalValue, Value};
pub use wait::{Edge, Resume, Trigger, Wait};
