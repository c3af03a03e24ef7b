//! Kernel error types

use sgnsim_fixed_point::FixedPointError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Combinational loop through blocks: {}", .blocks.join(" -> "))]
    CombinationalLoop { blocks: Vec<String> },

    #[error("Signal '{signal}' is driven by more than one block ('{first}' and '{second}')")]
    MultipleDrivers {
        signal: String,
        first: String,
        second: String,
    },

    #[error("Signal '{signal}' is driven by block '{block}' and cannot be written by a task")]
    DrivenByBlock { signal: String, block: String },

    #[error("Block '{block}' wrote undeclared output '{signal}'")]
    UndeclaredOutput { block: String, signal: String },

    #[error("Type mismatch on signal '{signal}': expected {expected}, found {found}")]
    TypeMismatch {
        signal: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown signal id {0}")]
    UnknownSignal(usize),

    #[error("Task '{task}' waited on an empty join")]
    EmptyJoin { task: String },

    #[error("Delta cycle limit ({limit}) exceeded at time {time}")]
    DeltaLimit { time: u64, limit: usize },

    #[error("Virtual time overflow at {time} + {delay}")]
    TimeOverflow { time: u64, delay: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] FixedPointError),

    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },
}

impl SimError {
    /// Wrap a foreign error raised inside a task
    pub fn task(task: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Task {
            task: task.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
