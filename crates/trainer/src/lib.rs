//! sgnsim Trainer
//!
//! Wires the word-context datapath, two memory banks and a clock into one
//! simulation, and drives it with skip-gram examples: every adjacent word
//! pair of the corpus is trained as a positive example followed by a
//! negative example with a uniformly sampled context.

mod config;
mod converge;
mod corpus;
mod driver;
mod ema;
mod error;
mod pipeline;
mod sampler;
mod telemetry;

pub use config::TrainConfig;
pub use converge::{converge_from, converge_pair, ConvergeReport};
pub use corpus::{Corpus, Vocabulary};
pub use driver::{DriverPorts, TrainingDriver};
pub use ema::LossEma;
pub use error::{Result, TrainError};
pub use pipeline::{Trainer, TrainingReport};
pub use sampler::{Example, PairCursor, SampleKind};
pub use telemetry::{SharedLog, StepRecord, TrainingLog};
