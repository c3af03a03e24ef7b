//! Single-pair convergence bench
//!
//! Feeds the update datapath's proposed embeddings straight back into its
//! inputs once per clock, for one word/context pair with label 1.0, until
//! the squared error quantizes to zero.

use std::cell::RefCell;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use sgnsim_blocks::{wire_update, UpdatePorts};
use sgnsim_fixed_point::{EmbeddingVector, Fixed};
use sgnsim_kernel::{
    ClockGenerator, Netlist, Process, Resume, Result as SimResult, Signal, TaskContext, Wait,
};

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};

/// Error trajectory of a convergence run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvergeReport {
    /// Squared error sampled at each iteration
    pub errors: Vec<f64>,
    /// Score sampled at each iteration
    pub scores: Vec<f64>,
    /// Whether the error reached zero within the iteration limit
    pub converged: bool,
}

impl ConvergeReport {
    pub fn iterations(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Init,
    Iterate(usize),
}

struct ConvergeBench {
    clk: Signal<bool>,
    word: Signal<EmbeddingVector>,
    context: Signal<EmbeddingVector>,
    update: UpdatePorts,
    initial: (EmbeddingVector, EmbeddingVector),
    max_iters: usize,
    phase: Phase,
    report: Rc<RefCell<ConvergeReport>>,
}

impl Process for ConvergeBench {
    fn name(&self) -> &str {
        "converge"
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, _reason: Resume) -> SimResult<Wait> {
        match self.phase {
            Phase::Start => {
                self.phase = Phase::Init;
                Ok(Wait::rising(self.clk))
            }
            Phase::Init => {
                ctx.set(self.word, self.initial.0.clone())?;
                ctx.set(self.context, self.initial.1.clone())?;
                self.phase = Phase::Iterate(0);
                Ok(Wait::falling(self.clk))
            }
            Phase::Iterate(i) => {
                let error = ctx.get(self.update.error)?;
                let score = ctx.get(self.update.score())?;
                tracing::debug!(
                    time = ctx.now(),
                    score = score.to_f64(),
                    error = error.to_f64(),
                    "converge"
                );
                {
                    let mut report = self.report.borrow_mut();
                    report.errors.push(error.to_f64());
                    report.scores.push(score.to_f64());
                    report.converged = error.is_zero();
                }

                if error.is_zero() || i + 1 >= self.max_iters {
                    ctx.stop();
                    return Ok(Wait::Done);
                }
                let new_word = ctx.get(self.update.new_word)?;
                let new_context = ctx.get(self.update.new_context)?;
                ctx.set(self.word, new_word)?;
                ctx.set(self.context, new_context)?;
                self.phase = Phase::Iterate(i + 1);
                Ok(Wait::falling(self.clk))
            }
        }
    }
}

/// Run the bench from random embeddings drawn uniformly from
/// `[-emb_spread, emb_spread)` with `config.seed`
pub fn converge_pair(config: &TrainConfig, max_iters: usize) -> Result<ConvergeReport> {
    config.validate()?;
    let format = config.fixed_format()?;
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    let spread = config.emb_spread;

    let mut word = Vec::with_capacity(config.embedding_dim);
    let mut context = Vec::with_capacity(config.embedding_dim);
    for _ in 0..config.embedding_dim {
        word.push(Fixed::from_f64(rng.gen_range(-spread..spread), format)?);
        context.push(Fixed::from_f64(rng.gen_range(-spread..spread), format)?);
    }
    let word = EmbeddingVector::from_values(word, format)?;
    let context = EmbeddingVector::from_values(context, format)?;
    converge_from(config, word, context, max_iters)
}

/// Run the bench from the given embeddings
pub fn converge_from(
    config: &TrainConfig,
    word: EmbeddingVector,
    context: EmbeddingVector,
    max_iters: usize,
) -> Result<ConvergeReport> {
    if max_iters == 0 {
        return Err(TrainError::Config("max_iters must be at least 1".into()));
    }
    let datapath = config.datapath()?;
    let format = datapath.format;

    let mut net = Netlist::new();
    let clk = net.signal("clk", false);
    let word_sig = net.signal("word", datapath.zero_vector());
    let context_sig = net.signal("context", datapath.zero_vector());
    let label = net.signal("label", Fixed::one(format));
    let update = wire_update(&mut net, "wcu", word_sig, context_sig, label, &datapath)?;

    let report = Rc::new(RefCell::new(ConvergeReport::default()));
    net.spawn(ClockGenerator::new(clk, config.half_period)?);
    net.spawn(ConvergeBench {
        clk,
        word: word_sig,
        context: context_sig,
        update,
        initial: (word, context),
        max_iters,
        phase: Phase::Start,
        report: Rc::clone(&report),
    });

    let mut sim = net.build()?;
    sim.run()?;

    let report = report.borrow().clone();
    tracing::info!(
        "Convergence bench: {} iterations, converged: {}",
        report.iterations(),
        report.converged
    );
    Ok(report)
}
