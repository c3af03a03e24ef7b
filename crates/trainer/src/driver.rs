//! Training driver task
//!
//! Feeds skip-gram examples through the update datapath. For every example
//! it reads both embeddings one dimension at a time from the two memory
//! banks, waits one clock for the datapath to settle, folds the loss into the
//! EMA and writes the proposed embeddings back, again one dimension at a time.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sgnsim_blocks::{MemoryPorts, UpdatePorts};
use sgnsim_fixed_point::{EmbeddingVector, Fixed, FixedFormat};
use sgnsim_kernel::{Process, Result, Resume, SimError, Signal, TaskContext, Trigger, Wait};

use crate::config::TrainConfig;
use crate::corpus::Corpus;
use crate::ema::LossEma;
use crate::sampler::{Example, PairCursor, SampleKind};
use crate::telemetry::{SharedLog, StepRecord};

/// Signals the driver reads and writes
#[derive(Debug, Clone, Copy)]
pub struct DriverPorts {
    pub clk: Signal<bool>,
    /// Word embedding presented to the datapath
    pub word: Signal<EmbeddingVector>,
    /// Context embedding presented to the datapath
    pub context: Signal<EmbeddingVector>,
    pub label: Signal<Fixed>,
    pub update: UpdatePorts,
    /// Word embedding bank
    pub wram: MemoryPorts,
    /// Context embedding bank
    pub cram: MemoryPorts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    /// Waiting for the falling edge that starts the next positive pair
    AwaitPair,
    /// Read of dimension `j` in flight
    Reading(usize),
    /// Waiting one clock for the datapath outputs
    Settling,
    /// Write of dimension `j` in flight
    Writing(usize),
    Finished,
}

/// Proposed embeddings sampled from the datapath, pending write-back
struct Pending {
    word: EmbeddingVector,
    context: EmbeddingVector,
}

pub struct TrainingDriver {
    name: String,
    ports: DriverPorts,
    cursor: PairCursor,
    vocab_size: u64,
    dim: usize,
    emb_spread: f64,
    format: FixedFormat,
    rng: ChaCha20Rng,
    ema: LossEma,
    log: SharedLog,
    max_steps: Option<u64>,
    step: u64,
    phase: Phase,
    example: Example,
    word_buf: Vec<Fixed>,
    context_buf: Vec<Fixed>,
    pending: Option<Pending>,
}

impl TrainingDriver {
    pub fn new(
        name: impl Into<String>,
        ports: DriverPorts,
        corpus: &Corpus,
        config: &TrainConfig,
        log: SharedLog,
    ) -> Result<Self> {
        let name = name.into();
        let format = config
            .fixed_format()
            .map_err(|e| SimError::task(name.as_str(), e))?;
        let ema = LossEma::new(config.ema_init, config.ema_weight, format)
            .map_err(|e| SimError::task(name.as_str(), e))?;
        let cursor = PairCursor::new(corpus.documents().to_vec())
            .ok_or_else(|| SimError::Config("corpus has no word pairs".to_string()))?;

        Ok(Self {
            name,
            ports,
            cursor,
            vocab_size: corpus.vocab_size(),
            dim: config.embedding_dim,
            emb_spread: config.emb_spread,
            format,
            rng: ChaCha20Rng::seed_from_u64(config.seed),
            ema,
            log,
            max_steps: config.max_steps,
            step: 0,
            phase: Phase::Start,
            example: Example::positive(0, 0),
            word_buf: Vec::new(),
            context_buf: Vec::new(),
            pending: None,
        })
    }

    fn address(&self, id: u64, j: usize) -> u64 {
        self.dim as u64 * id + j as u64
    }

    /// Present the label and issue the first read of `example`
    fn begin(&mut self, ctx: &mut TaskContext<'_>, example: Example) -> Result<Wait> {
        self.example = example;
        self.word_buf.clear();
        self.context_buf.clear();
        ctx.set(
            self.ports.label,
            Fixed::from_f64(example.label(), self.format)?,
        )?;
        self.issue_read(ctx, 0)
    }

    fn issue_read(&mut self, ctx: &mut TaskContext<'_>, j: usize) -> Result<Wait> {
        let p = self.ports;
        // Untrained embeddings read back as fresh random values
        let word_default = self.rng.gen_range(0.0..self.emb_spread);
        let context_default = self.rng.gen_range(0.0..self.emb_spread);
        ctx.set(p.wram.default, Fixed::from_f64(word_default, self.format)?)?;
        ctx.set(p.cram.default, Fixed::from_f64(context_default, self.format)?)?;

        ctx.set(p.wram.read_addr, self.address(self.example.word, j))?;
        ctx.set(p.wram.rd, true)?;
        ctx.set(p.cram.read_addr, self.address(self.example.context, j))?;
        ctx.set(p.cram.rd, true)?;

        self.phase = Phase::Reading(j);
        Ok(Wait::join([
            Trigger::falling(p.wram.rd),
            Trigger::falling(p.cram.rd),
        ]))
    }

    fn issue_write(&mut self, ctx: &mut TaskContext<'_>, j: usize) -> Result<Wait> {
        let p = self.ports;
        let (word, context) = match &self.pending {
            Some(pending) => (pending.word.get(j), pending.context.get(j)),
            None => (None, None),
        };
        let (Some(word), Some(context)) = (word, context) else {
            return Err(SimError::task(
                self.name.as_str(),
                format!("no proposed embedding for dimension {}", j),
            ));
        };

        ctx.set(p.wram.write_addr, self.address(self.example.word, j))?;
        ctx.set(p.wram.data_in, word)?;
        ctx.set(p.wram.wr, true)?;
        ctx.set(p.cram.write_addr, self.address(self.example.context, j))?;
        ctx.set(p.cram.data_in, context)?;
        ctx.set(p.cram.wr, true)?;

        self.phase = Phase::Writing(j);
        Ok(Wait::join([
            Trigger::falling(p.wram.wr),
            Trigger::falling(p.cram.wr),
        ]))
    }

    /// Latch dimension `j` and continue with the next read, or present the
    /// assembled embeddings to the datapath
    fn latch(&mut self, ctx: &mut TaskContext<'_>, j: usize) -> Result<Wait> {
        self.word_buf.push(ctx.get(self.ports.wram.data_out)?);
        self.context_buf.push(ctx.get(self.ports.cram.data_out)?);
        if j + 1 < self.dim {
            return self.issue_read(ctx, j + 1);
        }

        let word = EmbeddingVector::from_values(std::mem::take(&mut self.word_buf), self.format)?;
        let context =
            EmbeddingVector::from_values(std::mem::take(&mut self.context_buf), self.format)?;
        ctx.set(self.ports.word, word)?;
        ctx.set(self.ports.context, context)?;

        self.phase = Phase::Settling;
        Ok(Wait::falling(self.ports.clk))
    }

    /// Sample the settled datapath, update the EMA and start the write-back
    fn sample(&mut self, ctx: &mut TaskContext<'_>) -> Result<Wait> {
        let p = self.ports;
        let error = ctx.get(p.update.error)?;
        let score = ctx.get(p.update.score())?;
        let word = ctx.get(p.word)?;
        let context = ctx.get(p.context)?;
        let new_word = ctx.get(p.update.new_word)?;
        let new_context = ctx.get(p.update.new_context)?;

        let ema = self.ema.update(error);
        self.step += 1;

        let record = StepRecord {
            step: self.step,
            time: ctx.now(),
            pass: self.cursor.pass(),
            kind: self.example.kind,
            word_id: self.example.word,
            context_id: self.example.context,
            label: self.example.label(),
            score: score.to_f64(),
            error: error.to_f64(),
            ema: ema.to_f64(),
            word: word.to_f64_vec(),
            context: context.to_f64_vec(),
            new_word: new_word.to_f64_vec(),
            new_context: new_context.to_f64_vec(),
            word_bus: StepRecord::bus(&new_word),
        };
        self.log
            .borrow_mut()
            .record(record)
            .map_err(|e| SimError::task(self.name.as_str(), e))?;

        self.pending = Some(Pending {
            word: new_word,
            context: new_context,
        });
        self.issue_write(ctx, 0)
    }

    fn budget_spent(&self) -> bool {
        self.max_steps.is_some_and(|max| self.step >= max)
    }

    fn halt(&mut self, ctx: &mut TaskContext<'_>) -> Wait {
        tracing::debug!(steps = self.step, time = ctx.now(), "step budget reached");
        self.phase = Phase::Finished;
        ctx.stop();
        Wait::Done
    }

    /// Written back: stop, sample a negative, or wait for the next pair
    fn finish(&mut self, ctx: &mut TaskContext<'_>) -> Result<Wait> {
        self.pending = None;

        if self.budget_spent() {
            return Ok(self.halt(ctx));
        }

        match self.example.kind {
            SampleKind::Positive => {
                let context = self.rng.gen_range(0..self.vocab_size);
                let negative = Example::negative(self.example.word, context);
                self.begin(ctx, negative)
            }
            SampleKind::Negative => {
                self.phase = Phase::AwaitPair;
                Ok(Wait::falling(self.ports.clk))
            }
        }
    }
}

impl Process for TrainingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut TaskContext<'_>, _reason: Resume) -> Result<Wait> {
        match self.phase {
            Phase::Start if self.budget_spent() => Ok(self.halt(ctx)),
            Phase::Start => {
                self.phase = Phase::AwaitPair;
                Ok(Wait::falling(self.ports.clk))
            }
            Phase::AwaitPair if self.budget_spent() => Ok(self.halt(ctx)),
            Phase::AwaitPair => {
                let example = self.cursor.next_pair();
                self.begin(ctx, example)
            }
            Phase::Reading(j) => self.latch(ctx, j),
            Phase::Settling => self.sample(ctx),
            Phase::Writing(j) if j + 1 < self.dim => self.issue_write(ctx, j + 1),
            Phase::Writing(_) => self.finish(ctx),
            Phase::Finished => Ok(Wait::Done),
        }
    }
}
