//! Training pipeline: wiring and running one simulation

use std::cell::RefCell;
use std::rc::Rc;

use sgnsim_blocks::{wire_update, MemoryBank, MemoryPorts, MemoryStore, SharedStore};
use sgnsim_fixed_point::Fixed;
use sgnsim_kernel::{ClockGenerator, Netlist, RunOutcome, SimStats, Simulation};

use crate::config::TrainConfig;
use crate::corpus::Corpus;
use crate::driver::{DriverPorts, TrainingDriver};
use crate::error::Result;
use crate::telemetry::{SharedLog, StepRecord, TrainingLog};

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub outcome: RunOutcome,
    /// Completed training steps (positive and negative examples)
    pub steps: u64,
    /// Loss EMA after the last step, the initial EMA if no step completed
    pub final_ema: f64,
    /// Pass of the last step
    pub passes: u64,
    pub stats: SimStats,
    pub word_store: MemoryStore,
    pub context_store: MemoryStore,
    /// Retained step records, empty unless the log retains them
    pub records: Vec<StepRecord>,
    embedding_dim: usize,
}

impl TrainingReport {
    /// Virtual time at which the run ended
    pub fn time(&self) -> u64 {
        self.outcome.time()
    }

    /// Stored word embedding of `id`, `None` if any dimension was never written
    pub fn word_embedding(&self, id: u64) -> Option<Vec<f64>> {
        Self::embedding(&self.word_store, id, self.embedding_dim)
    }

    pub fn context_embedding(&self, id: u64) -> Option<Vec<f64>> {
        Self::embedding(&self.context_store, id, self.embedding_dim)
    }

    fn embedding(store: &MemoryStore, id: u64, dim: usize) -> Option<Vec<f64>> {
        (0..dim as u64)
            .map(|j| store.get(dim as u64 * id + j).map(Fixed::to_f64))
            .collect()
    }
}

/// Everything a run needs after wiring
struct Wired {
    sim: Simulation,
    word_store: SharedStore,
    context_store: SharedStore,
}

/// Trains a corpus on the simulated accelerator
pub struct Trainer {
    config: TrainConfig,
    corpus: Corpus,
}

impl Trainer {
    pub fn new(config: TrainConfig, corpus: Corpus) -> Result<Self> {
        config.validate()?;
        config.check_vocab(corpus.vocab_size())?;
        Ok(Self { config, corpus })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Run until the step budget is used up.
    ///
    /// Without `max_steps` the driver loops over the corpus forever; use
    /// [`Trainer::run_until`] to bound the run in virtual time instead.
    pub fn run(&self) -> Result<TrainingReport> {
        self.run_with_log(TrainingLog::new())
    }

    pub fn run_with_log(&self, log: TrainingLog) -> Result<TrainingReport> {
        self.execute(u64::MAX, log)
    }

    /// Run until the step budget is used up or virtual time reaches `limit`
    pub fn run_until(&self, limit: u64, log: TrainingLog) -> Result<TrainingReport> {
        self.execute(limit, log)
    }

    fn execute(&self, limit: u64, log: TrainingLog) -> Result<TrainingReport> {
        let log = log.shared();
        let mut wired = self.wire(Rc::clone(&log))?;

        tracing::info!(
            "Training {} documents ({} pairs per pass, vocabulary {})",
            self.corpus.documents().len(),
            self.corpus.pair_count(),
            self.corpus.vocab_size()
        );
        let outcome = wired.sim.run_until(limit)?;

        let mut log = log.borrow_mut();
        log.flush()?;
        let (steps, final_ema, passes) = match log.last() {
            Some(last) => (last.step, last.ema, last.pass),
            None => (0, self.initial_ema()?, 0),
        };
        tracing::info!(
            "Training ended at time {} after {} steps, loss EMA {:.6}",
            outcome.time(),
            steps,
            final_ema
        );

        let word_store = wired.word_store.borrow().clone();
        let context_store = wired.context_store.borrow().clone();
        Ok(TrainingReport {
            outcome,
            steps,
            final_ema,
            passes,
            stats: wired.sim.stats(),
            word_store,
            context_store,
            records: log.take_records(),
            embedding_dim: self.config.embedding_dim,
        })
    }

    /// Initial EMA as the driver quantizes it
    fn initial_ema(&self) -> Result<f64> {
        Ok(Fixed::from_f64(self.config.ema_init, self.config.fixed_format()?)?.to_f64())
    }

    /// Clock, datapath, both banks and the driver in one netlist
    fn wire(&self, log: SharedLog) -> Result<Wired> {
        let config = &self.config;
        let datapath = config.datapath()?;
        let format = datapath.format;
        let default = Fixed::from_f64(config.emb_spread, format)?;

        let mut net = Netlist::new();
        let clk = net.signal("clk", false);
        let word = net.signal("word", datapath.zero_vector());
        let context = net.signal("context", datapath.zero_vector());
        let label = net.signal("label", Fixed::one(format));
        let update = wire_update(&mut net, "wcu", word, context, label, &datapath)?;
        let wram = MemoryPorts::declare(&mut net, "wram", format, default);
        let cram = MemoryPorts::declare(&mut net, "cram", format, default);

        let word_store: SharedStore = Rc::new(RefCell::new(MemoryStore::new()));
        let context_store: SharedStore = Rc::new(RefCell::new(MemoryStore::new()));

        net.spawn(ClockGenerator::new(clk, config.half_period)?);
        net.spawn(MemoryBank::with_store("wram", wram, clk, Rc::clone(&word_store)));
        net.spawn(MemoryBank::with_store("cram", cram, clk, Rc::clone(&context_store)));

        let ports = DriverPorts {
            clk,
            word,
            context,
            label,
            update,
            wram,
            cram,
        };
        net.spawn(TrainingDriver::new("driver", ports, &self.corpus, config, log)?);

        tracing::debug!("Wired {} signals", net.signal_count());
        Ok(Wired {
            sim: net.build()?,
            word_store,
            context_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use crate::sampler::SampleKind;

    fn budget(steps: u64) -> TrainConfig {
        TrainConfig {
            max_steps: Some(steps),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_step_timing() {
        let trainer = Trainer::new(budget(4), Corpus::example()).unwrap();
        let report = trainer.run_with_log(TrainingLog::new().retaining()).unwrap();

        assert_eq!(report.steps, 4);
        // Reads at 15/25/35, sample on the falling edge at 40, writes at
        // 45/55/65; the negative follows at once and samples at 100; the next
        // pair starts on the falling edge at 130.
        let times: Vec<u64> = report.records.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![40, 100, 160, 220]);
        assert_eq!(report.outcome, RunOutcome::Stopped { time: 245 });
    }

    #[test]
    fn test_positive_then_negative() {
        let trainer = Trainer::new(budget(4), Corpus::example()).unwrap();
        let report = trainer.run_with_log(TrainingLog::new().retaining()).unwrap();
        let r = &report.records;

        assert_eq!(r[0].kind, SampleKind::Positive);
        assert_eq!((r[0].word_id, r[0].context_id), (4935, 3090));
        assert_eq!(r[0].label, 1.0);

        assert_eq!(r[1].kind, SampleKind::Negative);
        assert_eq!(r[1].word_id, 4935);
        assert_eq!(r[1].label, 0.0);

        assert_eq!((r[2].word_id, r[2].context_id), (3090, 12));
        assert!(r.iter().all(|rec| rec.pass == 1));
    }

    #[test]
    fn test_first_read_returns_defaults() {
        let trainer = Trainer::new(budget(1), Corpus::example()).unwrap();
        let report = trainer.run_with_log(TrainingLog::new().retaining()).unwrap();
        let first = &report.records[0];

        // Nothing was written before, so both vectors are random fills in
        // [0, emb_spread) rounded to the nearest step
        for v in first.word.iter().chain(first.context.iter()) {
            assert!(*v >= 0.0 && *v <= 26.0 / 256.0);
        }
        // and the proposed values were stored
        assert_eq!(report.word_embedding(4935), Some(first.new_word.clone()));
        assert_eq!(report.context_embedding(3090), Some(first.new_context.clone()));
        assert_eq!(report.word_store.len(), 3);
    }

    #[test]
    fn test_zero_budget_trains_nothing() {
        let trainer = Trainer::new(budget(0), Corpus::example()).unwrap();
        let report = trainer.run_with_log(TrainingLog::new().retaining()).unwrap();

        assert_eq!(report.steps, 0);
        assert!(report.records.is_empty());
        assert_eq!(report.outcome, RunOutcome::Stopped { time: 0 });
        assert!(report.word_store.is_empty());
        assert!(report.context_store.is_empty());
        assert_eq!(report.final_ema, 1.0);
    }

    #[test]
    fn test_time_limit_without_budget() {
        let trainer = Trainer::new(TrainConfig::default(), Corpus::example()).unwrap();
        let report = trainer.run_until(1010, TrainingLog::new()).unwrap();
        assert!(matches!(report.outcome, RunOutcome::TimeLimit { .. }));
        // one step every 60 time units, the first at 40
        assert_eq!(report.steps, 17);
    }

    #[test]
    fn test_vocab_exceeding_address_bus_rejected() {
        let config = TrainConfig {
            address_bits: 16,
            ..TrainConfig::default()
        };
        assert!(matches!(
            Trainer::new(config, Corpus::example()),
            Err(TrainError::Config(_))
        ));
    }

    #[test]
    fn test_empty_run_reports_initial_ema() {
        let trainer = Trainer::new(TrainConfig::default(), Corpus::example()).unwrap();
        let report = trainer.run_until(30, TrainingLog::new()).unwrap();
        assert_eq!(report.steps, 0);
        assert_eq!(report.final_ema, 1.0);
    }
}
