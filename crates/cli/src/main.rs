//! sgnsim CLI
//!
//! Trains skip-gram embeddings on the simulated fixed-point accelerator.
//!
//! # Usage
//!
//! ```bash
//! # Train the built-in example document for 1000 steps
//! sgnsim train --steps 1000
//!
//! # Train a directory of text files, streaming every step as JSON lines
//! sgnsim train --corpus ./texts --steps 50000 --jsonl steps.jsonl
//!
//! # Feed one random pair back through the update datapath
//! sgnsim converge --iterations 50 --seed 100
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgnsim_trainer::{converge_pair, Corpus, TrainConfig, Trainer, TrainingLog};

#[derive(Parser)]
#[command(name = "sgnsim")]
#[command(version)]
#[command(about = "Fixed-point skip-gram negative-sampling accelerator simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train embeddings on a corpus
    Train {
        /// Text file or directory of text files (repeatable); defaults to the
        /// built-in example document
        #[arg(short, long)]
        corpus: Vec<PathBuf>,

        /// JSON config file; unset fields keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed for default fills and negative sampling
        #[arg(short, long)]
        seed: Option<u64>,

        /// Stop after this many training steps
        #[arg(long)]
        steps: Option<u64>,

        /// Stop when virtual time passes this value
        #[arg(long)]
        until: Option<u64>,

        /// Write every step record to this file as JSON lines
        #[arg(long)]
        jsonl: Option<PathBuf>,
    },

    /// Iterate the update datapath on one random word/context pair
    Converge {
        /// Maximum number of iterations
        #[arg(short, long, default_value = "50")]
        iterations: usize,

        /// Random seed for the initial embeddings
        #[arg(short, long, default_value = "100")]
        seed: u64,

        /// JSON config file; unset fields keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Format duration in human-readable form
fn format_duration(d: Duration) -> String {
    if d.as_micros() < 1000 {
        format!("{}µs", d.as_micros())
    } else if d.as_millis() < 1000 {
        format!("{:.2}ms", d.as_micros() as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_millis() as f64 / 1000.0)
    }
}

const MB: f64 = 1024.0 * 1024.0;

/// Resident memory of this process, 0 where the platform cannot report it
fn resident_bytes() -> usize {
    memory_stats::memory_stats().map_or(0, |stats| stats.physical_mem)
}

/// Wall time and resident memory across one phase
struct Profiler {
    start: Instant,
    memory: usize,
}

impl Profiler {
    fn start() -> Self {
        Self {
            start: Instant::now(),
            memory: resident_bytes(),
        }
    }

    fn finish(&self, phase: &str) -> Duration {
        let elapsed = self.start.elapsed();
        let memory = resident_bytes();
        tracing::info!(
            "{} took {} (memory {:+.1}MB, total {:.3}GB)",
            phase,
            format_duration(elapsed),
            (memory as f64 - self.memory as f64) / MB,
            memory as f64 / MB / 1024.0
        );
        elapsed
    }
}

/// Config file (or defaults), then `SGNSIM_*` variables
fn load_config(path: Option<&PathBuf>) -> Result<TrainConfig> {
    let mut config = match path {
        Some(path) => TrainConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => TrainConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sgnsim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            corpus,
            config,
            seed,
            steps,
            until,
            jsonl,
        } => run_train(corpus, config, seed, steps, until, jsonl),
        Commands::Converge {
            iterations,
            seed,
            config,
        } => run_converge(iterations, seed, config),
    }
}

fn run_train(
    corpus_paths: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    steps: Option<u64>,
    until: Option<u64>,
    jsonl: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if steps.is_some() {
        config.max_steps = steps;
    }
    if config.max_steps.is_none() && until.is_none() {
        tracing::warn!("No --steps or --until given, training runs until interrupted");
    }

    tracing::info!("Starting sgnsim v{}", env!("CARGO_PKG_VERSION"));
    let profiler = Profiler::start();
    let corpus = if corpus_paths.is_empty() {
        Corpus::example()
    } else {
        Corpus::load(&corpus_paths)?.0
    };
    profiler.finish("Corpus loading");
    tracing::info!(
        "Corpus: {} documents, {} tokens, vocabulary {}",
        corpus.documents().len(),
        corpus.token_count(),
        corpus.vocab_size()
    );

    let trainer = Trainer::new(config, corpus)?;
    let mut log = TrainingLog::new();
    if let Some(path) = &jsonl {
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        log = log.with_jsonl(Box::new(BufWriter::new(file)));
    }

    let profiler = Profiler::start();
    let report = match until {
        Some(limit) => trainer.run_until(limit, log)?,
        None => trainer.run_with_log(log)?,
    };
    let elapsed = profiler.finish("Training");

    println!();
    println!("{}", style("Training summary").bold());
    println!("  Steps:        {}", report.steps);
    println!("  Passes:       {}", report.passes);
    println!("  Virtual time: {}", report.time());
    println!("  Loss EMA:     {:.6}", report.final_ema);
    println!("  Words stored: {}", report.word_store.len() / trainer.config().embedding_dim);
    println!("  Deltas:       {}", report.stats.deltas);
    println!("  Wall time:    {}", format_duration(elapsed));
    if let Some(path) = jsonl {
        println!("  Records:      {}", path.display());
    }

    Ok(())
}

fn run_converge(iterations: usize, seed: u64, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path.as_ref())?;
    config.seed = seed;

    let profiler = Profiler::start();
    let report = converge_pair(&config, iterations)?;
    let elapsed = profiler.finish("Convergence bench");

    for (i, (score, error)) in report.scores.iter().zip(report.errors.iter()).enumerate() {
        println!("{:4} score: {:.6}, error: {:.6}", i, score, error);
    }
    let status = if report.converged {
        style("[OK]").green().bold()
    } else {
        style("[WARN]").yellow().bold()
    };
    println!(
        "{} {} after {} iterations ({})",
        status,
        if report.converged { "Converged" } else { "Not converged" },
        report.iterations(),
        format_duration(elapsed)
    );

    Ok(())
}
