//! Training configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use sgnsim_blocks::DatapathConfig;
use sgnsim_fixed_point::FixedFormat;

use crate::error::{Result, TrainError};

/// Wiring-time constants of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Embedding dimensionality
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Leaky rectifier slope, 0.0 for plain ReLU
    #[serde(default = "default_leaky_val")]
    pub leaky_val: f64,

    /// Learning rate
    #[serde(default = "default_rate_val")]
    pub rate_val: f64,

    /// Upper bound of the random fill returned for untrained embeddings
    #[serde(default = "default_emb_spread")]
    pub emb_spread: f64,

    /// Smoothing weight of the loss EMA
    #[serde(default = "default_ema_weight")]
    pub ema_weight: f64,

    /// Initial loss EMA
    #[serde(default = "default_ema_init")]
    pub ema_init: f64,

    /// Fixed-point range lower bound (inclusive)
    #[serde(default = "default_fix_min")]
    pub fix_min: f64,

    /// Fixed-point range upper bound (exclusive)
    #[serde(default = "default_fix_max")]
    pub fix_max: f64,

    /// Fixed-point resolution, a power of two
    #[serde(default = "default_fix_res")]
    pub fix_res: f64,

    /// Clock half period in time units
    #[serde(default = "default_half_period")]
    pub half_period: u64,

    /// Memory bank address bus width
    #[serde(default = "default_address_bits")]
    pub address_bits: u32,

    /// Seed for default fills and negative sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stop after this many training steps (runs forever if unset)
    #[serde(default)]
    pub max_steps: Option<u64>,
}

fn default_embedding_dim() -> usize { 3 }
fn default_leaky_val() -> f64 { 0.01 }
fn default_rate_val() -> f64 { 0.1 }
fn default_emb_spread() -> f64 { 0.1 }
fn default_ema_weight() -> f64 { 0.01 }
fn default_ema_init() -> f64 { 1.0 }
fn default_fix_min() -> f64 { -128.0 }
fn default_fix_max() -> f64 { 128.0 }
fn default_fix_res() -> f64 { 1.0 / 256.0 }
fn default_half_period() -> u64 { 5 }
fn default_address_bits() -> u32 { 24 }
fn default_seed() -> u64 { 42 }

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            leaky_val: default_leaky_val(),
            rate_val: default_rate_val(),
            emb_spread: default_emb_spread(),
            ema_weight: default_ema_weight(),
            ema_init: default_ema_init(),
            fix_min: default_fix_min(),
            fix_max: default_fix_max(),
            fix_res: default_fix_res(),
            half_period: default_half_period(),
            address_bits: default_address_bits(),
            seed: default_seed(),
            max_steps: None,
        }
    }
}

impl TrainConfig {
    /// Load config from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `SGNSIM_*` environment variables
    pub fn apply_env(&mut self) {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed("SGNSIM_EMBEDDING_DIM") {
            self.embedding_dim = v;
        }
        if let Some(v) = parsed("SGNSIM_LEAKY_VAL") {
            self.leaky_val = v;
        }
        if let Some(v) = parsed("SGNSIM_RATE_VAL") {
            self.rate_val = v;
        }
        if let Some(v) = parsed("SGNSIM_EMB_SPREAD") {
            self.emb_spread = v;
        }
        if let Some(v) = parsed("SGNSIM_EMA_WEIGHT") {
            self.ema_weight = v;
        }
        if let Some(v) = parsed("SGNSIM_HALF_PERIOD") {
            self.half_period = v;
        }
        if let Some(v) = parsed("SGNSIM_SEED") {
            self.seed = v;
        }
        if let Some(v) = parsed("SGNSIM_MAX_STEPS") {
            self.max_steps = Some(v);
        }
    }

    /// Format shared by every datapath signal
    pub fn fixed_format(&self) -> Result<FixedFormat> {
        Ok(FixedFormat::new(self.fix_min, self.fix_max, self.fix_res)?)
    }

    pub fn datapath(&self) -> Result<DatapathConfig> {
        Ok(DatapathConfig::new(
            self.embedding_dim,
            self.leaky_val,
            self.rate_val,
            self.fixed_format()?,
        )?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(TrainError::Config("embedding_dim must be at least 1".into()));
        }
        if self.half_period == 0 {
            return Err(TrainError::Config("half_period must be at least 1".into()));
        }
        if !(self.emb_spread > 0.0) || !self.emb_spread.is_finite() {
            return Err(TrainError::Config(format!(
                "emb_spread ({}) must be a positive number",
                self.emb_spread
            )));
        }
        if self.address_bits == 0 || self.address_bits > 63 {
            return Err(TrainError::Config(format!(
                "address_bits ({}) must be between 1 and 63",
                self.address_bits
            )));
        }

        let format = self.fixed_format()?;
        for (name, value) in [
            ("leaky_val", self.leaky_val),
            ("rate_val", self.rate_val),
            ("emb_spread", self.emb_spread),
            ("ema_weight", self.ema_weight),
            ("ema_init", self.ema_init),
        ] {
            if !value.is_finite() || value < format.min() || value >= format.max() {
                return Err(TrainError::Config(format!(
                    "{} ({}) lies outside the fixed-point range [{}, {})",
                    name,
                    value,
                    format.min(),
                    format.max()
                )));
            }
        }
        // Labels 0.0 and 1.0 must be representable
        if format.min() > 0.0 || format.max() <= 1.0 {
            return Err(TrainError::Config(format!(
                "fixed-point range [{}, {}) must contain 0 and 1",
                format.min(),
                format.max()
            )));
        }

        self.datapath()?;
        Ok(())
    }

    /// Check that every embedding address of a vocabulary fits the address bus
    pub fn check_vocab(&self, vocab_size: u64) -> Result<()> {
        let needed = (self.embedding_dim as u128) * (vocab_size as u128);
        let capacity = 1u128 << self.address_bits;
        if needed > capacity {
            return Err(TrainError::Config(format!(
                "vocabulary of {} words x {} dimensions needs {} addresses, bus holds {}",
                vocab_size, self.embedding_dim, needed, capacity
            )));
        }
        Ok(())
    }
}
