//! Trainer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Simulation error: {0}")]
    Sim(#[from] sgnsim_kernel::SimError),

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] sgnsim_fixed_point::FixedPointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid corpus: {0}")]
    Corpus(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;
