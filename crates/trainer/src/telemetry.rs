//! Per-step training records

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use serde::Serialize;
use sgnsim_fixed_point::EmbeddingVector;

use crate::error::Result;
use crate::sampler::SampleKind;

/// One training step as seen by the driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// 1-based step counter
    pub step: u64,
    /// Virtual time when the datapath outputs were sampled
    pub time: u64,
    pub pass: u64,
    pub kind: SampleKind,
    pub word_id: u64,
    pub context_id: u64,
    pub label: f64,
    pub score: f64,
    /// Instantaneous squared error
    pub error: f64,
    /// Loss EMA after folding in `error`
    pub ema: f64,
    /// Embeddings as read from the banks
    pub word: Vec<f64>,
    pub context: Vec<f64>,
    /// Embeddings written back
    pub new_word: Vec<f64>,
    pub new_context: Vec<f64>,
    /// `new_word` as a packed bus, hex; `None` if the format does not fit
    /// a bus lane
    pub word_bus: Option<String>,
}

impl StepRecord {
    pub fn bus(vector: &EmbeddingVector) -> Option<String> {
        vector.pack().ok().map(|p| p.to_string())
    }
}

/// Sink for step records.
///
/// Every record is logged at `info`. Records can also be kept in memory
/// and streamed as JSON lines.
pub struct TrainingLog {
    count: u64,
    last: Option<StepRecord>,
    retained: Option<Vec<StepRecord>>,
    jsonl: Option<Box<dyn Write>>,
}

/// Log handle shared between the driver and the caller
pub type SharedLog = Rc<RefCell<TrainingLog>>;

impl Default for TrainingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingLog {
    /// Log that only counts and remembers the last record
    pub fn new() -> Self {
        Self {
            count: 0,
            last: None,
            retained: None,
            jsonl: None,
        }
    }

    /// Keep every record in memory
    pub fn retaining(mut self) -> Self {
        self.retained = Some(Vec::new());
        self
    }

    /// Stream every record as one JSON object per line
    pub fn with_jsonl(mut self, writer: Box<dyn Write>) -> Self {
        self.jsonl = Some(writer);
        self
    }

    pub fn shared(self) -> SharedLog {
        Rc::new(RefCell::new(self))
    }

    pub fn record(&mut self, record: StepRecord) -> Result<()> {
        tracing::info!(
            step = record.step,
            time = record.time,
            pass = record.pass,
            kind = %record.kind,
            word_id = record.word_id,
            context_id = record.context_id,
            word = ?record.word,
            context = ?record.context,
            score = record.score,
            error = record.error,
            ema = record.ema,
            "train step"
        );

        if let Some(writer) = self.jsonl.as_mut() {
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
        }
        if let Some(records) = self.retained.as_mut() {
            records.push(record.clone());
        }
        self.count += 1;
        self.last = Some(record);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.jsonl.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.last.as_ref()
    }

    /// Retained records, empty unless built with [`TrainingLog::retaining`]
    pub fn records(&self) -> &[StepRecord] {
        self.retained.as_deref().unwrap_or(&[])
    }

    pub fn take_records(&mut self) -> Vec<StepRecord> {
        self.retained.as_mut().map(std::mem::take).unwrap_or_default()
    }
}
