use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::domain::Configuration;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
}

/// One persisted basin-hopping step.
///
/// `energy` and `structure` describe the chain state after the step's
/// accept/reject decision; `accepted` is the running accepted count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub energy: f64,
    pub best_energy: f64,
    pub structure: Configuration,
    pub temperature: f64,
    pub accepted: usize,
    /// Relaxed energy of this step's trial, accepted or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_energy: Option<f64>,
}

/// Destination for step records. One call per completed iteration.
pub trait StepSink {
    fn record(&mut self, record: &StepRecord) -> Result<(), PersistError>;
}

/// Writes `step_<n>.json` files into one run directory.
#[derive(Debug, Clone)]
pub struct JsonStepWriter {
    dir: PathBuf,
}

impl JsonStepWriter {
    /// Creates the directory if needed.
    pub fn new(dir: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("step_{}.json", step))
    }

    pub fn load(&self, step: usize) -> Result<StepRecord, PersistError> {
        let file = File::open(self.path_for(step))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl StepSink for JsonStepWriter {
    fn record(&mut self, record: &StepRecord) -> Result<(), PersistError> {
        let file = File::create(self.path_for(record.step))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same buffer, so a test (or a
/// progress view) can hold one handle while the engine writes through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<StepRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StepRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl StepSink for MemoryStore {
    fn record(&mut self, record: &StepRecord) -> Result<(), PersistError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StepSink for NullSink {
    fn record(&mut self, _record: &StepRecord) -> Result<(), PersistError> {
        Ok(())
    }
}

// --- Run Metadata ---

/// Describes one run; written as `run.json` next to its step records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub composition: f64,
    pub temperature: f64,
    pub max_steps: usize,
    pub seed: Option<u64>,
    pub trial_move: String,
    pub relaxer: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub accepted: Option<usize>,
    pub best_energy: Option<f64>,
}

impl RunManifest {
    pub fn begin(composition: f64, temperature: f64, max_steps: usize, seed: Option<u64>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            composition,
            temperature,
            max_steps,
            seed,
            trial_move: String::new(),
            relaxer: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            accepted: None,
            best_energy: None,
        }
    }

    pub fn finish(&mut self, accepted: usize, best_energy: f64) {
        self.finished_at = Some(Utc::now());
        self.accepted = Some(accepted);
        self.best_energy = Some(best_energy);
    }

    pub fn save(&self, dir: &Path) -> Result<(), PersistError> {
        let file = File::create(dir.join("run.json"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
