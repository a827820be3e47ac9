use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::analysis::hull;
use crate::core::domain::CompositionResult;
use crate::solvers::store::PersistError;
use crate::workflow::scan::ScanOutcome;

pub const ALL_RESULTS_FILE: &str = "all_configurations.json";
pub const STABLE_RESULTS_FILE: &str = "stable_configurations.json";
pub const SUMMARY_FILE: &str = "summary.csv";

#[derive(Debug, Serialize)]
struct SummaryRow {
    composition: f64,
    energy: f64,
    energy_above_hull: f64,
    stable: bool,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Writes the all/stable artifacts and a CSV summary into `results_dir`.
pub fn write_results(results_dir: &Path, outcome: &ScanOutcome) -> Result<(), PersistError> {
    fs::create_dir_all(results_dir)?;

    write_json(&results_dir.join(ALL_RESULTS_FILE), &outcome.all)?;
    write_json(&results_dir.join(STABLE_RESULTS_FILE), &outcome.stable)?;

    let stable = hull::stable_indices(&outcome.all);
    let mut wtr = csv::Writer::from_path(results_dir.join(SUMMARY_FILE))?;
    for (i, r) in outcome.all.iter().enumerate() {
        wtr.serialize(SummaryRow {
            composition: r.composition,
            energy: r.energy,
            energy_above_hull: outcome.energy_above_hull.get(i).copied().unwrap_or(0.0),
            stable: stable.contains(&i),
        })?;
    }
    wtr.flush()?;

    Ok(())
}

/// Loads a previously written `all_configurations.json`.
pub fn read_results(path: &Path) -> Result<Vec<CompositionResult>, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Re-runs the hull analysis over stored results.
pub fn reanalyze(results: Vec<CompositionResult>) -> ScanOutcome {
    let stable = hull::analyze_stability(&results);
    let energy_above_hull = hull::energy_above_hull(&results);
    ScanOutcome {
        all: results,
        stable,
        energy_above_hull,
    }
}
