#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use bhmc_scan::core::domain::Configuration;
use bhmc_scan::engine::operators::TrialMove;
use bhmc_scan::engine::relaxer::{RelaxError, Relaxer, StepLabel};
use nalgebra::{Matrix3, Vector3};
use rand::RngCore;

pub fn cubic_cell(a: f64) -> Matrix3<f64> {
    Matrix3::identity() * a
}

/// Two Li atoms in a 10 Å box, already evaluated at `energy`.
pub fn evaluated_pair(energy: f64) -> Configuration {
    Configuration::new(
        vec![Vector3::new(1.0, 1.0, 1.0), Vector3::new(3.0, 1.0, 1.0)],
        cubic_cell(10.0),
        vec![3, 3],
    )
    .expect("valid configuration")
    .with_energy(energy)
}

/// Returns the current configuration untouched.
pub struct IdentityMove;

impl TrialMove for IdentityMove {
    fn propose(&self, current: &Configuration, _rng: &mut dyn RngCore) -> Configuration {
        current.without_energy()
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

/// Shifts the first atom by +1 Å along x, so each trial records where it came from.
pub struct ShiftMove;

impl TrialMove for ShiftMove {
    fn propose(&self, current: &Configuration, _rng: &mut dyn RngCore) -> Configuration {
        let p = current.positions()[0] + Vector3::new(1.0, 0.0, 0.0);
        current.with_atom_moved(0, p)
    }

    fn name(&self) -> &str {
        "Shift"
    }
}

/// Hands out energies from a table, one per step; geometry is kept as is.
/// Steps beyond the table fail like a crashed optimizer.
pub struct TableRelaxer {
    pub initial: f64,
    pub energies: Vec<f64>,
    pub calls: AtomicUsize,
}

impl TableRelaxer {
    pub fn new(energies: Vec<f64>) -> Self {
        Self {
            initial: 0.0,
            energies,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Relaxer for TableRelaxer {
    fn relax(&self, trial: &Configuration, step: StepLabel) -> Result<Configuration, RelaxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match step {
            StepLabel::Initial => Ok(trial.with_energy(self.initial)),
            StepLabel::Step(n) => self
                .energies
                .get(n)
                .map(|&e| trial.with_energy(e))
                .ok_or_else(|| RelaxError::Process(format!("no energy for step {}", n))),
        }
    }

    fn name(&self) -> &str {
        "Table"
    }
}

/// Reports success but never sets an energy.
pub struct SilentRelaxer;

impl Relaxer for SilentRelaxer {
    fn relax(&self, trial: &Configuration, _step: StepLabel) -> Result<Configuration, RelaxError> {
        Ok(trial.without_energy())
    }

    fn name(&self) -> &str {
        "Silent"
    }
}

/// Simple mock energy: sum of distances from the origin.
/// Favors ions sitting near the origin.
pub struct MockRelaxer;

impl Relaxer for MockRelaxer {
    fn relax(&self, trial: &Configuration, _step: StepLabel) -> Result<Configuration, RelaxError> {
        let energy = trial.positions().iter().map(|p| p.norm()).sum();
        Ok(trial.with_energy(energy))
    }

    fn name(&self) -> &str {
        "Mock"
    }
}
