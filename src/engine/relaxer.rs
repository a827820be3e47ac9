use std::fmt;

use thiserror::Error;

use crate::core::domain::Configuration;

/// Identifies which relaxation of a run is being performed.
/// Implementations use it to lay out per-step work directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLabel {
    /// Relaxation of the starting structure, before the first iteration.
    Initial,
    Step(usize),
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepLabel::Initial => write!(f, "initial"),
            StepLabel::Step(n) => write!(f, "step_{}", n),
        }
    }
}

/// Failure of a local optimization.
///
/// `Process` means the optimizer could not run at all; `Output` means it ran
/// but produced something unusable. Callers can tell the two apart.
#[derive(Debug, Error)]
pub enum RelaxError {
    #[error("Optimizer process failed: {0}")]
    Process(String),

    #[error("Unusable optimizer output: {0}")]
    Output(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// A local structure optimizer.
/// Implementations must be Thread-Safe (Sync) so independent runs can share one.
pub trait Relaxer: Send + Sync {
    /// Takes an unrelaxed configuration and returns the relaxed one with its energy set.
    /// Blocks until the optimizer finishes.
    fn relax(&self, trial: &Configuration, step: StepLabel) -> Result<Configuration, RelaxError>;

    /// Returns the name of the engine (e.g., "VASP").
    fn name(&self) -> &str;
}
