use thiserror::Error;

use crate::engine::relaxer::RelaxError;
use crate::solvers::store::PersistError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid run parameters: {0}")]
    InvalidParams(String),

    #[error("Initial configuration has no energy; relax or evaluate it before starting the run")]
    MissingInitialEnergy,

    #[error("Relaxation failed at step {step}: {source}")]
    Relaxation {
        step: usize,
        #[source]
        source: RelaxError,
    },

    #[error("Relaxation at step {step} returned no usable energy")]
    MissingEnergy { step: usize },

    #[error("Failed to persist step {step}: {source}")]
    Persist {
        step: usize,
        #[source]
        source: PersistError,
    },
}

impl EngineError {
    /// The step that was in progress, if the failure happened inside the loop.
    pub fn step(&self) -> Option<usize> {
        match self {
            EngineError::Relaxation { step, .. }
            | EngineError::MissingEnergy { step }
            | EngineError::Persist { step, .. } => Some(*step),
            EngineError::InvalidParams(_) | EngineError::MissingInitialEnergy => None,
        }
    }
}
