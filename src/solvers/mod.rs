/// Statistics for a single basin-hopping step.
/// Used for telemetry and progress logging.
#[derive(Debug, Clone)]
pub struct StepStats {
    pub step: usize,
    /// Energy of the chain state after this step's decision.
    pub current_energy: f64,
    /// Relaxed energy of this step's trial.
    pub trial_energy: f64,
    pub best_energy: f64,
    pub accepted: bool,
    /// Running number of accepted trials.
    pub accepted_count: usize,
}

/// What happened inside a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        temperature: f64,
        max_steps: usize,
        initial_energy: f64,
    },

    /// A completed basin-hopping step.
    StepCompleted(StepStats),

    /// A trial that beats the best energy of the run so far (Energy Record).
    NewBest { step: usize, energy: f64 },

    /// Solver has finished its run.
    Finished {
        steps: usize,
        accepted: usize,
        best_energy: f64,
    },
}

/// Events emitted by solvers to whoever listens (logger, progress display).
/// `run` names the run, so several concurrent runs can share a channel.
#[derive(Debug, Clone)]
pub struct SolverEvent {
    pub run: String,
    pub event: RunEvent,
}

pub mod bh;
pub mod error;
pub mod store;
