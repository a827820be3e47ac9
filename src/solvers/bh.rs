use std::sync::Arc;

use crossbeam_channel::Sender;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::domain::{BhParams, Configuration, BOLTZMANN_EV};
use crate::engine::operators::TrialMove;
use crate::engine::relaxer::{Relaxer, StepLabel};
use crate::solvers::error::EngineError;
use crate::solvers::store::{StepRecord, StepSink};
use crate::solvers::{RunEvent, SolverEvent, StepStats};

/// Boltzmann factor for an uphill move of `delta` eV at `temperature` K.
///
/// Downhill and level moves (`delta <= 0`) give 1. At exactly zero
/// temperature every uphill move gives 0 (pure quench).
pub fn acceptance_probability(delta: f64, temperature: f64) -> f64 {
    if delta <= 0.0 {
        return 1.0;
    }
    if temperature <= 0.0 {
        return 0.0;
    }
    (-delta / (BOLTZMANN_EV * temperature)).exp()
}

/// Metropolis criterion. Draws from `rng` only for uphill moves at T > 0.
pub fn metropolis_accept(e_old: f64, e_new: f64, temperature: f64, rng: &mut dyn RngCore) -> bool {
    if e_new <= e_old {
        return true;
    }
    if temperature <= 0.0 {
        return false;
    }
    let prob = acceptance_probability(e_new - e_old, temperature);
    rng.gen::<f64>() < prob
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Lowest-energy configuration seen (the initial one if nothing beat it).
    pub best: Configuration,
    /// Final state of the Markov chain.
    pub current: Configuration,
    pub accepted: usize,
    pub steps: usize,
    /// Every relaxed trial in step order, accepted or not.
    pub history: Vec<Configuration>,
}

impl RunOutcome {
    /// `None` for a run with no steps.
    pub fn acceptance_rate(&self) -> Option<f64> {
        if self.steps == 0 {
            None
        } else {
            Some(self.accepted as f64 / self.steps as f64)
        }
    }
}

/// Mutable bookkeeping of a single `run` call. Never outlives it.
struct RunState {
    current_step: usize,
    accepted_count: usize,
    current: Configuration,
    current_energy: f64,
    best: Configuration,
    best_energy: f64,
    history: Vec<Configuration>,
}

impl RunState {
    fn new(initial: Configuration, energy: f64, capacity: usize) -> Self {
        Self {
            current_step: 0,
            accepted_count: 0,
            current: initial.clone(),
            current_energy: energy,
            best: initial,
            best_energy: energy,
            history: Vec::with_capacity(capacity),
        }
    }

    fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            best: self.best,
            current: self.current,
            accepted: self.accepted_count,
            steps: self.current_step,
            history: self.history,
        }
    }
}

/// Basin Hopping Monte Carlo driver.
///
/// Owns the trial and relaxation strategies and the fixed run parameters.
/// Each call to [`BasinHopping::run`] starts from fresh state, so one
/// instance can be reused, and independent instances can run on different
/// threads.
pub struct BasinHopping {
    trial: Arc<dyn TrialMove>,
    relaxer: Arc<dyn Relaxer>,
    params: BhParams,
    events: Option<(Sender<SolverEvent>, String)>,
}

impl BasinHopping {
    pub fn new(
        trial: Arc<dyn TrialMove>,
        relaxer: Arc<dyn Relaxer>,
        params: BhParams,
    ) -> Result<Self, EngineError> {
        if !params.temperature.is_finite() || params.temperature < 0.0 {
            return Err(EngineError::InvalidParams(format!(
                "temperature must be finite and >= 0, got {}",
                params.temperature
            )));
        }
        Ok(Self {
            trial,
            relaxer,
            params,
            events: None,
        })
    }

    /// Broadcasts run events on `tx`, tagged with `run`.
    pub fn with_events(mut self, tx: Sender<SolverEvent>, run: impl Into<String>) -> Self {
        self.events = Some((tx, run.into()));
        self
    }

    pub fn params(&self) -> &BhParams {
        &self.params
    }

    /// Runs the Basin Hopping loop with a random stream seeded from the
    /// parameters (OS entropy if no seed is set).
    pub fn run(
        &self,
        initial: Configuration,
        sink: &mut dyn StepSink,
    ) -> Result<RunOutcome, EngineError> {
        let mut rng = match self.params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.run_with_rng(initial, sink, &mut rng)
    }

    /// Runs exactly `max_steps` iterations, drawing all randomness (trial
    /// moves and acceptance) from `rng`.
    ///
    /// `initial` must carry an energy. A relaxation failure aborts the run;
    /// steps persisted before it stay on the sink.
    pub fn run_with_rng(
        &self,
        initial: Configuration,
        sink: &mut dyn StepSink,
        rng: &mut dyn RngCore,
    ) -> Result<RunOutcome, EngineError> {
        let initial_energy = initial
            .energy()
            .filter(|e| e.is_finite())
            .ok_or(EngineError::MissingInitialEnergy)?;

        let temperature = self.params.temperature;
        let max_steps = self.params.max_steps;
        let mut state = RunState::new(initial, initial_energy, max_steps);

        self.emit(RunEvent::Started {
            temperature,
            max_steps,
            initial_energy,
        });

        while state.current_step < max_steps {
            let step = state.current_step;

            // A. Perturb
            let trial = self.trial.propose(&state.current, rng);

            // B. Local Minimization
            let relaxed = self
                .relaxer
                .relax(&trial, StepLabel::Step(step))
                .map_err(|source| EngineError::Relaxation { step, source })?;
            let e_new = relaxed
                .energy()
                .filter(|e| e.is_finite())
                .ok_or(EngineError::MissingEnergy { step })?;

            // C. Metropolis Acceptance
            let accepted = metropolis_accept(state.current_energy, e_new, temperature, rng);
            if accepted {
                state.accepted_count += 1;
                // Strict: ties keep the first-seen best
                if e_new < state.best_energy {
                    state.best = relaxed.clone();
                    state.best_energy = e_new;
                    self.emit(RunEvent::NewBest { step, energy: e_new });
                }
                state.current = relaxed.clone();
                state.current_energy = e_new;
            }

            state.history.push(relaxed);

            // D. Persist
            let record = StepRecord {
                step,
                energy: state.current_energy,
                best_energy: state.best_energy,
                structure: state.current.clone(),
                temperature,
                accepted: state.accepted_count,
                trial_energy: Some(e_new),
            };
            sink.record(&record)
                .map_err(|source| EngineError::Persist { step, source })?;
            state.current_step += 1;

            self.emit(RunEvent::StepCompleted(StepStats {
                step,
                current_energy: state.current_energy,
                trial_energy: e_new,
                best_energy: state.best_energy,
                accepted,
                accepted_count: state.accepted_count,
            }));
        }

        self.emit(RunEvent::Finished {
            steps: state.current_step,
            accepted: state.accepted_count,
            best_energy: state.best_energy,
        });

        Ok(state.into_outcome())
    }

    fn emit(&self, event: RunEvent) {
        if let Some((tx, run)) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(SolverEvent {
                run: run.clone(),
                event,
            });
        }
    }
}
