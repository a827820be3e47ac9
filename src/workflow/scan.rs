use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Sender;
use nalgebra::Vector3;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::analysis::hull;
use crate::core::domain::{BhParams, CompositionResult, Configuration, SnapshotError};
use crate::engine::operators::{SiteHop, TrialMove};
use crate::engine::relaxer::{RelaxError, Relaxer, StepLabel};
use crate::solvers::bh::BasinHopping;
use crate::solvers::error::EngineError;
use crate::solvers::store::{JsonStepWriter, PersistError, RunManifest};
use crate::solvers::SolverEvent;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Composition {0} is outside [0, 1]")]
    InvalidComposition(f64),

    #[error("Host structure has no sites for atomic number {0}")]
    NoMobileSites(u8),

    #[error("Compositions {first} and {second} would share run directory {}", .dir.display())]
    RunDirCollision {
        first: f64,
        second: f64,
        dir: PathBuf,
    },

    #[error("Composition {composition:.2}: cannot set up relaxer: {source}")]
    RelaxerSetup {
        composition: f64,
        #[source]
        source: RelaxError,
    },

    #[error("Composition {composition:.2}: initial relaxation failed: {source}")]
    InitialRelaxation {
        composition: f64,
        #[source]
        source: RelaxError,
    },

    #[error("Composition {composition:.2}: {source}")]
    Run {
        composition: f64,
        #[source]
        source: EngineError,
    },

    #[error("Composition {composition:.2}: {source}")]
    Persist {
        composition: f64,
        #[source]
        source: PersistError,
    },

    #[error("Invalid configuration: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// The host lattice split into fixed framework atoms and the sites of the
/// mobile sublattice.
#[derive(Debug, Clone)]
pub struct HostLattice {
    pub framework: Configuration,
    pub sites: Vec<Vector3<f64>>,
    pub mobile_z: u8,
}

impl HostLattice {
    /// Every atom of species `mobile_z` in `host` becomes a site; the rest
    /// is framework.
    pub fn split(host: &Configuration, mobile_z: u8) -> Result<Self, ScanError> {
        let mut fw_positions = Vec::new();
        let mut fw_species = Vec::new();
        let mut sites = Vec::new();

        for (p, &z) in host.positions().iter().zip(host.species()) {
            if z == mobile_z {
                sites.push(*p);
            } else {
                fw_positions.push(*p);
                fw_species.push(z);
            }
        }

        if sites.is_empty() {
            return Err(ScanError::NoMobileSites(mobile_z));
        }

        Ok(Self {
            framework: Configuration::new(fw_positions, *host.cell(), fw_species)?,
            sites,
            mobile_z,
        })
    }
}

/// Builds the starting configuration for one composition: `floor(x · n_sites)`
/// ions placed on distinct sites chosen uniformly at random.
pub fn prepare_initial_structure(
    composition: f64,
    host: &HostLattice,
    rng: &mut dyn RngCore,
) -> Result<Configuration, ScanError> {
    if !(0.0..=1.0).contains(&composition) {
        return Err(ScanError::InvalidComposition(composition));
    }

    let n_sites = host.sites.len();
    let n_mobile = ((composition * n_sites as f64).floor() as usize).min(n_sites);

    let mut chosen: Vec<usize> = rand::seq::index::sample(rng, n_sites, n_mobile).into_vec();
    chosen.sort_unstable();

    let positions = chosen.iter().map(|&i| host.sites[i]).collect();
    Ok(Configuration::new(
        positions,
        *host.framework.cell(),
        vec![host.mobile_z; n_mobile],
    )?)
}

/// Run-level knobs shared by every composition of a scan.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub temperature: f64,
    pub max_steps: usize,
    /// Base seed; composition `i` uses `seed + i`.
    pub seed: Option<u64>,
    /// Compositions relaxed concurrently.
    pub jobs: usize,
    pub occupancy_tolerance: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            max_steps: 200,
            seed: None,
            jobs: 1,
            occupancy_tolerance: 0.5,
        }
    }
}

/// Everything a finished scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// One result per composition, in input order.
    pub all: Vec<CompositionResult>,
    pub stable: Vec<CompositionResult>,
    /// Parallel to `all`.
    pub energy_above_hull: Vec<f64>,
}

/// Runs one basin-hopping search per composition, then the hull analysis.
pub struct CompositionScan {
    host: HostLattice,
    settings: ScanSettings,
    output_dir: PathBuf,
    events: Option<Sender<SolverEvent>>,
}

impl CompositionScan {
    pub fn new(host: HostLattice, settings: ScanSettings, output_dir: &Path) -> Self {
        Self {
            host,
            settings,
            output_dir: output_dir.to_path_buf(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Sender<SolverEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn run_dir(&self, composition: f64) -> PathBuf {
        self.output_dir.join(format!("composition_{:.2}", composition))
    }

    /// Fails if two compositions map to the same run directory.
    fn check_run_dirs(&self, compositions: &[f64]) -> Result<(), ScanError> {
        let mut seen: HashMap<PathBuf, f64> = HashMap::with_capacity(compositions.len());
        for &x in compositions {
            let dir = self.run_dir(x);
            if let Some(&first) = seen.get(&dir) {
                return Err(ScanError::RunDirCollision {
                    first,
                    second: x,
                    dir,
                });
            }
            seen.insert(dir, x);
        }
        Ok(())
    }

    /// Runs every composition and analyzes the results. Stops at the first
    /// failing composition; nothing runs if two compositions would share a
    /// run directory.
    ///
    /// `make_relaxer` receives the run directory of a composition and builds
    /// the relaxer whose work lands there.
    pub fn run<F>(&self, compositions: &[f64], make_relaxer: F) -> Result<ScanOutcome, ScanError>
    where
        F: Fn(&Path) -> Result<Arc<dyn Relaxer>, RelaxError> + Sync,
    {
        self.check_run_dirs(compositions)?;

        let all = if self.settings.jobs <= 1 {
            compositions
                .iter()
                .enumerate()
                .map(|(i, &x)| self.run_composition(i, x, &make_relaxer))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.jobs)
                .thread_name(|i| format!("bhmc-worker-{}", i))
                .build()
                .map_err(|e| ScanError::ThreadPool(e.to_string()))?;
            pool.install(|| {
                compositions
                    .par_iter()
                    .enumerate()
                    .map(|(i, &x)| self.run_composition(i, x, &make_relaxer))
                    .collect::<Result<Vec<_>, _>>()
            })?
        };

        let stable = hull::analyze_stability(&all);
        let energy_above_hull = hull::energy_above_hull(&all);

        Ok(ScanOutcome {
            all,
            stable,
            energy_above_hull,
        })
    }

    /// One complete search: initial structure, initial relaxation, BHMC loop.
    pub fn run_composition<F>(
        &self,
        index: usize,
        composition: f64,
        make_relaxer: &F,
    ) -> Result<CompositionResult, ScanError>
    where
        F: Fn(&Path) -> Result<Arc<dyn Relaxer>, RelaxError>,
    {
        let dir = self.run_dir(composition);
        fs::create_dir_all(&dir)?;

        let mut rng = match self.settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => ChaCha8Rng::from_entropy(),
        };

        let relaxer = make_relaxer(&dir)
            .map_err(|source| ScanError::RelaxerSetup { composition, source })?;

        // 1. Initial Relaxation
        let start = prepare_initial_structure(composition, &self.host, &mut rng)?;
        let start = relaxer
            .relax(&start, StepLabel::Initial)
            .map_err(|source| ScanError::InitialRelaxation { composition, source })?;

        // 2. Basin Hopping
        let trial: Arc<dyn TrialMove> = Arc::new(SiteHop::new(
            self.host.sites.clone(),
            self.settings.occupancy_tolerance,
        ));
        let params = BhParams {
            temperature: self.settings.temperature,
            max_steps: self.settings.max_steps,
            seed: Some(rng.gen()),
        };

        let mut manifest = RunManifest::begin(
            composition,
            params.temperature,
            params.max_steps,
            params.seed,
        );
        manifest.trial_move = trial.name().to_string();
        manifest.relaxer = relaxer.name().to_string();
        manifest
            .save(&dir)
            .map_err(|source| ScanError::Persist { composition, source })?;

        let mut solver = BasinHopping::new(trial, relaxer, params)
            .map_err(|source| ScanError::Run { composition, source })?;
        if let Some(tx) = &self.events {
            solver = solver.with_events(tx.clone(), format!("x={:.2}", composition));
        }

        let mut sink = JsonStepWriter::new(&dir)
            .map_err(|source| ScanError::Persist { composition, source })?;
        let outcome = solver
            .run(start, &mut sink)
            .map_err(|source| ScanError::Run { composition, source })?;

        let result = CompositionResult::new(composition, outcome.best)?;

        manifest.finish(outcome.accepted, result.energy);
        manifest
            .save(&dir)
            .map_err(|source| ScanError::Persist { composition, source })?;

        Ok(result)
    }
}
