use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Constants ---

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV: f64 = 8.617333262145e-5;

// --- Errors ---

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Length mismatch: {positions} positions but {species} species")]
    LengthMismatch { positions: usize, species: usize },

    #[error("Configuration has no energy")]
    MissingEnergy,
}

// --- The Core Entity ---

/// One atomic arrangement plus (optionally) its computed energy.
///
/// Values are never mutated in place: every "update" builds a new
/// `Configuration`. Positions are cartesian (Å); the rows of `cell`
/// are the lattice vectors a, b, c.
///
/// **Invariant**: `positions.len() == species.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigurationRepr", into = "ConfigurationRepr")]
pub struct Configuration {
    positions: Vec<Vector3<f64>>,
    cell: Matrix3<f64>,
    species: Vec<u8>,
    energy: Option<f64>,
}

impl Configuration {
    /// Builds an unrelaxed configuration (energy unset).
    pub fn new(
        positions: Vec<Vector3<f64>>,
        cell: Matrix3<f64>,
        species: Vec<u8>,
    ) -> Result<Self, SnapshotError> {
        if positions.len() != species.len() {
            return Err(SnapshotError::LengthMismatch {
                positions: positions.len(),
                species: species.len(),
            });
        }
        Ok(Self {
            positions,
            cell,
            species,
            energy: None,
        })
    }

    /// Returns a copy carrying `energy`.
    pub fn with_energy(&self, energy: f64) -> Self {
        Self {
            energy: Some(energy),
            ..self.clone()
        }
    }

    /// Returns a copy with the energy cleared, e.g. for a fresh trial.
    pub fn without_energy(&self) -> Self {
        Self {
            energy: None,
            ..self.clone()
        }
    }

    /// Returns a copy with new positions (same cell and species, energy cleared).
    pub fn with_positions(&self, positions: Vec<Vector3<f64>>) -> Result<Self, SnapshotError> {
        Self::new(positions, self.cell, self.species.clone())
    }

    /// Returns a copy with atom `index` placed at `position` (energy cleared).
    /// An out-of-range index leaves the positions untouched.
    pub fn with_atom_moved(&self, index: usize, position: Vector3<f64>) -> Self {
        let mut positions = self.positions.clone();
        if let Some(slot) = positions.get_mut(index) {
            *slot = position;
        }
        Self {
            positions,
            energy: None,
            ..self.clone()
        }
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn cell(&self) -> &Matrix3<f64> {
        &self.cell
    }

    pub fn species(&self) -> &[u8] {
        &self.species
    }

    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// On-disk layout: nested 3-vectors, cell as three rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigurationRepr {
    positions: Vec<[f64; 3]>,
    cell: [[f64; 3]; 3],
    #[serde(alias = "atomic_numbers")]
    species: Vec<u8>,
    #[serde(default)]
    energy: Option<f64>,
}

impl TryFrom<ConfigurationRepr> for Configuration {
    type Error = SnapshotError;

    fn try_from(repr: ConfigurationRepr) -> Result<Self, Self::Error> {
        let positions = repr
            .positions
            .iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();
        let c = repr.cell;
        let cell = Matrix3::from_fn(|r, col| c[r][col]);
        let config = Configuration::new(positions, cell, repr.species)?;
        Ok(Self {
            energy: repr.energy,
            ..config
        })
    }
}

impl From<Configuration> for ConfigurationRepr {
    fn from(config: Configuration) -> Self {
        let m = config.cell;
        Self {
            positions: config.positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
            cell: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            species: config.species,
            energy: config.energy,
        }
    }
}

// --- Scan Results ---

/// The relaxed minimum found for one composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionResult {
    /// Fraction of the mobile sublattice that is occupied.
    pub composition: f64,
    /// Relaxed energy (eV).
    pub energy: f64,
    pub structure: Configuration,
}

impl CompositionResult {
    /// Wraps the best configuration of a run. Fails if it was never evaluated.
    pub fn new(composition: f64, structure: Configuration) -> Result<Self, SnapshotError> {
        let energy = structure.energy().ok_or(SnapshotError::MissingEnergy)?;
        Ok(Self {
            composition,
            energy,
            structure,
        })
    }
}

// --- Configuration Types ---

/// Fixed parameters of one Basin Hopping run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BhParams {
    /// Kelvin. Zero means pure quench (uphill moves are never accepted).
    pub temperature: f64,
    /// Number of iterations; every iteration runs one relaxation.
    pub max_steps: usize,
    /// Seed for the run's random stream. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for BhParams {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            max_steps: 200,
            seed: None,
        }
    }
}
