use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::chemistry;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown element symbol '{0}'")]
    UnknownElement(String),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Scan setup read from a TOML file.
///
/// ```toml
/// structure_file = "POSCAR"
/// mobile_element = "Li"
/// vasp_command = "mpprun vasp-gamma"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Host lattice with the mobile sublattice fully occupied.
    pub structure_file: PathBuf,
    /// Symbol of the inserted species (e.g., "Li", "Na").
    pub mobile_element: String,
    #[serde(default = "default_vasp_command")]
    pub vasp_command: String,
    /// Where INCAR, KPOINTS and POTCAR live.
    #[serde(default = "default_dir")]
    pub input_dir: PathBuf,
    /// Root for `composition_<x>` run directories and `results/`.
    #[serde(default = "default_dir")]
    pub output_dir: PathBuf,
    /// Distance (Å) within which a site counts as occupied.
    #[serde(default = "default_occupancy_tolerance")]
    pub occupancy_tolerance: f64,
}

fn default_vasp_command() -> String {
    "mpprun vasp-gamma".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_occupancy_tolerance() -> f64 {
    0.5
}

impl ScanConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ScanConfig = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mobile_atomic_number()?;
        if self.vasp_command.split_whitespace().next().is_none() {
            return Err(ConfigError::Invalid {
                field: "vasp_command",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.occupancy_tolerance.is_finite() && self.occupancy_tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "occupancy_tolerance",
                reason: format!("must be positive, got {}", self.occupancy_tolerance),
            });
        }
        Ok(())
    }

    pub fn mobile_atomic_number(&self) -> Result<u8, ConfigError> {
        chemistry::atomic_number(&self.mobile_element)
            .ok_or_else(|| ConfigError::UnknownElement(self.mobile_element.clone()))
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join("results")
    }
}
