use nalgebra::Vector3;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::core::domain::Configuration;
use crate::core::spatial;

/// Generates a trial configuration from the current state of the chain.
///
/// The returned configuration must have no energy; it may be identical
/// to `current`.
pub trait TrialMove: Send + Sync {
    fn propose(&self, current: &Configuration, rng: &mut dyn RngCore) -> Configuration;

    /// Returns a short label for logs (e.g., "SiteHop").
    fn name(&self) -> &str;
}

/// Moves one randomly chosen ion onto a vacant site of the mobile sublattice.
#[derive(Clone, Debug)]
pub struct SiteHop {
    sites: Vec<Vector3<f64>>,
    occupancy_tolerance: f64,
}

impl SiteHop {
    /// `sites`: cartesian positions of every site the mobile species may occupy.
    /// `occupancy_tolerance`: a site within this distance (Å) of an ion is occupied.
    pub fn new(sites: Vec<Vector3<f64>>, occupancy_tolerance: f64) -> Self {
        Self {
            sites,
            occupancy_tolerance,
        }
    }

    pub fn sites(&self) -> &[Vector3<f64>] {
        &self.sites
    }

    /// Indices of sites with no ion inside the tolerance sphere (minimum image).
    pub fn vacant_sites(&self, config: &Configuration) -> Vec<usize> {
        let tol_sq = self.occupancy_tolerance * self.occupancy_tolerance;
        let cell = config.cell();

        self.sites
            .iter()
            .enumerate()
            .filter(|(_, site)| {
                !config
                    .positions()
                    .iter()
                    .any(|p| spatial::distance_sq(p, site, cell) < tol_sq)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl TrialMove for SiteHop {
    fn propose(&self, current: &Configuration, rng: &mut dyn RngCore) -> Configuration {
        if current.is_empty() {
            return current.without_energy();
        }

        let vacant = self.vacant_sites(current);
        let Some(&site) = vacant.choose(rng) else {
            // Fully occupied sublattice: nothing to hop into
            return current.without_energy();
        };

        let ion = rng.gen_range(0..current.len());
        current.with_atom_moved(ion, self.sites[site])
    }

    fn name(&self) -> &str {
        "SiteHop"
    }
}

/// Displaces every atom by a uniform random vector in `[-max, max)^3`,
/// then wraps the result back into the cell.
#[derive(Clone, Debug)]
pub struct Rattle {
    max_displacement: f64,
}

impl Rattle {
    pub fn new(max_displacement: f64) -> Self {
        Self { max_displacement }
    }
}

impl TrialMove for Rattle {
    fn propose(&self, current: &Configuration, rng: &mut dyn RngCore) -> Configuration {
        let mag = self.max_displacement;
        if mag <= 0.0 || current.is_empty() {
            return current.without_energy();
        }

        let displaced: Vec<Vector3<f64>> = current
            .positions()
            .iter()
            .map(|p| {
                p + Vector3::new(
                    rng.gen_range(-mag..mag),
                    rng.gen_range(-mag..mag),
                    rng.gen_range(-mag..mag),
                )
            })
            .collect();

        let wrapped = spatial::wrap_into_cell(current.cell(), &displaced);
        // Same atom count as `current`, so the length check cannot fail
        current
            .with_positions(wrapped)
            .unwrap_or_else(|_| current.without_energy())
    }

    fn name(&self) -> &str {
        "Rattle"
    }
}
