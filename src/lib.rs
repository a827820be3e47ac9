//! Basin Hopping Monte Carlo search over ion arrangements in a host lattice,
//! plus convex-hull stability analysis across a composition scan.

pub mod analysis;
pub mod core;
pub mod engine;
pub mod interface;
pub mod solvers;
pub mod workflow;
