use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bhmc_scan::core::domain::Configuration;
use bhmc_scan::engine::relaxer::{RelaxError, Relaxer};
use bhmc_scan::interface::report;
use bhmc_scan::solvers::error::EngineError;
use bhmc_scan::workflow::scan::{
    prepare_initial_structure, CompositionScan, HostLattice, ScanError, ScanSettings,
};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::{cubic_cell, MockRelaxer, TableRelaxer};

mod common;

/// One O framework atom and four Li sites.
fn host() -> HostLattice {
    let config = Configuration::new(
        vec![
            Vector3::new(2.5, 2.5, 2.5),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.5, 0.0, 0.0),
            Vector3::new(0.0, 2.5, 0.0),
            Vector3::new(0.0, 0.0, 2.5),
        ],
        cubic_cell(5.0),
        vec![8, 3, 3, 3, 3],
    )
    .unwrap();
    HostLattice::split(&config, 3).unwrap()
}

fn settings(jobs: usize) -> ScanSettings {
    ScanSettings {
        temperature: 300.0,
        max_steps: 5,
        seed: Some(11),
        jobs,
        occupancy_tolerance: 0.5,
    }
}

fn mock_relaxer(_dir: &Path) -> Result<Arc<dyn Relaxer>, RelaxError> {
    Ok(Arc::new(MockRelaxer) as Arc<dyn Relaxer>)
}

#[test]
fn test_host_split() {
    let host = host();
    assert_eq!(host.framework.species(), &[8]);
    assert_eq!(host.sites.len(), 4);
    assert_eq!(host.mobile_z, 3);
}

#[test]
fn test_host_without_mobile_sites() {
    let config = Configuration::new(vec![Vector3::zeros()], cubic_cell(5.0), vec![8]).unwrap();
    assert!(matches!(HostLattice::split(&config, 3), Err(ScanError::NoMobileSites(3))));
}

#[test]
fn test_prepare_initial_structure() {
    let host = host();
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    for (x, expected) in [(0.0, 0), (0.25, 1), (0.5, 2), (0.6, 2), (1.0, 4)] {
        let start = prepare_initial_structure(x, &host, &mut rng).unwrap();
        assert_eq!(start.len(), expected, "composition {}", x);
        assert!(start.species().iter().all(|&z| z == 3));
        assert_eq!(start.energy(), None);
        assert_eq!(start.cell(), host.framework.cell());

        // Distinct sites
        for i in 0..start.len() {
            assert!(host.sites.contains(&start.positions()[i]));
            for j in (i + 1)..start.len() {
                assert_ne!(start.positions()[i], start.positions()[j]);
            }
        }
    }
}

#[test]
fn test_composition_out_of_range() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let err = prepare_initial_structure(1.5, &host(), &mut rng).unwrap_err();
    assert!(matches!(err, ScanError::InvalidComposition(_)));
}

#[test]
fn test_scan_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let compositions = [0.0, 0.25, 0.5, 1.0];
    let scan = CompositionScan::new(host(), settings(2), dir.path());

    let outcome = scan.run(&compositions, mock_relaxer).unwrap();

    let xs: Vec<f64> = outcome.all.iter().map(|r| r.composition).collect();
    assert_eq!(xs, compositions.to_vec());
    assert_eq!(outcome.energy_above_hull.len(), 4);
    assert!(!outcome.stable.is_empty());
    // The empty lattice has nothing to relax
    assert_eq!(outcome.all[0].energy, 0.0);

    for &x in &compositions {
        let run_dir = scan.run_dir(x);
        assert!(run_dir.join("run.json").exists());
        for step in 0..5 {
            assert!(run_dir.join(format!("step_{}.json", step)).exists());
        }
    }
    assert!(dir.path().join("composition_0.25").is_dir());

    let results_dir = dir.path().join("results");
    report::write_results(&results_dir, &outcome).unwrap();
    let loaded = report::read_results(&results_dir.join(report::ALL_RESULTS_FILE)).unwrap();
    assert_eq!(loaded, outcome.all);
    let stable = report::read_results(&results_dir.join(report::STABLE_RESULTS_FILE)).unwrap();
    assert_eq!(stable, outcome.stable);

    let summary = std::fs::read_to_string(results_dir.join(report::SUMMARY_FILE)).unwrap();
    assert_eq!(summary.lines().count(), 5);
    assert!(summary.starts_with("composition,energy,energy_above_hull,stable"));
}

#[test]
fn test_seeded_scan_is_reproducible() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let compositions = [0.25, 0.5, 0.75];

    let a = CompositionScan::new(host(), settings(1), dir_a.path())
        .run(&compositions, mock_relaxer)
        .unwrap();
    let b = CompositionScan::new(host(), settings(3), dir_b.path())
        .run(&compositions, mock_relaxer)
        .unwrap();

    assert_eq!(a.all, b.all);
}

#[test]
fn test_failed_run_names_composition_and_step() {
    let dir = tempfile::tempdir().unwrap();
    let scan = CompositionScan::new(host(), settings(1), dir.path());
    let make_relaxer = |_dir: &Path| -> Result<Arc<dyn Relaxer>, RelaxError> {
        Ok(Arc::new(TableRelaxer::new(vec![-1.0, -2.0])) as Arc<dyn Relaxer>)
    };

    let err = scan.run(&[0.5], make_relaxer).unwrap_err();

    match &err {
        ScanError::Run { composition, source } => {
            assert_eq!(*composition, 0.5);
            assert!(matches!(source, EngineError::Relaxation { step: 2, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    let msg = err.to_string();
    assert!(msg.contains("0.50") && msg.contains("step 2"), "{}", msg);
}

#[test]
fn test_reanalyze_matches_scan() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = CompositionScan::new(host(), settings(1), dir.path())
        .run(&[0.0, 0.5, 1.0], mock_relaxer)
        .unwrap();

    let again = report::reanalyze(outcome.all.clone());
    assert_eq!(again.stable, outcome.stable);
    assert_eq!(again.energy_above_hull, outcome.energy_above_hull);
}

#[test]
fn test_colliding_run_dirs_are_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let scan = CompositionScan::new(host(), settings(2), dir.path());
    let builds = AtomicUsize::new(0);
    let make_relaxer = |_dir: &Path| -> Result<Arc<dyn Relaxer>, RelaxError> {
        builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockRelaxer) as Arc<dyn Relaxer>)
    };

    // 0.3 and 0.301 both format as composition_0.30
    let err = scan.run(&[0.3, 0.301], &make_relaxer).unwrap_err();

    match &err {
        ScanError::RunDirCollision { first, second, dir: shared } => {
            assert_eq!(*first, 0.3);
            assert_eq!(*second, 0.301);
            assert_eq!(*shared, scan.run_dir(0.3));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert!(!scan.run_dir(0.3).exists());
}

#[test]
fn test_repeated_composition_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let scan = CompositionScan::new(host(), settings(1), dir.path());

    let err = scan.run(&[0.5, 0.25, 0.5], mock_relaxer).unwrap_err();

    assert!(matches!(err, ScanError::RunDirCollision { .. }));
    assert!(err.to_string().contains("composition_0.50"), "{}", err);
}
