use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing_subscriber::filter::LevelFilter;

use bhmc_scan::engine::external::poscar;
use bhmc_scan::engine::external::vasp::{VaspRelaxer, INPUT_FILES};
use bhmc_scan::engine::relaxer::{RelaxError, Relaxer};
use bhmc_scan::interface::{logging, report};
use bhmc_scan::workflow::config::ScanConfig;
use bhmc_scan::workflow::scan::{CompositionScan, HostLattice, ScanOutcome, ScanSettings};

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "BHMC composition scanning", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Compositions to test (fraction of mobile sites occupied)
    #[arg(long, num_args = 1.., required_unless_present = "analyze")]
    compositions: Vec<f64>,

    /// Temperature (K)
    #[arg(long, default_value_t = 300.0)]
    temp: f64,

    /// Number of Monte Carlo steps per composition
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Compositions run concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Base random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Re-run the stability analysis on an existing all_configurations.json and exit
    #[arg(long, value_name = "FILE")]
    analyze: Option<PathBuf>,

    /// Log every step
    #[arg(short, long)]
    verbose: bool,
}

// --- Initialization Helpers ---

fn setup_logging(verbose: bool) {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn check_inputs(config: &ScanConfig) -> Result<()> {
    if !config.structure_file.exists() {
        bail!(
            "Structure file {} not found.\n\
             The scan needs the host lattice with the mobile sublattice fully occupied.",
            config.structure_file.display()
        );
    }
    for file in INPUT_FILES {
        if !config.input_dir.join(file).exists() {
            log::warn!(
                "{} not found in {}; VASP will run without it",
                file,
                config.input_dir.display()
            );
        }
    }
    Ok(())
}

fn print_stable(outcome: &ScanOutcome) {
    println!("Stable compositions:");
    for r in &outcome.stable {
        println!("  x = {:.2}  E = {:.6} eV", r.composition, r.energy);
    }
}

fn analyze_only(path: &Path) -> Result<()> {
    let results = report::read_results(path)
        .with_context(|| format!("Failed to load results from {}", path.display()))?;
    let outcome = report::reanalyze(results);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    report::write_results(dir, &outcome).context("Failed to write results")?;
    print_stable(&outcome);
    Ok(())
}

// --- Main ---

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Some(path) = &args.analyze {
        return analyze_only(path);
    }

    // 1. Configuration & Pre-flight Checks
    let config = ScanConfig::load(&args.config)?;
    check_inputs(&config)?;
    let mobile_z = config.mobile_atomic_number()?;

    let structure = poscar::read_poscar(&config.structure_file)
        .with_context(|| format!("Failed to read {}", config.structure_file.display()))?;
    let host = HostLattice::split(&structure, mobile_z)?;
    log::info!(
        "Host lattice: {} framework atoms, {} {} sites",
        host.framework.len(),
        host.sites.len(),
        config.mobile_element
    );

    // 2. Event Listener
    let (tx, rx) = unbounded();
    let listener = logging::spawn_event_logger(rx).context("Failed to spawn event logger")?;

    // 3. Scan
    let settings = ScanSettings {
        temperature: args.temp,
        max_steps: args.steps,
        seed: args.seed,
        jobs: args.jobs,
        occupancy_tolerance: config.occupancy_tolerance,
    };
    let scan = CompositionScan::new(host.clone(), settings, &config.output_dir).with_events(tx);

    let framework = host.framework;
    let make_relaxer = |dir: &Path| -> Result<Arc<dyn Relaxer>, RelaxError> {
        let relaxer = VaspRelaxer::new(&config.vasp_command, &config.input_dir, dir)?
            .with_framework(framework.clone());
        Ok(Arc::new(relaxer) as Arc<dyn Relaxer>)
    };

    for x in &args.compositions {
        log::info!("Queued composition x = {}", x);
    }
    let outcome = scan.run(&args.compositions, make_relaxer);

    // Closing the channel lets the listener drain and exit
    drop(scan);
    let _ = listener.join();
    let outcome = outcome?;

    // 4. Results
    let results_dir = config.results_dir();
    report::write_results(&results_dir, &outcome).context("Failed to write results")?;
    log::info!("Analysis complete. Check {} directory.", results_dir.display());
    print_stable(&outcome);

    Ok(())
}
