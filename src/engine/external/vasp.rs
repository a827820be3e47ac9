use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::domain::Configuration;
use crate::engine::external::poscar;
use crate::engine::relaxer::{RelaxError, Relaxer, StepLabel};

/// Input decks copied into every calculation directory (when present).
pub const INPUT_FILES: [&str; 3] = ["INCAR", "KPOINTS", "POTCAR"];

/// Wrapper around a VASP executable.
///
/// Every relaxation gets its own directory under `work_root` (`initial`,
/// `step_0`, `step_1`, ...) holding the input decks, the generated POSCAR and
/// whatever VASP writes. Atoms of the optional host framework are written
/// ahead of the trial atoms and stripped again from the relaxed geometry, so
/// the returned configuration has the same atoms as the trial.
pub struct VaspRelaxer {
    command: Vec<String>,
    input_dir: PathBuf,
    work_root: PathBuf,
    framework: Option<Configuration>,
}

impl VaspRelaxer {
    /// Creates a relaxer.
    ///
    /// # Arguments
    /// * `command` - Launch command, split on whitespace (e.g., "mpprun vasp-gamma").
    /// * `input_dir` - Directory holding INCAR, KPOINTS and POTCAR.
    /// * `work_root` - Directory under which calculation directories are created.
    pub fn new(command: &str, input_dir: &Path, work_root: &Path) -> Result<Self, RelaxError> {
        let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            return Err(RelaxError::Process("empty VASP command".to_string()));
        }
        Ok(Self {
            command,
            input_dir: input_dir.to_path_buf(),
            work_root: work_root.to_path_buf(),
            framework: None,
        })
    }

    /// Fixed host atoms written in front of every trial configuration.
    pub fn with_framework(mut self, framework: Configuration) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Merges framework and trial atoms into the structure VASP sees.
    fn compose(&self, trial: &Configuration) -> Result<Configuration, RelaxError> {
        let Some(fw) = &self.framework else {
            return Ok(trial.without_energy());
        };
        let positions = fw.positions().iter().chain(trial.positions()).copied().collect();
        let species = fw.species().iter().chain(trial.species()).copied().collect();
        Configuration::new(positions, *trial.cell(), species)
            .map_err(|e| RelaxError::Output(e.to_string()))
    }

    /// Removes the framework atoms again. The relaxed cell is kept.
    fn strip_framework(
        &self,
        relaxed: Configuration,
        trial: &Configuration,
    ) -> Result<Configuration, RelaxError> {
        let n_fw = self.framework.as_ref().map_or(0, |fw| fw.len());
        let expected = n_fw + trial.len();
        if relaxed.len() != expected {
            return Err(RelaxError::Output(format!(
                "CONTCAR atom count mismatch: expected {}, got {}",
                expected,
                relaxed.len()
            )));
        }
        if relaxed.species()[n_fw..] != *trial.species() {
            return Err(RelaxError::Output("CONTCAR species order differs from POSCAR".to_string()));
        }

        Configuration::new(
            relaxed.positions()[n_fw..].to_vec(),
            *relaxed.cell(),
            relaxed.species()[n_fw..].to_vec(),
        )
        .map_err(|e| RelaxError::Output(e.to_string()))
    }

    /// Creates the calculation directory and writes all inputs into it.
    fn stage(&self, trial: &Configuration, step: StepLabel) -> Result<PathBuf, RelaxError> {
        let calc_dir = self.work_root.join(step.to_string());
        fs::create_dir_all(&calc_dir)?;

        for file in INPUT_FILES {
            let src = self.input_dir.join(file);
            if src.exists() {
                fs::copy(&src, calc_dir.join(file))?;
            }
        }

        let full = self.compose(trial)?;
        poscar::write_poscar_file(&calc_dir.join("POSCAR"), &full, &format!("bhmc {}", step))
            .map_err(|e| RelaxError::Output(format!("cannot write POSCAR: {}", e)))?;

        Ok(calc_dir)
    }

    fn run_process(&self, calc_dir: &Path) -> Result<(), RelaxError> {
        log::debug!("Launching '{}' in {}", self.command.join(" "), calc_dir.display());

        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .current_dir(calc_dir)
            .output()
            .map_err(|e| {
                RelaxError::Process(format!("failed to spawn '{}': {}", self.command[0], e))
            })?;

        // Keep the console output next to the calculation for post-mortems
        fs::write(calc_dir.join("vasp.out"), &output.stdout)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(RelaxError::Process(format!(
                "VASP exited with {}: {}",
                output.status,
                tail.join("\n")
            )));
        }
        Ok(())
    }
}

fn toten_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"TOTEN\s*=\s*([-+]?\d+(?:\.\d*)?(?:[eE][-+]?\d+)?)")
            .expect("TOTEN pattern is valid")
    })
}

/// Extracts the final total energy (eV) from OUTCAR text: the value on the
/// last line mentioning `TOTEN`.
pub fn parse_outcar_energy(text: &str) -> Result<f64, RelaxError> {
    let re = toten_regex();
    let last = text
        .lines()
        .filter(|line| line.contains("TOTEN"))
        .filter_map(|line| re.captures(line))
        .last()
        .ok_or_else(|| RelaxError::Output("Energy not found in OUTCAR".to_string()))?;

    last[1]
        .parse::<f64>()
        .map_err(|e| RelaxError::Output(format!("Failed to parse energy float: {}", e)))
}

pub fn read_outcar_energy(path: &Path) -> Result<f64, RelaxError> {
    let text = fs::read_to_string(path)
        .map_err(|e| RelaxError::Output(format!("cannot read {}: {}", path.display(), e)))?;
    parse_outcar_energy(&text)
}

impl Relaxer for VaspRelaxer {
    fn name(&self) -> &str {
        "VASP"
    }

    fn relax(&self, trial: &Configuration, step: StepLabel) -> Result<Configuration, RelaxError> {
        let calc_dir = self.stage(trial, step)?;
        self.run_process(&calc_dir)?;

        let relaxed = poscar::read_poscar(&calc_dir.join("CONTCAR"))
            .map_err(|e| RelaxError::Output(format!("cannot read CONTCAR: {}", e)))?;
        let energy = read_outcar_energy(&calc_dir.join("OUTCAR"))?;

        Ok(self.strip_framework(relaxed, trial)?.with_energy(energy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn reads_last_toten() {
        let text = "\
  free  energy   TOTEN  =       -98.000000 eV
  free  energy   TOTEN  =      -100.123456 eV
";
        let e = parse_outcar_energy(text).unwrap();
        assert!((e - (-100.123456)).abs() < 1e-9);
    }

    #[test]
    fn bare_toten_line_is_accepted() {
        let e = parse_outcar_energy("TOTEN  =     -100.123456").unwrap();
        assert!((e - (-100.123456)).abs() < 1e-6);
    }

    #[test]
    fn missing_energy_is_an_output_error() {
        let err = parse_outcar_energy("nothing useful here\n").unwrap_err();
        assert!(matches!(err, RelaxError::Output(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = VaspRelaxer::new("   ", Path::new("."), Path::new(".")).err();
        assert!(matches!(err, Some(RelaxError::Process(_))));
    }

    #[test]
    fn framework_is_prepended_and_stripped() {
        let cell = Matrix3::identity() * 6.0;
        let framework =
            Configuration::new(vec![Vector3::new(3.0, 3.0, 3.0)], cell, vec![8]).unwrap();
        let trial = Configuration::new(vec![Vector3::new(1.0, 0.0, 0.0)], cell, vec![3]).unwrap();
        let relaxer = VaspRelaxer::new("vasp", Path::new("."), Path::new("."))
            .unwrap()
            .with_framework(framework);

        let full = relaxer.compose(&trial).unwrap();
        assert_eq!(full.species(), &[8, 3]);

        let moved = full.with_atom_moved(1, Vector3::new(1.1, 0.0, 0.0));
        let stripped = relaxer.strip_framework(moved, &trial).unwrap();
        assert_eq!(stripped.species(), &[3]);
        assert!((stripped.positions()[0].x - 1.1).abs() < 1e-12);

        let err = relaxer.strip_framework(trial.clone(), &trial).unwrap_err();
        assert!(matches!(err, RelaxError::Output(_)));
    }

    fn framework_and_trial() -> (Configuration, Configuration) {
        let cell = Matrix3::identity() * 6.0;
        let framework =
            Configuration::new(vec![Vector3::new(3.0, 3.0, 3.0)], cell, vec![8]).unwrap();
        let trial = Configuration::new(vec![Vector3::new(1.0, 0.0, 0.0)], cell, vec![3]).unwrap();
        (framework, trial)
    }

    #[test]
    fn missing_executable_is_a_process_error() {
        let work = tempfile::tempdir().unwrap();
        let (_, trial) = framework_and_trial();
        let relaxer =
            VaspRelaxer::new("no-such-vasp-binary-7f3a", work.path(), work.path()).unwrap();

        let err = relaxer.relax(&trial, StepLabel::Step(0)).unwrap_err();

        assert!(matches!(err, RelaxError::Process(_)), "{}", err);
        // Inputs were staged before the launch
        assert!(work.path().join("step_0").join("POSCAR").exists());
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_process_error() {
        let work = tempfile::tempdir().unwrap();
        let (_, trial) = framework_and_trial();
        let relaxer = VaspRelaxer::new("false", work.path(), work.path()).unwrap();

        let err = relaxer.relax(&trial, StepLabel::Step(1)).unwrap_err();

        assert!(matches!(err, RelaxError::Process(_)), "{}", err);
        assert!(work.path().join("step_1").join("vasp.out").exists());
    }

    #[cfg(unix)]
    #[test]
    fn clean_exit_without_contcar_is_an_output_error() {
        let work = tempfile::tempdir().unwrap();
        let (_, trial) = framework_and_trial();
        let relaxer = VaspRelaxer::new("true", work.path(), work.path()).unwrap();

        let err = relaxer.relax(&trial, StepLabel::Initial).unwrap_err();

        assert!(matches!(err, RelaxError::Output(_)), "{}", err);
        assert!(work.path().join("initial").join("vasp.out").exists());
    }

    /// Stands in for VASP: writes a relaxed CONTCAR (framework first) and an OUTCAR.
    const FAKE_VASP: &str = "\
cat > CONTCAR <<END
relaxed
1.0
  6.0 0.0 0.0
  0.0 6.0 0.0
  0.0 0.0 6.0
  O Li
  1 1
Cartesian
  3.0 3.0 3.0
  1.2 0.0 0.0
END
echo '  free  energy   TOTEN  =       -11.000000 eV' > OUTCAR
echo '  free  energy   TOTEN  =       -12.500000 eV' >> OUTCAR
";

    #[cfg(unix)]
    #[test]
    fn relax_reads_back_geometry_and_energy() {
        let inputs = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(inputs.path().join("INCAR"), "IBRION = 2\n").unwrap();
        let script = inputs.path().join("fake_vasp.sh");
        fs::write(&script, FAKE_VASP).unwrap();

        let (framework, trial) = framework_and_trial();
        let command = format!("sh {}", script.display());
        let relaxer = VaspRelaxer::new(&command, inputs.path(), work.path())
            .unwrap()
            .with_framework(framework);

        let relaxed = relaxer.relax(&trial, StepLabel::Step(3)).unwrap();

        assert_eq!(relaxed.species(), &[3]);
        assert!((relaxed.positions()[0] - Vector3::new(1.2, 0.0, 0.0)).norm() < 1e-9);
        assert_eq!(relaxed.energy(), Some(-12.5));

        let calc_dir = work.path().join("step_3");
        assert!(calc_dir.join("INCAR").exists());
        assert!(!calc_dir.join("KPOINTS").exists());
        let poscar = fs::read_to_string(calc_dir.join("POSCAR")).unwrap();
        assert!(poscar.contains("O Li"));
    }
}
