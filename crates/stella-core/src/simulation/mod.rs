//! Running the simulation executable and locating its golden outputs.

mod command;
mod expected;

pub use command::CommandRunner;
pub use expected::{ExpectedOutputError, ExpectedOutputRepository};

use crate::domain::{SimulationRequest, StellaError};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_STRUCTURED_SUFFIX: &str = ".out.json";
pub const FINAL_FIELDS_SUFFIX: &str = ".final_fields";
pub const EXPECTED_OUTPUT_PREFIX: &str = "EXPECTED_OUTPUT.";

/// Input file name without its final extension (`miller_linear.in` -> `miller_linear`).
pub fn input_stem(input_file: &str) -> &str {
    let file_name = Path::new(input_file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(input_file);
    match file_name.rfind('.') {
        Some(index) if index > 0 => &file_name[..index],
        _ => file_name,
    }
}

/// Whether `input_file` names a file below a directory rather than outside it.
///
/// Absolute paths, `.` and `..` components are all rejected.
pub fn is_contained_input_path(input_file: &str) -> bool {
    let path = Path::new(input_file);
    !input_file.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Where a run of `input_file` in `work_dir` writes the artifact with `suffix`.
pub fn local_output_path(work_dir: &Path, input_file: &str, suffix: &str) -> PathBuf {
    work_dir.join(format!("{}{}", input_stem(input_file), suffix))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub work_dir: PathBuf,
    pub structured_output: PathBuf,
}

impl RunOutput {
    pub fn artifact_path(&self, input_file: &str, suffix: &str) -> PathBuf {
        local_output_path(&self.work_dir, input_file, suffix)
    }
}

pub trait SimulationRunner {
    /// Runs one simulation inside `request.work_dir`.
    fn run(&self, request: &SimulationRequest) -> Result<RunOutput, RunnerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("simulation input '{input_file}' must be a relative path inside the input directory")]
    InvalidInput { input_file: String },
    #[error("simulation input '{}' was not found", path.display())]
    MissingInput { path: PathBuf },
    #[error("failed to prepare working directory '{}': {source}", path.display())]
    WorkDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy input '{}' into '{}': {source}", from.display(), to.display())]
    CopyInput {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to launch simulation '{}': {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        source: std::io::Error,
    },
    #[error("simulation for '{input_file}' failed with {status}: {stderr_tail}")]
    Failed {
        input_file: String,
        status: String,
        stderr_tail: String,
    },
    #[error("simulation for '{input_file}' did not produce '{}'", path.display())]
    MissingOutput { input_file: String, path: PathBuf },
}

impl From<RunnerError> for StellaError {
    fn from(error: RunnerError) -> Self {
        let message = error.to_string();
        match error {
            RunnerError::InvalidInput { .. } | RunnerError::MissingInput { .. } => {
                StellaError::input_validation("INPUT.SIMULATION_INPUT", message)
            }
            RunnerError::WorkDirectory { .. } | RunnerError::CopyInput { .. } => {
                StellaError::io_system("IO.SIMULATION_WORKDIR", message)
            }
            RunnerError::Spawn { .. } => StellaError::io_system("IO.SIMULATION_EXEC", message),
            RunnerError::Failed { .. } => StellaError::computation("RUN.SIMULATION", message),
            RunnerError::MissingOutput { .. } => {
                StellaError::computation("RUN.SIMULATION_OUTPUT", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RunnerError, input_stem, is_contained_input_path, local_output_path};
    use crate::domain::{StellaError, StellaErrorCategory};
    use std::path::{Path, PathBuf};

    #[test]
    fn stem_drops_only_the_last_extension() {
        assert_eq!(input_stem("miller_linear.in"), "miller_linear");
        assert_eq!(input_stem("inputs/case.v2.in"), "case.v2");
        assert_eq!(input_stem("no_extension"), "no_extension");
        assert_eq!(input_stem(".hidden"), ".hidden");
    }

    #[test]
    fn input_paths_must_stay_below_their_directory() {
        assert!(is_contained_input_path("miller_linear.in"));
        assert!(is_contained_input_path("geometry/miller_linear.in"));
        for escaping in ["", ".", "./case.in", "../case.in", "inputs/../../case.in", "/tmp/case.in"] {
            assert!(!is_contained_input_path(escaping), "{escaping:?} should be rejected");
        }
    }

    #[test]
    fn local_outputs_live_in_the_work_dir() {
        assert_eq!(
            local_output_path(Path::new("/tmp/run"), "miller_linear.in", ".out.json"),
            PathBuf::from("/tmp/run/miller_linear.out.json")
        );
    }

    #[test]
    fn runner_errors_map_to_categories() {
        let failed = StellaError::from(RunnerError::Failed {
            input_file: "case.in".to_string(),
            status: "exit code 3".to_string(),
            stderr_tail: "diverged".to_string(),
        });
        assert_eq!(failed.category(), StellaErrorCategory::ComputationError);
        assert_eq!(failed.placeholder(), "RUN.SIMULATION");

        let missing = StellaError::from(RunnerError::MissingInput {
            path: PathBuf::from("case.in"),
        });
        assert_eq!(missing.exit_code(), 2);

        let invalid = StellaError::from(RunnerError::InvalidInput {
            input_file: "../case.in".to_string(),
        });
        assert_eq!(invalid.placeholder(), "INPUT.SIMULATION_INPUT");
    }
}
