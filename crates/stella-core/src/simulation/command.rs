use super::{
    DEFAULT_STRUCTURED_SUFFIX, RunOutput, RunnerError, SimulationRunner, is_contained_input_path,
    local_output_path,
};
use crate::domain::SimulationRequest;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

const STDERR_TAIL_LINES: usize = 20;

/// Runs an external executable as `<executable> [args..] <input_file>`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    executable: PathBuf,
    input_dir: PathBuf,
    args: Vec<OsString>,
    structured_suffix: String,
}

impl CommandRunner {
    pub fn new(executable: impl Into<PathBuf>, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            input_dir: input_dir.into(),
            args: Vec::new(),
            structured_suffix: DEFAULT_STRUCTURED_SUFFIX.to_string(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_structured_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.structured_suffix = suffix.into();
        self
    }

    fn stage_input(&self, request: &SimulationRequest) -> Result<(), RunnerError> {
        // An absolute input would make source and destination the same file.
        if !is_contained_input_path(&request.input_file) {
            return Err(RunnerError::InvalidInput {
                input_file: request.input_file.clone(),
            });
        }
        let source = self.input_dir.join(&request.input_file);
        if !source.is_file() {
            return Err(RunnerError::MissingInput { path: source });
        }

        fs::create_dir_all(&request.work_dir).map_err(|source| RunnerError::WorkDirectory {
            path: request.work_dir.clone(),
            source,
        })?;

        let destination = request.work_dir.join(&request.input_file);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| RunnerError::WorkDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(&source, &destination).map_err(|error| RunnerError::CopyInput {
            from: source.clone(),
            to: destination.clone(),
            source: error,
        })?;
        Ok(())
    }
}

impl SimulationRunner for CommandRunner {
    fn run(&self, request: &SimulationRequest) -> Result<RunOutput, RunnerError> {
        self.stage_input(request)?;

        tracing::info!(
            executable = %self.executable.display(),
            input = %request.input_file,
            work_dir = %request.work_dir.display(),
            "launching simulation"
        );
        let output = Command::new(&self.executable)
            .current_dir(&request.work_dir)
            .args(&self.args)
            .arg(&request.input_file)
            .output()
            .map_err(|source| RunnerError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            let status = output.status.code().map_or_else(
                || "terminated by signal".to_string(),
                |code| format!("exit code {code}"),
            );
            return Err(RunnerError::Failed {
                input_file: request.input_file.clone(),
                status,
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        let structured_output =
            local_output_path(&request.work_dir, &request.input_file, &self.structured_suffix);
        if !structured_output.is_file() {
            return Err(RunnerError::MissingOutput {
                input_file: request.input_file.clone(),
                path: structured_output,
            });
        }

        Ok(RunOutput {
            work_dir: request.work_dir.clone(),
            structured_output,
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.trim().is_empty() {
        "<no stderr output>".to_string()
    } else {
        tail
    }
}
