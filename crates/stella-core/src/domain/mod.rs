pub mod errors;

pub use errors::{StellaError, StellaErrorCategory, StellaResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Whether a tolerance mismatch aborts the caller or is reported and skipped.
///
/// Structural problems (unreadable artifacts, missing keys, shape mismatches)
/// are always returned as errors regardless of this mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    Fatal,
    #[default]
    Report,
}

impl FailureMode {
    pub const fn from_error_flag(error: bool) -> Self {
        if error { Self::Fatal } else { Self::Report }
    }

    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl From<bool> for FailureMode {
    fn from(error: bool) -> Self {
        Self::from_error_flag(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSide {
    Local,
    Expected,
}

impl ArtifactSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Expected => "expected",
        }
    }
}

impl Display for ArtifactSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub input_file: String,
    pub work_dir: PathBuf,
}

impl SimulationRequest {
    pub fn new(input_file: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            work_dir: work_dir.into(),
        }
    }
}
