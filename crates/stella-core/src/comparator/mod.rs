//! Golden-output comparison of named quantities and plain-text dumps.
//!
//! Structural problems (unreadable artifacts, missing keys, shape mismatches)
//! are always returned as errors. Numeric drift is returned as an error only in
//! [`FailureMode::Fatal`]; in [`FailureMode::Report`] a diagnostic line is
//! printed to stdout and the failed result is returned.

mod policy;
mod result;

pub use policy::{COMPARISON_POLICY_PATH, ComparisonPolicy, ComparisonRule, ResolvedRule, RuleKind};
pub use result::{
    ArtifactKind, ComparisonMetrics, ComparisonResult, MAX_REPORTED_MISMATCHES, ValueMismatch,
};

use crate::artifact::{
    ArtifactError, ArtifactReader, ComparisonArtifact, JsonDatasetReader, Quantity, TextArtifact,
};
use crate::domain::{ArtifactSide, FailureMode, StellaError};
use crate::numerics::parse_numeric_token;
use result::MetricsAccumulator;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ComparatorError {
    #[error("failed to read comparison policy '{}': {source}", path.display())]
    ReadPolicy {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse comparison policy '{}': {source}", path.display())]
    ParsePolicy {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid comparison policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid key glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("quantity '{key}' is missing from the {side} artifact '{}'", path.display())]
    KeyMissing {
        key: String,
        side: ArtifactSide,
        path: PathBuf,
    },
    #[error("shape mismatch for '{name}': {detail}")]
    ShapeMismatch { name: String, detail: String },
    #[error("{}", result.diagnostic_line())]
    ToleranceExceeded { result: Box<ComparisonResult> },
}

impl ComparatorError {
    /// True for failures that make any comparison meaningless.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ToleranceExceeded { .. })
    }
}

impl From<ComparatorError> for StellaError {
    fn from(error: ComparatorError) -> Self {
        let message = error.to_string();
        match error {
            ComparatorError::ReadPolicy { .. } => {
                StellaError::io_system("IO.COMPARATOR_POLICY", message)
            }
            ComparatorError::ParsePolicy { .. }
            | ComparatorError::InvalidPolicy(_)
            | ComparatorError::InvalidGlob { .. } => {
                StellaError::input_validation("INPUT.COMPARATOR_POLICY", message)
            }
            ComparatorError::Artifact(ArtifactError::Read { .. }) => {
                StellaError::io_system("IO.COMPARATOR_ARTIFACT", message)
            }
            ComparatorError::Artifact(_) => {
                StellaError::input_validation("INPUT.COMPARATOR_ARTIFACT", message)
            }
            ComparatorError::KeyMissing { .. } => {
                StellaError::computation("RUN.COMPARATOR_KEY_MISSING", message)
            }
            ComparatorError::ShapeMismatch { .. } => {
                StellaError::computation("RUN.COMPARATOR_SHAPE", message)
            }
            ComparatorError::ToleranceExceeded { .. } => {
                StellaError::computation("RUN.COMPARATOR_TOLERANCE", message)
            }
        }
    }
}

pub struct Comparator {
    policy: ComparisonPolicy,
    reader: Box<dyn ArtifactReader>,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(ComparisonPolicy::default())
    }
}

impl Comparator {
    pub fn new(policy: ComparisonPolicy) -> Self {
        Self::with_reader(policy, JsonDatasetReader)
    }

    pub fn with_reader(policy: ComparisonPolicy, reader: impl ArtifactReader + 'static) -> Self {
        Self {
            policy,
            reader: Box::new(reader),
        }
    }

    pub fn from_policy_path(policy_path: impl AsRef<Path>) -> Result<Self, ComparatorError> {
        ComparisonPolicy::from_policy_path(policy_path).map(Self::new)
    }

    pub fn policy(&self) -> &ComparisonPolicy {
        &self.policy
    }

    pub fn compare(
        &self,
        local_path: impl AsRef<Path>,
        expected_path: impl AsRef<Path>,
        key: &str,
        mode: FailureMode,
    ) -> Result<ComparisonResult, ComparatorError> {
        let local = ComparisonArtifact::new(local_path.as_ref(), self.reader.as_ref());
        let expected = ComparisonArtifact::new(expected_path.as_ref(), self.reader.as_ref());
        self.compare_loaded(&local, &expected, key, mode)
    }

    /// Compares several keys against one pair of artifacts, reading each file once.
    ///
    /// Stops at the first error; non-fatal mismatches are collected.
    pub fn compare_many<K: AsRef<str>>(
        &self,
        local_path: impl AsRef<Path>,
        expected_path: impl AsRef<Path>,
        keys: &[K],
        mode: FailureMode,
    ) -> Result<Vec<ComparisonResult>, ComparatorError> {
        let local = ComparisonArtifact::new(local_path.as_ref(), self.reader.as_ref());
        let expected = ComparisonArtifact::new(expected_path.as_ref(), self.reader.as_ref());
        keys.iter()
            .map(|key| self.compare_loaded(&local, &expected, key.as_ref(), mode))
            .collect()
    }

    pub fn compare_text(
        &self,
        local_path: impl AsRef<Path>,
        expected_path: impl AsRef<Path>,
        name: &str,
        mode: FailureMode,
    ) -> Result<ComparisonResult, ComparatorError> {
        let options = self.policy.text_parsing();
        let expected = TextArtifact::load(expected_path.as_ref(), options)?;
        let local = TextArtifact::load(local_path.as_ref(), options)?;

        let expected_lines = expected.lines();
        let local_lines = local.lines();
        if expected_lines.len() != local_lines.len() {
            return Err(ComparatorError::ShapeMismatch {
                name: name.to_string(),
                detail: format!(
                    "line count differs (local={}, expected={})",
                    local_lines.len(),
                    expected_lines.len()
                ),
            });
        }

        let resolved = self.policy.resolve_rule(name);
        let mut accumulator = MetricsAccumulator::new(resolved.rule, vec![expected_lines.len()]);
        for (expected_line, local_line) in expected_lines.iter().zip(local_lines) {
            if expected_line.tokens.len() != local_line.tokens.len() {
                return Err(ComparatorError::ShapeMismatch {
                    name: name.to_string(),
                    detail: format!(
                        "token count differs at expected line {} (local={}, expected={})",
                        expected_line.line_number,
                        local_line.tokens.len(),
                        expected_line.tokens.len()
                    ),
                });
            }

            for (token_index, (expected_token, local_token)) in expected_line
                .tokens
                .iter()
                .zip(&local_line.tokens)
                .enumerate()
            {
                let location = || {
                    format!(
                        "line {} token {}",
                        expected_line.line_number,
                        token_index + 1
                    )
                };
                match (
                    parse_numeric_token(expected_token),
                    parse_numeric_token(local_token),
                ) {
                    (Some(expected_value), Some(local_value)) => {
                        accumulator.record_numeric(location, expected_value, local_value)
                    }
                    _ => accumulator.record_text(location, expected_token, local_token),
                }
            }
        }

        let result = accumulator.finish(name, ArtifactKind::Text, resolved.category_id);
        apply_failure_mode(result, mode)
    }

    fn compare_loaded(
        &self,
        local: &ComparisonArtifact<'_>,
        expected: &ComparisonArtifact<'_>,
        key: &str,
        mode: FailureMode,
    ) -> Result<ComparisonResult, ComparatorError> {
        let expected_quantity = require_quantity(expected, key, ArtifactSide::Expected)?;
        let local_quantity = require_quantity(local, key, ArtifactSide::Local)?;

        if expected_quantity.shape() != local_quantity.shape() {
            return Err(ComparatorError::ShapeMismatch {
                name: key.to_string(),
                detail: format!(
                    "local {} {:?} vs expected {} {:?}",
                    local_quantity.shape_class(),
                    local_quantity.shape(),
                    expected_quantity.shape_class(),
                    expected_quantity.shape()
                ),
            });
        }

        let resolved = self.policy.resolve_rule(key);
        tracing::debug!(key, rule = ?resolved.rule, category = ?resolved.category_id, "comparing quantity");

        let mut accumulator =
            MetricsAccumulator::new(resolved.rule, expected_quantity.shape().to_vec());
        for (flat_index, (expected_value, local_value)) in expected_quantity
            .values()
            .iter()
            .zip(local_quantity.values())
            .enumerate()
        {
            accumulator.record_numeric(
                || format!("{:?}", expected_quantity.unravel_index(flat_index)),
                *expected_value,
                *local_value,
            );
        }

        let result = accumulator.finish(key, ArtifactKind::Structured, resolved.category_id);
        apply_failure_mode(result, mode)
    }
}

fn require_quantity(
    artifact: &ComparisonArtifact<'_>,
    key: &str,
    side: ArtifactSide,
) -> Result<Quantity, ComparatorError> {
    artifact
        .quantity(key)?
        .ok_or_else(|| ComparatorError::KeyMissing {
            key: key.to_string(),
            side,
            path: artifact.path().to_path_buf(),
        })
}

fn apply_failure_mode(
    result: ComparisonResult,
    mode: FailureMode,
) -> Result<ComparisonResult, ComparatorError> {
    if result.passed {
        tracing::debug!(name = %result.name, "comparison passed");
        return Ok(result);
    }

    match mode {
        FailureMode::Fatal => Err(ComparatorError::ToleranceExceeded {
            result: Box::new(result),
        }),
        FailureMode::Report => {
            let line = result.diagnostic_line();
            tracing::warn!(name = %result.name, "{}", line);
            println!("{line}");
            Ok(result)
        }
    }
}

/// Compares `key` with the default policy; `error` selects fatal handling of drift.
pub fn compare(
    local_path: impl AsRef<Path>,
    expected_path: impl AsRef<Path>,
    key: &str,
    error: bool,
) -> Result<ComparisonResult, ComparatorError> {
    Comparator::default().compare(local_path, expected_path, key, FailureMode::from(error))
}

/// Compares two text dumps with the default policy; `error` selects fatal handling of drift.
pub fn compare_text(
    local_path: impl AsRef<Path>,
    expected_path: impl AsRef<Path>,
    name: &str,
    error: bool,
) -> Result<ComparisonResult, ComparatorError> {
    Comparator::default().compare_text(local_path, expected_path, name, FailureMode::from(error))
}
