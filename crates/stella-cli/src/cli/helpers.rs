use stella_core::comparator::{Comparator, ComparisonPolicy};
use stella_core::domain::{StellaError, StellaResult};
use stella_core::numerics::Tolerance;
use stella_core::regression::RegressionRunnerConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ToleranceOverrides {
    pub(super) rtol: Option<f64>,
    pub(super) atol: Option<f64>,
}

impl ToleranceOverrides {
    fn apply(self, base: Tolerance) -> Option<Tolerance> {
        if self.rtol.is_none() && self.atol.is_none() {
            return None;
        }
        Some(Tolerance::new(
            self.rtol.unwrap_or(base.rtol),
            self.atol.unwrap_or(base.atol),
        ))
    }
}

pub(super) fn load_comparator(
    policy_path: Option<&Path>,
    overrides: ToleranceOverrides,
) -> StellaResult<Comparator> {
    let mut policy = match policy_path {
        Some(path) => ComparisonPolicy::from_policy_path(path).map_err(StellaError::from)?,
        None => ComparisonPolicy::default(),
    };
    if let Some(tolerance) = overrides.apply(policy.default_tolerance()) {
        tracing::debug!(rtol = tolerance.rtol, atol = tolerance.atol, "overriding default tolerance");
        policy = policy
            .with_default_tolerance(tolerance)
            .map_err(StellaError::from)?;
    }
    Ok(Comparator::new(policy))
}

pub(super) fn resolve_regression_paths(
    mut config: RegressionRunnerConfig,
    working_dir: &Path,
) -> RegressionRunnerConfig {
    config.manifest_path = resolve_cli_path(working_dir, &config.manifest_path);
    config.policy_path = resolve_cli_path(working_dir, &config.policy_path);
    config.input_dir = resolve_cli_path(working_dir, &config.input_dir);
    config.expected_dir = resolve_cli_path(working_dir, &config.expected_dir);
    config.work_root = resolve_cli_path(working_dir, &config.work_root);
    config.report_path = resolve_cli_path(working_dir, &config.report_path);
    config
}

pub(super) fn resolve_cli_path(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
