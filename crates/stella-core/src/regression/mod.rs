//! Scenario-driven regression runs: simulate, then compare against golden outputs.
//!
//! A scenario passes unless one of its checks raises a fatal condition. Checks
//! flagged non-fatal still record their mismatches in the report but let the
//! remaining checks run.

use crate::comparator::{ArtifactKind, Comparator, ComparatorError, ComparisonResult};
use crate::domain::{FailureMode, SimulationRequest, StellaError, StellaResult};
use crate::simulation::{
    DEFAULT_STRUCTURED_SUFFIX, ExpectedOutputRepository, SimulationRunner,
    is_contained_input_path, local_output_path,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const REGRESSION_SCENARIOS_PATH: &str = "tasks/regression-scenarios.json";

#[derive(Debug, Clone)]
pub struct RegressionRunnerConfig {
    pub manifest_path: PathBuf,
    pub policy_path: PathBuf,
    pub input_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub work_root: PathBuf,
    pub report_path: PathBuf,
    pub structured_suffix: String,
}

impl Default for RegressionRunnerConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(REGRESSION_SCENARIOS_PATH),
            policy_path: PathBuf::from(crate::comparator::COMPARISON_POLICY_PATH),
            input_dir: PathBuf::from("fixtures/inputs"),
            expected_dir: PathBuf::from("fixtures/expected"),
            work_root: PathBuf::from("artifacts/regression/work"),
            report_path: PathBuf::from("artifacts/regression/report.json"),
            structured_suffix: DEFAULT_STRUCTURED_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegressionRunReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub manifest_path: String,
    pub policy_path: String,
    pub input_dir: String,
    pub expected_dir: String,
    pub work_root: String,
    pub scenario_count: usize,
    pub passed_scenario_count: usize,
    pub failed_scenario_count: usize,
    pub check_count: usize,
    pub passed_check_count: usize,
    pub failed_check_count: usize,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub input_file: String,
    pub work_dir: String,
    pub passed: bool,
    pub failure_reason: Option<String>,
    pub check_count: usize,
    pub passed_check_count: usize,
    pub failed_check_count: usize,
    pub checks: Vec<CheckReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub kind: ArtifactKind,
    pub fatal: bool,
    pub local_path: String,
    pub expected_path: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub comparison: Option<ComparisonResult>,
}

pub fn run_regression(
    config: &RegressionRunnerConfig,
    runner: &dyn SimulationRunner,
) -> StellaResult<RegressionRunReport> {
    let manifest = load_manifest(&config.manifest_path).map_err(StellaError::from)?;
    let comparator = Comparator::from_policy_path(&config.policy_path)
        .map_err(|source| StellaError::from(RegressionRunnerError::Comparator(source)))?;
    let repository = ExpectedOutputRepository::new(&config.expected_dir);

    let mut scenario_reports = Vec::with_capacity(manifest.scenarios.len());
    for scenario in &manifest.scenarios {
        tracing::info!(scenario = %scenario.id, input = %scenario.input_file, "running scenario");
        let report = run_scenario(config, scenario, runner, &comparator, &repository)?;
        if report.passed {
            tracing::info!(scenario = %scenario.id, "scenario passed");
        } else {
            tracing::warn!(
                scenario = %scenario.id,
                reason = report.failure_reason.as_deref().unwrap_or("unknown"),
                "scenario failed"
            );
        }
        scenario_reports.push(report);
    }

    let scenario_count = scenario_reports.len();
    let passed_scenario_count = scenario_reports
        .iter()
        .filter(|scenario| scenario.passed)
        .count();
    let failed_scenario_count = scenario_count.saturating_sub(passed_scenario_count);

    let check_count = scenario_reports
        .iter()
        .map(|scenario| scenario.check_count)
        .sum::<usize>();
    let passed_check_count = scenario_reports
        .iter()
        .map(|scenario| scenario.passed_check_count)
        .sum::<usize>();
    let failed_check_count = check_count.saturating_sub(passed_check_count);

    let report = RegressionRunReport {
        generated_at_unix_seconds: current_unix_timestamp_seconds(),
        passed: failed_scenario_count == 0,
        manifest_path: normalize_path(&config.manifest_path),
        policy_path: normalize_path(&config.policy_path),
        input_dir: normalize_path(&config.input_dir),
        expected_dir: normalize_path(&config.expected_dir),
        work_root: normalize_path(&config.work_root),
        scenario_count,
        passed_scenario_count,
        failed_scenario_count,
        check_count,
        passed_check_count,
        failed_check_count,
        scenarios: scenario_reports,
    };

    write_report_file(&config.report_path, &report).map_err(StellaError::from)?;
    Ok(report)
}

pub fn render_human_summary(report: &RegressionRunReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed { "PASS" } else { "FAIL" };
    lines.push(format!("Regression status: {}", status));
    lines.push(format!(
        "Scenarios: {} total ({} passed, {} failed)",
        report.scenario_count, report.passed_scenario_count, report.failed_scenario_count
    ));
    lines.push(format!(
        "Checks: {} total ({} passed, {} failed)",
        report.check_count, report.passed_check_count, report.failed_check_count
    ));

    for scenario in &report.scenarios {
        let scenario_status = if scenario.passed { "PASS" } else { "FAIL" };
        lines.push(format!(
            "Scenario {}: {} ({}/{} checks)",
            scenario.scenario_id,
            scenario_status,
            scenario.passed_check_count,
            scenario.check_count
        ));

        if let Some(reason) = &scenario.failure_reason {
            lines.push(format!("  fatal: {}", reason));
        }
        for check in scenario.checks.iter().filter(|check| !check.passed) {
            let reason = check
                .reason
                .as_deref()
                .unwrap_or("comparison failed without a reason");
            lines.push(format!("  mismatch: {} ({})", check.name, reason));
        }
    }

    lines.join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum RegressionRunnerError {
    #[error("failed to read scenario manifest '{}': {source}", path.display())]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scenario manifest '{}': {source}", path.display())]
    ParseManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid scenario manifest '{}': {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },
    #[error("comparator setup failed: {0}")]
    Comparator(ComparatorError),
    #[error("failed to prepare scenario directory '{}': {source}", path.display())]
    WorkDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create report directory '{}': {source}", path.display())]
    ReportDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize report '{}': {source}", path.display())]
    SerializeReport {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write report '{}': {source}", path.display())]
    WriteReport {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<RegressionRunnerError> for StellaError {
    fn from(error: RegressionRunnerError) -> Self {
        let message = error.to_string();
        match error {
            RegressionRunnerError::ReadManifest { .. } => {
                StellaError::io_system("IO.REGRESSION_MANIFEST", message)
            }
            RegressionRunnerError::ParseManifest { .. }
            | RegressionRunnerError::InvalidManifest { .. } => {
                StellaError::input_validation("INPUT.REGRESSION_MANIFEST", message)
            }
            RegressionRunnerError::Comparator(source) => source.into(),
            RegressionRunnerError::WorkDirectory { .. }
            | RegressionRunnerError::ReportDirectory { .. }
            | RegressionRunnerError::WriteReport { .. } => {
                StellaError::io_system("IO.REGRESSION_FILESYSTEM", message)
            }
            RegressionRunnerError::SerializeReport { .. } => {
                StellaError::internal("SYS.REGRESSION_REPORT", message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioManifest {
    #[serde(default)]
    scenarios: Vec<ManifestScenario>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestScenario {
    id: String,
    #[serde(rename = "inputFile")]
    input_file: String,
    #[serde(default)]
    quantities: Vec<QuantityCheck>,
    #[serde(rename = "textArtifacts", default)]
    text_artifacts: Vec<TextArtifactCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuantityCheck {
    key: String,
    #[serde(default)]
    fatal: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TextArtifactCheck {
    name: String,
    suffix: String,
    #[serde(default)]
    fatal: bool,
}

fn load_manifest(manifest_path: &Path) -> Result<ScenarioManifest, RegressionRunnerError> {
    let content = fs::read_to_string(manifest_path).map_err(|source| {
        RegressionRunnerError::ReadManifest {
            path: manifest_path.to_path_buf(),
            source,
        }
    })?;
    let manifest: ScenarioManifest =
        serde_json::from_str(&content).map_err(|source| RegressionRunnerError::ParseManifest {
            path: manifest_path.to_path_buf(),
            source,
        })?;

    let invalid = |message: String| RegressionRunnerError::InvalidManifest {
        path: manifest_path.to_path_buf(),
        message,
    };
    let mut seen_ids = BTreeSet::new();
    for scenario in &manifest.scenarios {
        if !is_directory_name(&scenario.id) {
            return Err(invalid(format!(
                "scenario id '{}' must be a single directory name",
                scenario.id
            )));
        }
        if !is_contained_input_path(&scenario.input_file) {
            return Err(invalid(format!(
                "scenario '{}' input file '{}' must be relative to the input directory",
                scenario.id, scenario.input_file
            )));
        }
        if !seen_ids.insert(scenario.id.as_str()) {
            return Err(invalid(format!("duplicate scenario id '{}'", scenario.id)));
        }
        if scenario.quantities.is_empty() && scenario.text_artifacts.is_empty() {
            return Err(invalid(format!(
                "scenario '{}' does not list any checks",
                scenario.id
            )));
        }
    }

    Ok(manifest)
}

/// Scenario ids become one directory under the work root.
fn is_directory_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    !id.trim().is_empty()
        && !id.contains(['/', '\\'])
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
}

fn run_scenario(
    config: &RegressionRunnerConfig,
    scenario: &ManifestScenario,
    runner: &dyn SimulationRunner,
    comparator: &Comparator,
    repository: &ExpectedOutputRepository,
) -> StellaResult<ScenarioReport> {
    let work_dir = config.work_root.join(&scenario.id);
    reset_work_dir(&work_dir).map_err(StellaError::from)?;

    let mut report = ScenarioReport {
        scenario_id: scenario.id.clone(),
        input_file: scenario.input_file.clone(),
        work_dir: normalize_path(&work_dir),
        passed: false,
        failure_reason: None,
        check_count: 0,
        passed_check_count: 0,
        failed_check_count: 0,
        checks: Vec::new(),
    };

    if let Err(fatal) = run_checks(
        config,
        scenario,
        runner,
        comparator,
        repository,
        &work_dir,
        &mut report.checks,
    ) {
        report.failure_reason = Some(fatal.diagnostic_line());
    }

    report.check_count = report.checks.len();
    report.passed_check_count = report.checks.iter().filter(|check| check.passed).count();
    report.failed_check_count = report.check_count - report.passed_check_count;
    report.passed = report.failure_reason.is_none();
    Ok(report)
}

fn run_checks(
    config: &RegressionRunnerConfig,
    scenario: &ManifestScenario,
    runner: &dyn SimulationRunner,
    comparator: &Comparator,
    repository: &ExpectedOutputRepository,
    work_dir: &Path,
    checks: &mut Vec<CheckReport>,
) -> StellaResult<()> {
    let request = SimulationRequest::new(scenario.input_file.as_str(), work_dir);
    let output = runner.run(&request).map_err(StellaError::from)?;

    if !scenario.quantities.is_empty() {
        let expected_path = repository
            .resolve(&scenario.input_file, &config.structured_suffix)
            .map_err(StellaError::from)?;
        for quantity in &scenario.quantities {
            let comparison = comparator.compare(
                &output.structured_output,
                &expected_path,
                &quantity.key,
                FailureMode::from(quantity.fatal),
            );
            record_check(
                checks,
                &quantity.key,
                ArtifactKind::Structured,
                quantity.fatal,
                &output.structured_output,
                &expected_path,
                comparison,
            )?;
        }
    }

    for text in &scenario.text_artifacts {
        let local_path = local_output_path(work_dir, &scenario.input_file, &text.suffix);
        let expected_path = repository
            .resolve(&scenario.input_file, &text.suffix)
            .map_err(StellaError::from)?;
        let comparison = comparator.compare_text(
            &local_path,
            &expected_path,
            &text.name,
            FailureMode::from(text.fatal),
        );
        record_check(
            checks,
            &text.name,
            ArtifactKind::Text,
            text.fatal,
            &local_path,
            &expected_path,
            comparison,
        )?;
    }

    Ok(())
}

fn record_check(
    checks: &mut Vec<CheckReport>,
    name: &str,
    kind: ArtifactKind,
    fatal: bool,
    local_path: &Path,
    expected_path: &Path,
    comparison: Result<ComparisonResult, ComparatorError>,
) -> StellaResult<()> {
    let mut check = CheckReport {
        name: name.to_string(),
        kind,
        fatal,
        local_path: normalize_path(local_path),
        expected_path: normalize_path(expected_path),
        passed: false,
        reason: None,
        comparison: None,
    };

    match comparison {
        Ok(result) => {
            check.passed = result.passed;
            check.reason = result.reason.clone();
            check.comparison = Some(result);
            checks.push(check);
            Ok(())
        }
        Err(error) => {
            let error = StellaError::from(error);
            check.reason = Some(error.message().to_string());
            checks.push(check);
            Err(error)
        }
    }
}

fn reset_work_dir(work_dir: &Path) -> Result<(), RegressionRunnerError> {
    let io_error = |source| RegressionRunnerError::WorkDirectory {
        path: work_dir.to_path_buf(),
        source,
    };
    if work_dir.exists() {
        fs::remove_dir_all(work_dir).map_err(io_error)?;
    }
    fs::create_dir_all(work_dir).map_err(io_error)
}

fn write_report_file(
    report_path: &Path,
    report: &RegressionRunReport,
) -> Result<(), RegressionRunnerError> {
    if let Some(parent_dir) = report_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|source| {
            RegressionRunnerError::ReportDirectory {
                path: parent_dir.to_path_buf(),
                source,
            }
        })?;
    }

    let report_json = serde_json::to_string_pretty(report).map_err(|source| {
        RegressionRunnerError::SerializeReport {
            path: report_path.to_path_buf(),
            source,
        }
    })?;
    fs::write(report_path, report_json).map_err(|source| RegressionRunnerError::WriteReport {
        path: report_path.to_path_buf(),
        source,
    })
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
