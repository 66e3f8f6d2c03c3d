use super::CliError;
use super::helpers::{
    ToleranceOverrides, load_comparator, resolve_cli_path, resolve_regression_paths,
};
use anyhow::Context;
use stella_core::comparator::ComparisonResult;
use stella_core::domain::{FailureMode, StellaError};
use stella_core::regression::{RegressionRunnerConfig, render_human_summary, run_regression};
use stella_core::simulation::CommandRunner;
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct ToleranceFlags {
    /// Override the policy's default relative tolerance
    #[arg(long)]
    rtol: Option<f64>,

    /// Override the policy's default absolute tolerance
    #[arg(long)]
    atol: Option<f64>,
}

impl ToleranceFlags {
    fn overrides(&self) -> ToleranceOverrides {
        ToleranceOverrides {
            rtol: self.rtol,
            atol: self.atol,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// Freshly produced structured artifact
    #[arg(long)]
    local: PathBuf,

    /// Golden structured artifact
    #[arg(long)]
    expected: PathBuf,

    /// Quantity key to compare (repeatable)
    #[arg(long = "key", required = true)]
    keys: Vec<String>,

    /// Comparison policy path; built-in defaults when omitted
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Abort on the first tolerance mismatch
    #[arg(long)]
    fatal: bool,

    #[command(flatten)]
    tolerance: ToleranceFlags,
}

#[derive(clap::Args)]
pub(super) struct CompareTextArgs {
    /// Freshly produced text dump
    #[arg(long)]
    local: PathBuf,

    /// Golden text dump
    #[arg(long)]
    expected: PathBuf,

    /// Name used in diagnostics and policy lookup
    #[arg(long, default_value = "Final fields")]
    name: String,

    /// Comparison policy path; built-in defaults when omitted
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Abort on a tolerance mismatch
    #[arg(long)]
    fatal: bool,

    #[command(flatten)]
    tolerance: ToleranceFlags,
}

#[derive(clap::Args)]
pub(super) struct RegressionArgs {
    /// Scenario manifest path
    #[arg(long, default_value = "tasks/regression-scenarios.json")]
    manifest: PathBuf,

    /// Comparison policy path
    #[arg(long, default_value = "tasks/comparison-policy.json")]
    policy: PathBuf,

    /// Simulation executable
    #[arg(long, default_value = "stella")]
    executable: PathBuf,

    /// Extra argument passed before the input file (repeatable)
    #[arg(long = "executable-arg", allow_hyphen_values = true)]
    executable_args: Vec<String>,

    /// Directory holding scenario input files
    #[arg(long, default_value = "fixtures/inputs")]
    input_dir: PathBuf,

    /// Directory holding EXPECTED_OUTPUT.* golden files
    #[arg(long, default_value = "fixtures/expected")]
    expected_dir: PathBuf,

    /// Root for per-scenario working directories
    #[arg(long, default_value = "artifacts/regression/work")]
    work_root: PathBuf,

    /// JSON report output path
    #[arg(long, default_value = "artifacts/regression/report.json")]
    report: PathBuf,

    /// Suffix of the structured output written next to the input
    #[arg(long, default_value = ".out.json")]
    structured_suffix: String,
}

impl RegressionArgs {
    fn into_config(self) -> RegressionRunnerConfig {
        RegressionRunnerConfig {
            manifest_path: self.manifest,
            policy_path: self.policy,
            input_dir: self.input_dir,
            expected_dir: self.expected_dir,
            work_root: self.work_root,
            report_path: self.report,
            structured_suffix: self.structured_suffix,
        }
    }
}

pub(super) fn run_compare_command(args: CompareArgs) -> Result<i32, CliError> {
    let comparator = load_comparator(args.policy.as_deref(), args.tolerance.overrides())?;
    let results = comparator
        .compare_many(
            &args.local,
            &args.expected,
            args.keys.as_slice(),
            FailureMode::from(args.fatal),
        )
        .map_err(StellaError::from)?;

    Ok(exit_code_for(&results))
}

pub(super) fn run_compare_text_command(args: CompareTextArgs) -> Result<i32, CliError> {
    let comparator = load_comparator(args.policy.as_deref(), args.tolerance.overrides())?;
    let result = comparator
        .compare_text(
            &args.local,
            &args.expected,
            &args.name,
            FailureMode::from(args.fatal),
        )
        .map_err(StellaError::from)?;

    Ok(exit_code_for(std::slice::from_ref(&result)))
}

pub(super) fn run_regression_command(args: RegressionArgs) -> Result<i32, CliError> {
    let working_dir =
        std::env::current_dir().context("failed to read current working directory")?;
    // Bare names resolve through PATH; the runner executes inside the work dir.
    let executable = if args.executable.components().count() > 1 {
        resolve_cli_path(&working_dir, &args.executable)
    } else {
        args.executable.clone()
    };
    let executable_args = args.executable_args.clone();
    let config = resolve_regression_paths(args.into_config(), &working_dir);

    let runner = CommandRunner::new(executable, &config.input_dir)
        .with_args(executable_args)
        .with_structured_suffix(config.structured_suffix.clone());
    let report = run_regression(&config, &runner)?;
    println!("{}", render_human_summary(&report));
    println!("JSON report: {}", config.report_path.display());

    if report.passed { Ok(0) } else { Ok(1) }
}

/// Failed results were already printed by the comparator in report mode.
fn exit_code_for(results: &[ComparisonResult]) -> i32 {
    for result in results.iter().filter(|result| result.passed) {
        println!("{}", result.diagnostic_line());
    }
    if results.iter().all(|result| result.passed) {
        0
    } else {
        1
    }
}
