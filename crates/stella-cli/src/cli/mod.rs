mod commands;
mod helpers;

use clap::Parser;
use stella_core::domain::StellaError;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

pub fn run_from_env() -> i32 {
    init_tracing();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let stella_error = error.as_stella_error();
            eprintln!("{}", stella_error.diagnostic_line());
            eprintln!("{}", stella_error.fatal_exit_line());
            stella_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("stella-regress".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Logs go to stderr so stdout carries only diagnostics and summaries.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "stella-regress",
    version,
    about = "Golden-output regression harness for stella simulations"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Compare named quantities between two structured artifacts
    Compare(commands::CompareArgs),
    /// Compare two plain-text dumps token by token
    CompareText(commands::CompareTextArgs),
    /// Run every manifest scenario and compare against golden outputs
    Regression(commands::RegressionArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Compare(args) => commands::run_compare_command(args),
        CliCommand::CompareText(args) => commands::run_compare_text_command(args),
        CliCommand::Regression(args) => commands::run_regression_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(StellaError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_stella_error(&self) -> StellaError {
        match self {
            Self::Usage(message) => {
                StellaError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => StellaError::internal("SYS.CLI", format!("{error:#}")),
        }
    }
}

impl From<StellaError> for CliError {
    fn from(error: StellaError) -> Self {
        Self::Compute(error)
    }
}
