use crate::config::ConfigError;
use policydrift_baseline::LoadError;
use policydrift_kernel::{CompareError, MatchError, TableError, Verdict};
use std::process;

/// Every failure that ends a CLI run before a verdict exists.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("strategy custom-mapping requires --mapping or [matching].mapping")]
    MissingMapping,

    #[error("failed to create tokio runtime: {0}")]
    Runtime(String),

    #[error("comparison cancelled; no result was produced")]
    Cancelled,
}

impl From<MatchError> for CliError {
    fn from(error: MatchError) -> Self {
        Self::Compare(error.into())
    }
}

impl From<TableError> for CliError {
    fn from(error: TableError) -> Self {
        Self::Compare(error.into())
    }
}

/// Exit code for run-level failures.
pub const ERROR_EXIT: i32 = Verdict::Error.exit_code();

pub fn exit_with_error(error: &CliError) -> ! {
    eprintln!("error: {error}");
    process::exit(ERROR_EXIT);
}

pub fn render_json_or_exit(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("error: failed to render JSON payload: {e}");
        process::exit(ERROR_EXIT);
    })
}
