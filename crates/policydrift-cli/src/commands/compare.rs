use crate::cli::CompareArgs;
use crate::config::{self, FileConfig};
use crate::render::{RunStamp, render_console, report_json};
use crate::support::{CliError, exit_with_error, render_json_or_exit};
use policydrift_baseline::{load_live, load_mapping, load_reference};
use policydrift_kernel::{
    CancellationFlag, ComparisonResult, MatchStrategy, MatchingOptions, NormalizationTables,
    Orchestrator, RunOutcome, ValueNormalizer,
};
use std::process;
use tracing::{debug, info};

pub fn run(args: CompareArgs) {
    match execute(&args) {
        Ok(result) => {
            if args.json {
                let report = report_json(&result, &RunStamp::now());
                println!("{}", render_json_or_exit(&report));
            } else {
                println!("{}", render_console(&result));
            }
            process::exit(result.verdict.exit_code());
        }
        Err(error) => exit_with_error(&error),
    }
}

fn execute(args: &CompareArgs) -> Result<ComparisonResult, CliError> {
    let (file, config_path) = FileConfig::discover(args.config.as_deref())?;
    if let Some(path) = &config_path {
        debug!(config = %path.display(), "loaded config file");
    }
    let settings = config::resolve(args, &file, config_path.as_deref());

    let live = load_live(&args.live)?;
    let reference = load_reference(&args.reference)?;
    let custom_mapping = match settings.strategy {
        MatchStrategy::CustomMapping => {
            let path = settings.mapping.as_ref().ok_or(CliError::MissingMapping)?;
            load_mapping(path)?
        }
        MatchStrategy::ByName | MatchStrategy::ById => Vec::new(),
    };
    let options = MatchingOptions {
        strategy: settings.strategy,
        case_sensitive: settings.case_sensitive,
        custom_mapping,
    };

    let tables = NormalizationTables::builtin()?;
    let orchestrator = Orchestrator::new(
        ValueNormalizer::new(&tables),
        settings.rules,
        settings.run,
    );

    let cancel = CancellationFlag::new();
    let runtime = watch_interrupt(&cancel)?;
    let outcome = orchestrator.run(&live, &reference, &options, &cancel);
    runtime.shutdown_background();

    match outcome? {
        RunOutcome::Completed(result) => {
            info!(
                verdict = %result.verdict,
                differing = result.summary.differing_policies,
                "comparison complete"
            );
            Ok(result)
        }
        RunOutcome::Cancelled => Err(CliError::Cancelled),
    }
}

/// Start a background runtime that flips `cancel` on Ctrl-C.
fn watch_interrupt(cancel: &CancellationFlag) -> Result<tokio::runtime::Runtime, CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let cancel = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling comparison");
            cancel.cancel();
        }
    });
    Ok(runtime)
}
