mod args;

use std::process::ExitCode;
use std::sync::Arc;

use args::Args;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use standalone::inputs::discover_traces;
use standalone::{
    ConsoleProgressReporter, JobCount, JsonFormatter, MapRunner, NullProgressReporter,
    OutputFormatter, ProgressReporter, RunOutcome, RunnerOptions, SummaryFormatter,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let workload = match workload::try_named(&args.workload) {
        Some(wl) => wl,
        None => {
            error!(
                "The workload `{}` is not a known workload (known: {})",
                args.workload,
                workload::WORKLOADS.join(", ")
            );
            return ExitCode::FAILURE;
        }
    };

    let traces = match discover_traces(&args.input) {
        Ok(traces) => traces,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    info!("Found {} traces matching `{}`", traces.len(), args.input);

    let options = RunnerOptions {
        stop_on_error: args.stop_on_error,
        jobs: match args.jobs {
            0 => JobCount::Auto,
            n => JobCount::Fixed(n),
        },
        store: args.store,
        staging_dir: args.staging_dir,
    };

    let reporter: Arc<dyn ProgressReporter> = if args.quiet {
        Arc::new(NullProgressReporter)
    } else {
        Arc::new(ConsoleProgressReporter::stdout())
    };
    let formatter: Box<dyn OutputFormatter> = match args.output {
        Some(path) => Box::new(JsonFormatter::to_path(path)),
        None => Box::new(SummaryFormatter::stdout()),
    };

    let mut runner = MapRunner::new(traces, workload, options)
        .with_progress_reporter(reporter)
        .with_output_formatter(formatter);

    match runner.run().await.outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Aborted(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
