use std::path::PathBuf;

use clap::Parser;

use standalone::StoreKind;

#[derive(Parser, Debug)]
#[command(version, about = "Run a map reduce workload over local trace files", long_about = None)]
pub struct Args {
    /// Glob spec for the input traces, e.g. `traces/*.json`.
    #[arg(short, long)]
    pub input: String,

    /// Name of the workload.
    #[arg(short, long)]
    pub workload: String,

    /// Number of parallel workers. 0 uses one per CPU.
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Abort as soon as a trace fails to map.
    #[arg(long, default_value_t = false)]
    pub stop_on_error: bool,

    /// Where partial results are staged between reduce stages.
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Directory for staging files when `--store disk` is used. Defaults to
    /// the system temp directory.
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Write the result as JSON to this file instead of printing a summary.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not print per-trace progress lines.
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}
