//! Local, single-process map reduce over performance traces.
//!
//! A [`MapRunner`] maps every trace on a bounded pool of workers, merges the
//! per-trace output into one accumulator on a serial loop, and then reduces it
//! by key in two stages. See [`WorkQueue`] for the execution model.

pub mod error;
pub mod inputs;
pub mod map;
pub mod output;
pub mod progress;
pub mod reduce;
pub mod runner;
pub mod store;
pub mod work_queue;

pub use error::JobError;
pub use output::{JobOutput, JsonFormatter, OutputFormatter, SummaryFormatter};
pub use progress::{ConsoleProgressReporter, NullProgressReporter, ProgressReporter};
pub use runner::{JobCount, MapRunner, MapperOutput, RunOutcome, RunOutput, RunnerOptions};
pub use store::{StoreKind, TransientStore};
pub use work_queue::WorkQueue;
