//! Per-trace progress notifications for operators.
//!
//! The lines written here are for humans and are not a stable format.

use std::io::{self, Write};

use parking_lot::Mutex;

use common::Failure;

pub trait ProgressReporter: Send + Sync {
    /// A map task is about to run for `source_url`.
    fn will_run(&self, source_url: &str);

    /// A map task finished. `failures` is empty on success.
    fn did_run(&self, source_url: &str, failures: &[Failure]);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {
    fn will_run(&self, _source_url: &str) {}

    fn did_run(&self, _source_url: &str, _failures: &[Failure]) {}
}

/// Writes gtest-style lines to a stream.
#[derive(Debug)]
pub struct ConsoleProgressReporter<W> {
    out: Mutex<W>,
}

impl ConsoleProgressReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleProgressReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> ProgressReporter for ConsoleProgressReporter<W> {
    fn will_run(&self, source_url: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "[ RUN      ] {source_url}");
        let _ = out.flush();
    }

    fn did_run(&self, source_url: &str, failures: &[Failure]) {
        let mut out = self.out.lock();
        if failures.is_empty() {
            let _ = writeln!(out, "[       OK ] {source_url}");
        } else {
            for failure in failures {
                let _ = writeln!(out, "{failure}");
            }
            let _ = writeln!(out, "[  FAILED  ] {source_url}");
        }
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_run_and_result_lines() {
        let reporter = ConsoleProgressReporter::new(Vec::new());
        reporter.will_run("file:///a.json");
        reporter.did_run("file:///a.json", &[]);
        reporter.will_run("file:///b.json");
        reporter.did_run("file:///b.json", &[Failure::new("file:///b.json", "bad")]);

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            out,
            "[ RUN      ] file:///a.json\n\
             [       OK ] file:///a.json\n\
             [ RUN      ] file:///b.json\n\
             file:///b.json: bad\n\
             [  FAILED  ] file:///b.json\n"
        );
    }
}
