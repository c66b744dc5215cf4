//! Command-line entry point for the stowage broker daemon.

use std::fmt::Display;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use stowaged::{StructuredHealthReporter, SystemConfigLoader, bootstrap_with};

fn main() -> ExitCode {
    let reporter = Arc::new(StructuredHealthReporter::new());
    let daemon = match bootstrap_with(&SystemConfigLoader, reporter) {
        Ok(daemon) => daemon,
        Err(error) => return fail(&error),
    };

    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    match daemon.serve(&mut input, &mut output) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => fail(&error),
    }
}

// Telemetry may not be installed yet, so fatal errors also go to stderr.
fn fail(error: &dyn Display) -> ExitCode {
    let mut stderr = io::stderr().lock();
    drop(writeln!(stderr, "stowaged: {error}"));
    ExitCode::FAILURE
}
