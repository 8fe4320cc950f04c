//! CLI entrypoint for the SONAR client tool.
//!
//! The binary delegates to [`sonar_cli::run`], which loads configuration,
//! logs in, runs one command and quits the session.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    sonar_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
