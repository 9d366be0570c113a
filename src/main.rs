//! This file defines the rayvar binary entry point.

use rayvar::cli;
use rayvar::driver;
use rayvar::error::log_error_chain;
use rayvar::metrics;
use rayvar::tracing;

use std::process::ExitCode;

/// Application entry point
fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    let result = metrics::register_metrics()
        .and_then(|_| driver::run(&args))
        .and_then(|report| driver::write_outputs(&args, &report));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log_error_chain(&error);
            ExitCode::FAILURE
        }
    }
}
