//! Logging utilities for gridmet-cfsv2.
//!
//! This module provides structured logging functionality so fetches,
//! cache hits and failures are easy to follow from the command line or in
//! scheduled runs. Log output goes to stderr; stdout carries results.

use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pick a log level from the command-line verbosity flags.
pub fn level_for(quiet: bool, verbose: bool, configured: &str) -> String {
    if quiet {
        "error".to_string()
    } else if verbose {
        "debug".to_string()
    } else {
        configured.to_string()
    }
}

/// Initialize the tracing subscriber with the given log level
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Log a start message for a significant operation
pub fn log_operation_start(operation: &str, details: Option<&str>) {
    if let Some(details) = details {
        info!(
            operation = operation,
            details = details,
            "Starting operation"
        );
    } else {
        info!(operation = operation, "Starting operation");
    }
}

/// Log the completion of a significant operation
pub fn log_operation_end(operation: &str, start_time: Instant, success: bool) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if success {
        info!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed successfully"
        );
    } else {
        warn!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation failed"
        );
    }
}

/// Log an operation with timing and result in a single statement
pub fn log_timed_operation<F, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let operation_id = Uuid::new_v4();

    debug!(
        operation = operation,
        operation_id = %operation_id,
        "Starting operation"
    );

    let result = f();

    info!(
        operation = operation,
        operation_id = %operation_id,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Operation completed"
    );

    result
}

/// Log a summary of a completed remote fetch
pub fn log_fetch_stats(
    variable: &str,
    ensemble: &str,
    member_count: usize,
    time_steps: usize,
    start_time: Instant,
) {
    info!(
        operation = "fetch_forecast",
        variable = variable,
        ensemble = ensemble,
        members = member_count,
        time_steps = time_steps,
        duration_ms = start_time.elapsed().as_secs_f64() * 1000.0,
        "Forecast fetched"
    );
}

/// Log an error with context
pub fn log_error(error: &crate::error::Cfsv2Error, context: &str) {
    error!(
        error = %error,
        context = context,
        category = ?error.category(),
        "Error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(true, true, "info"), "error");
        assert_eq!(level_for(false, true, "info"), "debug");
        assert_eq!(level_for(false, false, "warn"), "warn");
    }

    #[test]
    fn test_log_timed_operation() {
        let result = log_timed_operation("test_operation", || {
            std::thread::sleep(Duration::from_millis(1));
            42
        });

        assert_eq!(result, 42);
    }
}
