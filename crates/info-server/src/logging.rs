//! Logger bootstrap, grounded in `server/lib/flux/src/logging.rs`'s
//! `sloggers`-based builder pattern: a terminal drain for interactive runs,
//! severity configurable from the settings file.

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

pub fn init(level: &str) -> slog::Logger {
    let severity = match level {
        "trace" => Severity::Trace,
        "debug" => Severity::Debug,
        "info" => Severity::Info,
        "warning" | "warn" => Severity::Warning,
        "error" | "critical" => Severity::Critical,
        _ => Severity::Info,
    };

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity);
    builder.destination(Destination::Stderr);

    builder.build().expect("logger configuration is always valid")
}
