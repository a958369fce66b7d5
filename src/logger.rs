//! Default logger used when the caller does not inject one

use std::io;
use std::sync::Mutex;

use slog::{Drain, Level};

/// Value of the `name` key on every record
pub(crate) const COMPONENT: &str = "grim-reaper";

/// JSON lines on stderr, with timestamp, level, component name and caller
pub(crate) fn default_logger(verbose: bool) -> slog::Logger {
    let level = if verbose { Level::Debug } else { Level::Info };
    let json = slog_json::Json::new(io::stderr()).add_default_keys().build();
    let drain = Mutex::new(json).filter_level(level).ignore_res();

    slog::Logger::root(
        drain,
        slog::o!(
            "name" => COMPONENT,
            "caller" => slog::FnValue(|record: &slog::Record| {
                format!("{}:{}", record.file(), record.line())
            }),
        ),
    )
}

