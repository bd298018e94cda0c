use std::io;
use std::panic;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

/// Environment variable holding an `EnvFilter` directive string, e.g. `debug,store=trace`.
pub const LOG_FILTER_ENV: &str = "STREAM_BRIDGE_LOG";

/// Default level for `-v` repetitions: none, `-v`, `-vv` and more.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Diagnostics go to stderr, stdout carries data only.
///
/// The returned guard flushes buffered events when dropped and has to live as long as the
/// run does.
pub fn init_tracing(verbosity: u8) -> WorkerGuard {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stderr());

    let mut filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));

    // The redis crate is chatty at debug and below.
    if let Ok(redis_directive) = "redis=warn".parse::<Directive>() {
        filter = filter.add_directive(redis_directive);
    }

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .with_file(verbosity > 1)
        .with_line_number(verbosity > 1)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let error_layer = ErrorLayer::default();

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(error_layer);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global tracing subscriber: {e}");
    }

    guard
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = match payload.downcast_ref::<&str>() {
            Some(s) => s.to_string(),
            None => payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "Unknown panic".to_string()),
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
        eprintln!("stream-bridge panicked at {location}: {msg}");
    }));
}
