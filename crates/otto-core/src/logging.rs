//! Structured logging bootstrap. Process bootstrap and CLI argument parsing
//! are out of scope (§1), but the logging setup itself is ambient
//! infrastructure every component relies on.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global `tracing` subscriber. Filter directives come from
/// `OTTO_LOG`, falling back to `RUST_LOG`, falling back to `info`.
///
/// If `log_dir` is given, logs are also written as rolling daily files
/// under it; the returned guard must be held for the process lifetime or
/// buffered lines are dropped on exit.
pub fn init(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("OTTO_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "otto.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .init();
            None
        }
    }
}
