use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initializes logging with the given filter directive (e.g. "info",
/// "delver=debug,tower_http=warn").
///
/// With `with_file`, logs are also written to `logs/delver.log`, rotated daily.
pub fn init_logging(log_level: &str, with_file: bool) {
    let filter = match EnvFilter::try_new(log_level) {
        Ok(f) => f,
        Err(_) => {
            eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
            EnvFilter::new("info")
        }
    };

    let stdout_layer = fmt::layer().with_target(false).with_line_number(true);

    let file_layer = with_file.then(|| {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "delver.log");
        fmt::layer()
            .with_ansi(false)
            .with_line_number(true)
            .with_writer(file_appender)
    });

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}
