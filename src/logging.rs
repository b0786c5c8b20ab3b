use crate::error::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Log to stderr and tee everything to `scraper.log` inside the output
/// directory, creating the directory if needed. The returned guard must
/// live until shutdown so buffered records get flushed.
pub fn init_logging(debug: bool, output_dir: &Path) -> Result<WorkerGuard> {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    std::fs::create_dir_all(output_dir)?;
    let file_appender = tracing_appender::rolling::never(output_dir, "scraper.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}
