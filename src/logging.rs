//! Tracing subscriber setup driven by [`LoggingEnvConfig`]

use std::fs::OpenOptions;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingEnvConfig;
use crate::error::Error;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingEnvConfig) -> Result<(), Error> {
    let level = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ido_sdk={level},ido={level}")));

    let writer = match config.file_path.as_deref() {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let ansi = config.enable_colors.unwrap_or(true) && config.file_path.is_none();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let format = if config.structured.unwrap_or(false) {
        "json"
    } else {
        config.format.as_deref().unwrap_or("compact")
    };

    let result = match format {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}
