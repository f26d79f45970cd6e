//! Subscriber setup for the CLI. `log` records from the db and worker
//! modules are bridged into `tracing`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `RUST_LOG` wins when set; otherwise `info`, raised to `debug` by one
/// `-v` and to `trace` by two.
pub fn default_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(verbosity: u8, format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_log::LogTracer::init()?;

    let filter = default_filter(verbosity);
    match format {
        LogFormat::Text => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
