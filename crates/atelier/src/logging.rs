//! Subscriber setup for hosts embedding the orchestrator.
//!
//! Library code logs through the `log` facade; `init_logging` bridges those
//! records into a `tracing` subscriber so they share spans and formatting
//! with the job spans.

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber, writing to stderr. `RUST_LOG` controls
/// the filter (default `info`). Safe to call more than once; later calls
/// keep the first subscriber.
pub fn init_logging(format: LogFormat) {
    let result = match format {
        LogFormat::Plain => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false));
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = Registry::default().with(env_filter()).with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            );
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    if result.is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization");
        return;
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("Failed to bridge log records into tracing: {}", e);
    }
}
