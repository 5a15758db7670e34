//! Tracing initialisation for the project runner.
//!
//! Call [`init_tracing`] once at program start. Log lines go to stdout, which
//! is where a workflow step's diagnostics are collected.
//!
//! Safe to call more than once; the global subscriber can only be set once
//! per process and later calls are ignored.

use std::io::IsTerminal;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Colour codes are only emitted when stdout is a terminal, so log files
/// collected from a workflow step stay plain text.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let ansi = std::io::stdout().is_terminal();

    build_subscriber(json, env_filter, std::io::stdout, ansi)
        .try_init()
        .ok();
}

fn build_subscriber<W>(
    json: bool,
    env_filter: EnvFilter,
    writer: W,
    ansi: bool,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer()
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer);

    if json {
        Box::new(registry.with(layer.json()))
    } else {
        Box::new(registry.with(layer))
    }
}
