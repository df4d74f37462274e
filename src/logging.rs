//! Log plumbing: compact stderr output plus an append-only run log.
//!
//! The stderr layer honors `RUST_LOG` and defaults to `info`; the file layer
//! always records `info` and up so a crashed run leaves a full trail next to
//! the belief-map dump.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Open the run log for appending, creating it on first use.
fn append_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Call once, before the agent starts.
pub fn init(log_path: &Path) -> io::Result<()> {
    let file = append_log_file(log_path)?;
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
