//! Logging setup.
//!
//! Everything logs through `tracing`. Output goes to stderr so stdout stays
//! free for command output (including `--json`), or to a log file when one
//! is given.

use crate::error::{NvprepError, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging options, usually straight from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Default to debug level instead of info
    pub debug: bool,
    /// Append logs to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default level. Fails if a subscriber is already
/// installed or the log file can't be opened.
pub fn init(opts: &LogOptions) -> Result<()> {
    let level = if opts.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let file_layer = match &opts.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| NvprepError::IoError { path: path.clone(), source: e })?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stderr_layer = opts
        .log_file
        .is_none()
        .then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(NvprepError::internal)?;

    tracing::debug!(log_file = ?opts.log_file, "Logging initialized");
    Ok(())
}
