//! Tracing setup shared by the triage binaries.
//!
//! Events go to stderr and to a size-rotated file under
//! `$TRIAGE_HOME/logs` (default `~/.sysdiagnose_triage/logs`).

mod rolling;

pub use rolling::{RotatingLog, RotationPolicy, SharedLog};

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable that relocates the triage home directory
pub const TRIAGE_HOME_ENV: &str = "TRIAGE_HOME";

const DEFAULT_LOG_FILTER: &str = "triage=info,triage_yarascan=info";
const VERBOSE_LOG_FILTER: &str = "triage=debug,triage_yarascan=debug";

/// Logging options for a binary.
pub struct LogConfig<'a> {
    /// Used as the log file stem
    pub app_name: &'a str,
    /// Raise console output to debug when `RUST_LOG` is unset
    pub verbose: bool,
}

/// Install the global subscriber.
///
/// Returns the log file path, or `None` when the file could not be opened
/// and only stderr is active.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<PathBuf>> {
    let file_filter = env_filter(DEFAULT_LOG_FILTER);
    let console_filter = if config.verbose {
        env_filter(VERBOSE_LOG_FILTER)
    } else {
        env_filter(DEFAULT_LOG_FILTER)
    };

    let opened = logs_dir().and_then(|dir| {
        let log = RotatingLog::open(&dir, config.app_name, RotationPolicy::default())?;
        Ok((log.path().to_path_buf(), SharedLog::new(log)))
    });

    let (file_layer, log_path, file_error) = match opened {
        Ok((path, writer)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            (Some(layer), Some(path), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    if let Some(e) = file_error {
        tracing::warn!(error = %format!("{e:#}"), "file logging disabled, using stderr only");
    }

    Ok(log_path)
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Triage home directory: `$TRIAGE_HOME`, else `~/.sysdiagnose_triage`
pub fn triage_home() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(TRIAGE_HOME_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".sysdiagnose_triage"))
        .context("Could not determine home directory")
}

/// Logs directory inside the triage home
pub fn logs_dir() -> Result<PathBuf> {
    Ok(triage_home()?.join("logs"))
}
