// SPDX-License-Identifier: AGPL-3.0-or-later

//! `tracing` subscriber initialization.
//!
//! Callers that embed this crate into a larger service are free to install
//! their own subscriber and skip this module entirely; [`init`] is a
//! convenience for binaries and examples that just want sane defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter directive, e.g. `"vantage_client=debug"`.
    /// Falls back to `"info"` when unset.
    pub filter: Option<String>,
    pub format: LogFormat,
    /// When set, logs are written to a daily-rolling file under this
    /// directory instead of stderr.
    pub log_dir: Option<PathBuf>,
}

/// Installs a global `tracing` subscriber built from `cfg`.
///
/// Returns a [`WorkerGuard`] when file logging is enabled; the guard must
/// be held for the lifetime of the process or buffered lines are lost on
/// exit, mirroring `tracing_appender`'s non-blocking writer contract.
pub fn init(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(cfg.filter.clone().unwrap_or_else(|| "info".to_string()))
        .context("invalid log filter directive")?;

    match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vantage-client.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let registry = tracing_subscriber::registry().with(filter);
            match cfg.format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .init(),
            }
            Ok(Some(guard))
        },
        None => {
            let registry = tracing_subscriber::registry().with(filter);
            match cfg.format {
                LogFormat::Json => registry.with(fmt::layer().json()).init(),
                LogFormat::Pretty => registry.with(fmt::layer()).init(),
            }
            Ok(None)
        },
    }
}
