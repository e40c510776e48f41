//! Tracing subscriber setup.
//!
//! Call [`init_tracing`] once at startup. `RUST_LOG` always wins over the
//! configured default level.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;
use crate::jobs::JobRequest;

/// Initialize the global subscriber.
///
/// When `log_dir` is set, logs are additionally written to a daily-rolling
/// `pagesmith.log` there. The returned guard flushes that writer on drop and
/// must be held for the lifetime of the process.
pub fn init_tracing(format: LogFormat, debug: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = match format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "pagesmith.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Span carried by every background job so each log line names its job.
#[must_use]
pub fn job_span(request: &JobRequest) -> Span {
    tracing::info_span!(
        "job",
        email = %request.email,
        task = %request.task,
        round = request.round,
        nonce = %request.nonce,
    )
}
