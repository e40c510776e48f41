//! Gateway server command: `pagesmith serve`.

use anyhow::{Result, bail};

use pagesmith::config::{CliOverrides, ServiceConfig};
use pagesmith::gateway::start_server;
use pagesmith::telemetry::init_tracing;

use crate::Cli;

pub async fn cmd_serve(cli: &Cli, overrides: CliOverrides) -> Result<()> {
    let config = ServiceConfig::resolve(cli.config.as_deref(), &overrides)?;
    let _log_guard = init_tracing(
        config.logging.format,
        config.logging.debug,
        cli.log_dir.as_deref(),
    )?;

    let errors = config.errors();
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("{}", error);
        }
        bail!("Refusing to start: {}", errors.join("; "));
    }
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    start_server(&config).await
}
