//! Configuration view and validation commands: `pagesmith config`.

use anyhow::{Result, bail};

use pagesmith::config::{CliOverrides, Redacted, ServiceConfig};

use crate::{Cli, ConfigCommands};

fn shown(value: &Redacted) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let overrides = CliOverrides {
        verbose: cli.verbose,
        ..CliOverrides::default()
    };
    let config = ServiceConfig::resolve(cli.config.as_deref(), &overrides)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("pagesmith configuration");
            println!("=======================");
            println!();
            println!("secret = \"{}\"", shown(&config.secret));
            println!("workspace_root = \"{}\"", config.workspace_root.display());
            println!();
            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!();
            println!("[github]");
            println!("  username = \"{}\"", config.github.username);
            println!("  token = \"{}\"", shown(&config.github.token));
            println!("  api_url = \"{}\"", config.github.api_url);
            println!("  remote_base = \"{}\"", config.github.remote_base);
            println!("  branch = \"{}\"", config.github.branch);
            println!("  commit_email = \"{}\"", config.github.commit_email());
            println!();
            println!("[llm]");
            println!("  api_key = \"{}\"", shown(&config.llm.api_key));
            println!("  base_url = \"{}\"", config.llm.base_url());
            println!("  model = \"{}\"", config.llm.model);
            println!("  temperature = {}", config.llm.temperature);
            println!("  max_tokens = {}", config.llm.max_tokens);
            println!();
            println!("[liveness]");
            println!("  interval_secs = {}", config.liveness.interval_secs);
            println!("  timeout_secs = {}", config.liveness.timeout_secs);
            println!();
            println!("[notify]");
            println!("  max_attempts = {}", config.notify.max_attempts);
            println!("  initial_delay_secs = {}", config.notify.initial_delay_secs);
            println!();
            println!("[logging]");
            println!("  format = \"{}\"", config.logging.format);
            println!("  debug = {}", config.logging.debug);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let errors = config.errors();
            let warnings = config.warnings();

            if errors.is_empty() && warnings.is_empty() {
                println!("Configuration is valid.");
            }
            if !warnings.is_empty() {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
            if !errors.is_empty() {
                println!("Configuration errors:");
                for error in &errors {
                    println!("  - {}", error);
                }
                println!();
                bail!("Configuration has {} error(s)", errors.len());
            }
            println!();
        }
    }

    Ok(())
}
