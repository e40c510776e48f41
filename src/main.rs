use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "pagesmith")]
#[command(version, about = "Webhook service that turns app briefs into published static sites")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write JSON logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// TOML configuration file. Overrides PAGESMITH_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job gateway until Ctrl+C
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding per-job workspaces
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Check the effective configuration; exits non-zero on fatal problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            host,
            port,
            workspace_root,
        } => {
            let overrides = pagesmith::config::CliOverrides {
                host: host.clone(),
                port: *port,
                workspace_root: workspace_root.clone(),
                verbose: cli.verbose,
            };
            cmd::cmd_serve(&cli, overrides).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
