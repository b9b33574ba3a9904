//! CLI commands.

mod capacity;
mod graph;
mod simulate;
mod synth;
mod validate;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fisdemo_descriptor::{Deployment, DeploymentConfig};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::output::OutputFormat;

/// fisctl - synthesize and inspect the fault-injection demo deployment.
#[derive(Debug, Parser)]
#[command(name = "fisctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Deployment configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true, env = "FISDEMO_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, env = "FISDEMO_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build and validate the descriptor.
    Validate(validate::ValidateCommand),

    /// Print the provisioning template.
    Synth(synth::SynthCommand),

    /// Show resources in creation order with their references.
    Graph(graph::GraphCommand),

    /// Show pool capacity against the service's scaling bounds.
    Capacity(capacity::CapacityCommand),

    /// Run the CPU target-tracking policy against a constant load.
    SimulateScaling(simulate::SimulateScalingCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub fn run(self) -> Result<()> {
        init_tracing(&self.log_level, self.log_json);

        if let Commands::Version = self.command {
            println!("fisctl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let config = load_config(self.config.as_deref())?;
        let ctx = CommandContext {
            config,
            format: OutputFormat::from_flag(&self.format),
        };

        match self.command {
            Commands::Validate(cmd) => cmd.run(ctx),
            Commands::Synth(cmd) => cmd.run(ctx),
            Commands::Graph(cmd) => cmd.run(ctx),
            Commands::Capacity(cmd) => cmd.run(ctx),
            Commands::SimulateScaling(cmd) => cmd.run(ctx),
            Commands::Version => Ok(()),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: DeploymentConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Build the descriptor from the loaded configuration.
    pub fn deployment(&self) -> Result<Deployment> {
        Ok(Deployment::build(&self.config)?)
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<DeploymentConfig> {
    if let Some(path) = path {
        debug!(path = %path.display(), "Using configuration file");
    }
    let config = DeploymentConfig::load(path)?;
    debug!(prefix = %config.prefix, "Configuration loaded");
    Ok(config)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
