//! fisctl - operator CLI for the fault-injection demo deployment.
//!
//! Builds the deployment descriptor from layered configuration and prints
//! the provisioning template, resource graph, capacity report or a scaling
//! simulation. Everything runs offline.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
