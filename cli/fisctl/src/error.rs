//! Error handling and display for the CLI.

use std::path::PathBuf;

use colored::Colorize;
use fisdemo_descriptor::{ConfigError, DescriptorError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        print_config_hint(config_err);
        return;
    }

    if let Some(descriptor_err) = err.downcast_ref::<DescriptorError>() {
        match descriptor_err {
            DescriptorError::InvalidResource {
                resource, chain, ..
            } => {
                eprintln!("\nResource: {}", resource);
                eprintln!("Reference chain: {}", chain);
            }
            DescriptorError::Config(config_err) => print_config_hint(config_err),
            DescriptorError::Cycle(_) | DescriptorError::DanglingReference { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `fisctl graph` on a known-good configuration to compare."
                        .yellow()
                );
            }
            _ => {}
        }
        return;
    }

    if let Some(CliError::Write { .. }) = err.downcast_ref::<CliError>() {
        eprintln!(
            "\n{}",
            "Hint: Check that the output directory exists and is writable.".yellow()
        );
    }
}

fn print_config_hint(err: &ConfigError) {
    let hint = match err {
        ConfigError::Load(_) => {
            "Hint: Check the TOML file and any FISDEMO_* environment variables."
        }
        ConfigError::Validation(_) => {
            "Hint: Fix the field above, then run `fisctl validate`."
        }
    };
    eprintln!("\n{}", hint.yellow());
}
