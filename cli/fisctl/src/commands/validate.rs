//! Validate command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::output::{print_info, print_single, print_success, print_warning, OutputFormat};

use super::CommandContext;

/// Build the descriptor and report whether it is valid.
#[derive(Debug, Args)]
pub struct ValidateCommand {}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    valid: bool,
    prefix: String,
    resources: usize,
    fingerprint: String,
    advisories: Vec<String>,
}

impl ValidateCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let deployment = ctx.deployment()?;
        let summary = ValidationSummary {
            valid: true,
            prefix: deployment.prefix.to_string(),
            resources: deployment.graph().len(),
            fingerprint: deployment.fingerprint().to_string(),
            advisories: deployment.capacity_report().advisories,
        };

        match ctx.format {
            OutputFormat::Json => print_single(&summary),
            OutputFormat::Table => {
                print_success(&format!(
                    "Descriptor '{}' is valid ({} resources)",
                    summary.prefix, summary.resources
                ));
                print_info(&format!("fingerprint: {}", summary.fingerprint));
                for advisory in &summary.advisories {
                    print_warning(advisory);
                }
            }
        }

        Ok(())
    }
}
