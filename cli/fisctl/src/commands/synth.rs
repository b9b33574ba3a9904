//! Synth command (print or write the provisioning template).

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Synthesize the provisioning template.
#[derive(Debug, Args)]
pub struct SynthCommand {
    /// Write the template to PATH instead of stdout.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Emit compact JSON.
    #[arg(long)]
    compact: bool,
}

impl SynthCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let deployment = ctx.deployment()?;
        let template = deployment.template();
        let rendered = if self.compact {
            serde_json::to_string(&template)?
        } else {
            serde_json::to_string_pretty(&template)?
        };
        let fingerprint = deployment.fingerprint();

        let Some(path) = self.out else {
            println!("{}", rendered);
            return Ok(());
        };

        std::fs::write(&path, format!("{rendered}\n")).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), fingerprint = %fingerprint, "Template written");

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "path": path.display().to_string(),
                "fingerprint": fingerprint.as_str(),
            })),
            OutputFormat::Table => {
                print_success(&format!("Wrote template to {}", path.display()));
                print_info(&format!("fingerprint: {}", fingerprint));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisdemo_descriptor::DeploymentConfig;

    #[test]
    fn writes_template_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        let cmd = SynthCommand {
            out: Some(path.clone()),
            compact: false,
        };
        let ctx = CommandContext {
            config: DeploymentConfig::default(),
            format: OutputFormat::Json,
        };
        cmd.run(ctx).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written["Resources"]["FISDemo-VPC"].is_object());
        assert!(written["Outputs"]["LoadBalancerDNS"].is_object());
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = SynthCommand {
            out: Some(dir.path().join("missing").join("template.json")),
            compact: true,
        };
        let ctx = CommandContext {
            config: DeploymentConfig::default(),
            format: OutputFormat::Table,
        };
        let err = cmd.run(ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Write { .. })
        ));
    }
}
