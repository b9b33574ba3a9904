//! Graph command.

use anyhow::Result;
use clap::Args;
use fisdemo_descriptor::{Deployment, Edge};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::CommandContext;

/// Show resources in creation order.
#[derive(Debug, Args)]
pub struct GraphCommand {}

#[derive(Debug, Serialize, Tabled)]
struct GraphRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Logical ID")]
    id: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "References")]
    references: String,
}

#[derive(Debug, Serialize)]
struct GraphView<'a> {
    order: Vec<String>,
    edges: Vec<&'a Edge>,
}

fn rows(deployment: &Deployment) -> Result<Vec<GraphRow>> {
    let graph = deployment.graph();
    let order = graph.topological_order()?;
    Ok(order
        .into_iter()
        .enumerate()
        .map(|(idx, id)| {
            let references = graph
                .edges()
                .filter(|e| e.from == id)
                .map(|e| format!("{} ({})", e.to, e.kind))
                .collect::<Vec<_>>()
                .join(", ");
            GraphRow {
                step: idx + 1,
                kind: graph
                    .kind_of(&id)
                    .map(|k| k.provider_type().to_string())
                    .unwrap_or_default(),
                id,
                references,
            }
        })
        .collect())
}

impl GraphCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let deployment = ctx.deployment()?;
        match ctx.format {
            OutputFormat::Json => {
                let view = GraphView {
                    order: deployment.graph().topological_order()?,
                    edges: deployment.graph().edges().collect(),
                };
                print_single(&view);
            }
            OutputFormat::Table => print_output(&rows(&deployment)?, OutputFormat::Table),
        }
        Ok(())
    }
}
