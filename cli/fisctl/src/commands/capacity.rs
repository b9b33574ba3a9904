//! Capacity command.

use anyhow::Result;
use clap::Args;
use fisdemo_descriptor::{CapacityReport, Deployment};
use fisdemo_reconcile::{tasks_by_node, Assignment};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, print_success, print_warning, OutputFormat};

use super::CommandContext;

/// Show how the fixed pool relates to the service's scaling bounds.
#[derive(Debug, Args)]
pub struct CapacityCommand {}

#[derive(Debug, Serialize, Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize, Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Tasks")]
    tasks: u32,
}

#[derive(Debug, Serialize)]
struct CapacityView {
    report: CapacityReport,
    placement: Vec<Assignment>,
}

fn field_rows(report: &CapacityReport) -> Vec<FieldRow> {
    let row = |field, value: String| FieldRow { field, value };
    vec![
        row("Instance type", report.instance_type.clone()),
        row("Nodes (fixed)", report.node_count.to_string()),
        row("Node memory (MiB)", report.node_memory_mib.to_string()),
        row("Task memory (MiB)", report.task_memory_mib.to_string()),
        row(
            "Static host port",
            report
                .static_host_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "dynamic".to_string()),
        ),
        row("Tasks per node", report.tasks_per_node.to_string()),
        row("Task capacity", report.task_capacity.to_string()),
        row("Desired", report.desired_count.to_string()),
        row(
            "Scaling bounds",
            format!("{}..={}", report.min_capacity, report.max_capacity),
        ),
    ]
}

fn node_rows(deployment: &Deployment, placement: &[Assignment]) -> Vec<NodeRow> {
    let counts = tasks_by_node(placement);
    deployment
        .capacity
        .node_slots()
        .into_iter()
        .map(|slot| NodeRow {
            tasks: counts.get(slot.name.as_str()).copied().unwrap_or(0),
            node: slot.name,
        })
        .collect()
}

impl CapacityCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let deployment = ctx.deployment()?;
        let report = deployment.capacity_report();
        let placement = deployment.initial_placement()?;

        match ctx.format {
            OutputFormat::Json => print_single(&CapacityView { report, placement }),
            OutputFormat::Table => {
                print_output(&field_rows(&report), OutputFormat::Table);
                print_output(&node_rows(&deployment, &placement), OutputFormat::Table);
                if report.advisories.is_empty() {
                    print_success("Pool can host the service at max capacity");
                }
                for advisory in &report.advisories {
                    print_warning(advisory);
                }
            }
        }
        Ok(())
    }
}
