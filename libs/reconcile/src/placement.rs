//! Spread-across-instances placement model.
//!
//! Mirrors how the orchestrator's spread strategy distributes task replicas
//! over a fixed node pool: every replica goes to the eligible node currently
//! running the fewest tasks. A node is eligible while it has memory left for
//! one more task and, when the task maps a static host port, that port is
//! still free on the node.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Placement errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// The pool has no nodes.
    #[error("no nodes available for placement")]
    NoNodes,

    /// A replica could not be placed on any node.
    #[error("task {task_index} is unschedulable: {reason}")]
    Unschedulable { task_index: u32, reason: String },
}

/// Capacity of one node as seen by the placement model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSlot {
    /// Node name (deterministic, e.g. `node-1`).
    pub name: String,

    /// Memory available to tasks, in MiB.
    pub memory_mib: u32,
}

impl NodeSlot {
    pub fn new(name: impl Into<String>, memory_mib: u32) -> Self {
        Self {
            name: name.into(),
            memory_mib,
        }
    }
}

/// What a single task replica needs from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDemand {
    /// Hard memory limit, in MiB.
    pub memory_mib: u32,

    /// Static host port bound by the task, if any.
    pub host_port: Option<u16>,
}

/// One replica bound to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub task_index: u32,
    pub node: String,
}

/// Per-node running state during placement.
#[derive(Debug, Default, Clone)]
struct NodeLoad {
    tasks: u32,
    memory_used_mib: u32,
    port_taken: bool,
}

/// Maximum number of replicas of `demand` one node can hold.
///
/// A static host port caps density at one task per node.
pub fn tasks_per_node(node_memory_mib: u32, demand: &TaskDemand) -> u32 {
    if demand.memory_mib == 0 {
        return if demand.host_port.is_some() { 1 } else { u32::MAX };
    }
    let by_memory = node_memory_mib / demand.memory_mib;
    match demand.host_port {
        Some(_) => by_memory.min(1),
        None => by_memory,
    }
}

/// Place `count` replicas of `demand` across `nodes`.
///
/// Returns one [`Assignment`] per replica in replica order.
pub fn spread_across_instances(
    nodes: &[NodeSlot],
    demand: &TaskDemand,
    count: u32,
) -> Result<Vec<Assignment>, PlacementError> {
    if nodes.is_empty() {
        return Err(PlacementError::NoNodes);
    }

    let mut loads = vec![NodeLoad::default(); nodes.len()];
    let mut assignments = Vec::with_capacity(count as usize);

    for task_index in 0..count {
        let candidate = nodes
            .iter()
            .zip(loads.iter())
            .enumerate()
            .filter(|(_, (node, load))| {
                let fits_memory =
                    node.memory_mib.saturating_sub(load.memory_used_mib) >= demand.memory_mib;
                let port_free = demand.host_port.is_none() || !load.port_taken;
                fits_memory && port_free
            })
            .min_by_key(|(idx, (_, load))| (load.tasks, *idx))
            .map(|(idx, _)| idx);

        let Some(idx) = candidate else {
            let reason = match demand.host_port {
                Some(port) => format!(
                    "all {} nodes are out of memory or already bind host port {}",
                    nodes.len(),
                    port
                ),
                None => format!("all {} nodes are out of memory", nodes.len()),
            };
            return Err(PlacementError::Unschedulable { task_index, reason });
        };

        let load = &mut loads[idx];
        load.tasks += 1;
        load.memory_used_mib += demand.memory_mib;
        load.port_taken |= demand.host_port.is_some();

        assignments.push(Assignment {
            task_index,
            node: nodes[idx].name.clone(),
        });
    }

    Ok(assignments)
}

/// Count assignments per node name.
pub fn tasks_by_node(assignments: &[Assignment]) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for a in assignments {
        *counts.entry(a.node.as_str()).or_insert(0) += 1;
    }
    counts
}
