//! Workload: task definition, service, and service auto-scaling.

use std::time::Duration;

use fisdemo_id::{
    ClusterId, ResourcePrefix, ScalingPolicyId, ScalingTargetId, ServiceId, TargetGroupId,
    TaskSpecId,
};
use fisdemo_reconcile::{ScalingBounds, TargetTracking, TaskDemand};
use serde::Serialize;

use crate::error::{DescriptorError, DescriptorResult};
use crate::settings::{Protocol, ScalingConfig, TaskConfig};

use super::Cluster;

/// Container port to host port translation. A host port of `0` is dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Static host port, if one is bound.
    pub fn static_host_port(&self) -> Option<u16> {
        (self.host_port != 0).then_some(self.host_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    pub memory_limit_mib: u32,
    pub port_mappings: Vec<PortMapping>,
}

/// Immutable description of one runnable unit. Changes produce a new
/// revision; nothing mutates a registered task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub id: TaskSpecId,
    pub network_mode: &'static str,
    pub containers: Vec<ContainerDefinition>,
}

impl TaskSpec {
    pub fn build(prefix: &ResourcePrefix, config: &TaskConfig) -> DescriptorResult<Self> {
        let id = TaskSpecId::new(prefix);

        if config.host_port != 0 && config.protocol == Protocol::Udp {
            return Err(DescriptorError::invalid(
                [id.to_string()],
                "load-balanced containers must map a tcp port",
            ));
        }

        let container = ContainerDefinition {
            name: config.container_name.clone(),
            image: config.image.clone(),
            memory_limit_mib: config.memory_limit_mib,
            port_mappings: vec![PortMapping {
                container_port: config.container_port,
                host_port: config.host_port,
                protocol: config.protocol,
            }],
        };

        Ok(Self {
            id,
            network_mode: "bridge",
            containers: vec![container],
        })
    }

    /// Resolve a container by name. Exactly one container must match.
    pub fn container(&self, name: &str) -> DescriptorResult<&ContainerDefinition> {
        let mut matches = self.containers.iter().filter(|c| c.name == name);
        match (matches.next(), matches.next()) {
            (Some(container), None) => Ok(container),
            (None, _) => Err(DescriptorError::invalid(
                [self.id.to_string()],
                format!("no container named '{name}'"),
            )),
            (Some(_), Some(_)) => Err(DescriptorError::invalid(
                [self.id.to_string()],
                format!("container name '{name}' is ambiguous"),
            )),
        }
    }

    /// Per-replica resource demand used by the placement model.
    pub fn demand(&self) -> TaskDemand {
        let memory_mib = self.containers.iter().map(|c| c.memory_limit_mib).sum();
        let host_port = self
            .containers
            .iter()
            .flat_map(|c| c.port_mappings.iter())
            .find_map(PortMapping::static_host_port);
        TaskDemand {
            memory_mib,
            host_port,
        }
    }
}

/// How replicas are distributed over nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// One replica per node before any node gets a second.
    #[default]
    SpreadAcrossInstances,
}

impl PlacementStrategy {
    /// Provider (type, field) pair.
    pub fn provider_form(&self) -> (&'static str, &'static str) {
        match self {
            Self::SpreadAcrossInstances => ("spread", "instanceId"),
        }
    }
}

/// Scalable target registration for the service's desired count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingTarget {
    pub id: ScalingTargetId,
    pub min_capacity: u32,
    pub max_capacity: u32,
}

/// CPU target-tracking policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuScalingPolicy {
    pub id: ScalingPolicyId,
    pub target_utilization_percent: u32,
    #[serde(serialize_with = "super::secs")]
    pub scale_in_cooldown: Duration,
    #[serde(serialize_with = "super::secs")]
    pub scale_out_cooldown: Duration,
}

impl CpuScalingPolicy {
    /// The policy as a target-tracking model.
    pub fn tracking(&self) -> DescriptorResult<TargetTracking> {
        TargetTracking::new(
            f64::from(self.target_utilization_percent),
            self.scale_in_cooldown,
            self.scale_out_cooldown,
        )
        .map_err(|e| DescriptorError::invalid([self.id.to_string()], e.to_string()))
    }
}

/// Load-balancer registration of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRegistration {
    pub target_group: TargetGroupId,
    pub container_name: String,
    pub container_port: u16,
}

/// Running, auto-scaled set of task replicas on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub id: ServiceId,
    pub cluster: ClusterId,
    pub task_spec: TaskSpecId,
    pub desired_count: u32,
    pub placement: PlacementStrategy,
    pub scaling_target: ScalingTarget,
    pub scaling_policy: CpuScalingPolicy,
    pub load_balancer: Option<TargetRegistration>,
}

impl Service {
    /// Build the service. The desired count starts at `min_capacity`.
    pub fn build(
        prefix: &ResourcePrefix,
        cluster: &Cluster,
        task_spec: &TaskSpec,
        config: &ScalingConfig,
    ) -> DescriptorResult<Self> {
        let id = ServiceId::new(prefix);
        let chain = [cluster.id.to_string(), id.to_string()];

        if config.min_capacity > config.max_capacity {
            return Err(DescriptorError::invalid(
                chain,
                format!(
                    "min_capacity {} exceeds max_capacity {}",
                    config.min_capacity, config.max_capacity
                ),
            ));
        }

        let service = Self {
            cluster: cluster.id.clone(),
            task_spec: task_spec.id.clone(),
            desired_count: config.min_capacity,
            placement: PlacementStrategy::SpreadAcrossInstances,
            scaling_target: ScalingTarget {
                id: ScalingTargetId::new(prefix),
                min_capacity: config.min_capacity,
                max_capacity: config.max_capacity,
            },
            scaling_policy: CpuScalingPolicy {
                id: ScalingPolicyId::new(prefix),
                target_utilization_percent: config.target_utilization_percent,
                scale_in_cooldown: Duration::from_secs(config.scale_in_cooldown_secs),
                scale_out_cooldown: Duration::from_secs(config.scale_out_cooldown_secs),
            },
            load_balancer: None,
            id,
        };
        service.scaling_policy.tracking()?;
        Ok(service)
    }

    /// Scaling bounds of the service.
    pub fn bounds(&self) -> DescriptorResult<ScalingBounds> {
        ScalingBounds::new(
            self.scaling_target.min_capacity,
            self.scaling_target.max_capacity,
        )
        .map_err(|e| DescriptorError::invalid([self.id.to_string()], e.to_string()))
    }

    /// Register the service behind a target group, on the named container.
    pub fn register_target(
        &mut self,
        task_spec: &TaskSpec,
        target_group: &TargetGroupId,
        container_name: &str,
        container_port: u16,
    ) -> DescriptorResult<()> {
        let chain = [
            self.id.to_string(),
            task_spec.id.to_string(),
            format!("{container_name}:{container_port}"),
        ];
        let container = task_spec.container(container_name).map_err(|e| match e {
            DescriptorError::InvalidResource { reason, .. } => {
                DescriptorError::invalid(chain.clone(), reason)
            }
            other => other,
        })?;
        if !container
            .port_mappings
            .iter()
            .any(|m| m.container_port == container_port)
        {
            return Err(DescriptorError::invalid(
                chain,
                format!("container '{container_name}' does not map port {container_port}"),
            ));
        }

        self.load_balancer = Some(TargetRegistration {
            target_group: target_group.clone(),
            container_name: container_name.to_string(),
            container_port,
        });
        Ok(())
    }
}
