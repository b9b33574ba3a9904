//! Exposure: load balancer, listeners, target group, and the security group
//! that opens listener ports.

use std::time::Duration;

use fisdemo_id::{
    ListenerId, LoadBalancerId, NetworkId, ResourcePrefix, SecurityGroupId, SubnetId,
    TargetGroupId,
};
use serde::Serialize;

use crate::error::{DescriptorError, DescriptorResult};
use crate::settings::{ExposureConfig, HealthCheckConfig, LoadBalancingAlgorithm};

use super::{Network, TaskSpec};

/// Target health check. `timeout < interval` always holds and the path is
/// absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub path: String,
    #[serde(serialize_with = "super::secs")]
    pub timeout: Duration,
    #[serde(serialize_with = "super::secs")]
    pub interval: Duration,
}

impl HealthCheck {
    /// Build a health check, rejecting `timeout >= interval` and relative
    /// paths.
    pub fn new(
        path: impl Into<String>,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, String> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(format!("health check path '{path}' must start with '/'"));
        }
        if timeout >= interval {
            return Err(format!(
                "health check timeout {}s must be less than interval {}s",
                timeout.as_secs(),
                interval.as_secs()
            ));
        }
        Ok(Self {
            path,
            timeout,
            interval,
        })
    }
}

/// Instances registered behind the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    pub id: TargetGroupId,
    pub network: NetworkId,
    /// Port traffic is sent to on each node (the task's host port).
    pub port: u16,
    pub protocol: &'static str,
    pub health_check: HealthCheck,
    pub algorithm: LoadBalancingAlgorithm,
}

/// Port-bound forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub id: ListenerId,
    pub port: u16,
    /// Reachable from `0.0.0.0/0`.
    pub open: bool,
    pub target_group: TargetGroupId,
}

/// Ingress rules for the load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub id: SecurityGroupId,
    pub network: NetworkId,
    pub open_ports: Vec<u16>,
}

/// Public entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancer {
    pub id: LoadBalancerId,
    pub network: NetworkId,
    pub subnets: Vec<SubnetId>,
    pub internet_facing: bool,
    pub security_group: SecurityGroup,
    pub listeners: Vec<Listener>,
}

impl LoadBalancer {
    pub fn build(
        prefix: &ResourcePrefix,
        network: &Network,
        config: &ExposureConfig,
    ) -> DescriptorResult<Self> {
        let id = LoadBalancerId::new(prefix);
        let subnets: Vec<_> = if config.internet_facing {
            network.public_subnets().map(|s| s.id.clone()).collect()
        } else {
            network.subnet_ids()
        };
        if subnets.is_empty() {
            return Err(DescriptorError::invalid(
                [network.id.to_string(), id.to_string()],
                "an internet-facing load balancer needs at least one public subnet",
            ));
        }

        Ok(Self {
            id,
            network: network.id.clone(),
            subnets,
            internet_facing: config.internet_facing,
            security_group: SecurityGroup {
                id: SecurityGroupId::new(prefix),
                network: network.id.clone(),
                open_ports: Vec::new(),
            },
            listeners: Vec::new(),
        })
    }

    /// Add a listener. Ports are unique per load balancer.
    pub fn add_listener(&mut self, listener: Listener) -> DescriptorResult<()> {
        let chain = [self.id.to_string(), listener.id.to_string()];
        if let Some(existing) = self.listeners.iter().find(|l| l.port == listener.port) {
            return Err(DescriptorError::invalid(
                chain,
                format!("port {} is already bound by {}", listener.port, existing.id),
            ));
        }
        if self.listeners.iter().any(|l| l.id == listener.id) {
            return Err(DescriptorError::DuplicateResource(listener.id.to_string()));
        }

        if listener.open && !self.security_group.open_ports.contains(&listener.port) {
            self.security_group.open_ports.push(listener.port);
            self.security_group.open_ports.sort_unstable();
        }
        self.listeners.push(listener);
        Ok(())
    }

    /// Next free listener ID.
    pub fn next_listener_id(&self, prefix: &ResourcePrefix) -> DescriptorResult<ListenerId> {
        Ok(ListenerId::new(prefix, self.listeners.len() as u32 + 1)?)
    }
}

/// Build the target group that `listener` on `load_balancer` forwards to,
/// fronting `task_spec`'s target container.
pub fn build_target_group(
    prefix: &ResourcePrefix,
    load_balancer: &LoadBalancer,
    listener: &ListenerId,
    task_spec: &TaskSpec,
    exposure: &ExposureConfig,
    health: &HealthCheckConfig,
) -> DescriptorResult<TargetGroup> {
    let id = TargetGroupId::new(prefix);
    let chain = || {
        [
            load_balancer.id.as_str(),
            listener.as_str(),
            id.as_str(),
        ]
    };

    let health_check = HealthCheck::new(
        health.path.clone(),
        Duration::from_secs(health.timeout_secs),
        Duration::from_secs(health.interval_secs),
    )
    .map_err(|reason| DescriptorError::invalid(chain(), reason))?;

    let container = task_spec.container(&exposure.target_container)?;
    let Some(mapping) = container
        .port_mappings
        .iter()
        .find(|m| m.container_port == exposure.target_container_port)
    else {
        return Err(DescriptorError::invalid(
            chain(),
            format!(
                "container '{}' does not map port {}",
                container.name, exposure.target_container_port
            ),
        ));
    };

    // Dynamic host ports are registered per task; the group port is then only
    // a default.
    let port = mapping.static_host_port().unwrap_or(mapping.container_port);

    Ok(TargetGroup {
        network: load_balancer.network.clone(),
        port,
        protocol: "HTTP",
        health_check,
        algorithm: exposure.algorithm,
        id,
    })
}
