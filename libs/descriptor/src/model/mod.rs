//! Resource model of the deployment.
//!
//! One module per resource group, in reference order: network, cluster and
//! capacity, workload, exposure, fault-injection grant.

pub mod cluster;
pub mod exposure;
pub mod grant;
pub mod network;
pub mod workload;

pub use cluster::{
    CapacityPool, Cluster, InstanceProfile, InstanceRole, InstanceType, LaunchTemplate,
    NodeIngress, NodeSecurityGroup,
};
pub use exposure::{HealthCheck, Listener, LoadBalancer, SecurityGroup, TargetGroup};
pub use grant::{IamRole, ManagedPolicyRef, TrustPolicy};
pub use network::{InternetGateway, Network, PublicRouteTable, RouteAssociation, Subnet};
pub use workload::{
    ContainerDefinition, CpuScalingPolicy, PlacementStrategy, PortMapping, ScalingTarget, Service,
    TargetRegistration, TaskSpec,
};

/// Serialize any `Display` value as a string.
pub(crate) fn display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

/// Serialize a duration as whole seconds.
pub(crate) fn secs<S>(value: &std::time::Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(value.as_secs())
}
