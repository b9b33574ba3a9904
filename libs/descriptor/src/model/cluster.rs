//! Cluster and its fixed-size capacity pool.
//!
//! The pool launches container-optimized nodes from a launch template. Each
//! node runs under an instance role that lets its container agent join the
//! cluster, and sits behind a node security group that only admits traffic
//! from the load balancer.

use fisdemo_id::{
    CapacityPoolId, ClusterId, InstanceProfileId, InstanceRoleId, LaunchTemplateId, NetworkId,
    NodeIngressId, NodeSecurityGroupId, ResourcePrefix, SecurityGroupId, SubnetId,
};
use fisdemo_reconcile::NodeSlot;
use serde::Serialize;

use crate::error::{DescriptorError, DescriptorResult};
use crate::settings::CapacityConfig;

use super::{ManagedPolicyRef, Network, TrustPolicy};

/// Service principal of the compute service, assumed by nodes.
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Managed policy for the container agent on each node.
pub const ECS_INSTANCE_POLICY: &str = "service-role/AmazonEC2ContainerServiceforEC2Role";

/// Parameter holding the current container-optimized machine image.
pub const ECS_OPTIMIZED_AMI_PARAMETER: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id";

/// Agent configuration file the user data writes the cluster name into.
pub const ECS_AGENT_CONFIG_PATH: &str = "/etc/ecs/ecs.config";

/// Host ports the container agent hands out for dynamic port mappings.
pub const EPHEMERAL_HOST_PORTS: (u16, u16) = (32768, 65535);

/// Compute shape of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstanceType {
    pub name: &'static str,
    pub vcpus: u32,
    pub memory_mib: u32,
}

/// Instance types the descriptor knows the shape of.
const INSTANCE_TYPES: &[InstanceType] = &[
    InstanceType::new("t2.micro", 1, 1024),
    InstanceType::new("t2.small", 1, 2048),
    InstanceType::new("t2.medium", 2, 4096),
    InstanceType::new("t2.large", 2, 8192),
    InstanceType::new("t3.micro", 2, 1024),
    InstanceType::new("t3.small", 2, 2048),
    InstanceType::new("t3.medium", 2, 4096),
    InstanceType::new("t3.large", 2, 8192),
    InstanceType::new("m5.large", 2, 8192),
    InstanceType::new("m5.xlarge", 4, 16384),
];

impl InstanceType {
    const fn new(name: &'static str, vcpus: u32, memory_mib: u32) -> Self {
        Self {
            name,
            vcpus,
            memory_mib,
        }
    }

    /// Look up a known instance type by name.
    pub fn lookup(name: &str) -> Option<Self> {
        INSTANCE_TYPES.iter().copied().find(|t| t.name == name)
    }

    /// All known instance type names.
    pub fn known() -> impl Iterator<Item = &'static str> {
        INSTANCE_TYPES.iter().map(|t| t.name)
    }
}

/// Logical grouping of compute nodes for scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub network: NetworkId,
    /// Container Insights telemetry. Disabled.
    pub container_insights: bool,
}

impl Cluster {
    pub fn build(prefix: &ResourcePrefix, network: &Network) -> Self {
        let id = ClusterId::new(prefix);
        Self {
            name: id.to_string(),
            id,
            network: network.id.clone(),
            container_insights: false,
        }
    }
}

/// Identity every node runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRole {
    pub id: InstanceRoleId,
    pub trust: TrustPolicy,
    pub managed_policies: Vec<ManagedPolicyRef>,
}

/// Wrapper that hands the instance role to launched nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceProfile {
    pub id: InstanceProfileId,
    pub role: InstanceRoleId,
}

/// Node ingress admitted from another security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeIngress {
    pub id: NodeIngressId,
    pub source: SecurityGroupId,
    pub from_port: u16,
    pub to_port: u16,
}

/// Security group of the nodes. Closed until [`CapacityPool::allow_from`]
/// opens the task host ports to a source group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSecurityGroup {
    pub id: NodeSecurityGroupId,
    pub network: NetworkId,
    pub ingress: Option<NodeIngress>,
}

/// How nodes are launched: image, profile, security group, and the user
/// data that registers the node's container agent with the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchTemplate {
    pub id: LaunchTemplateId,
    pub cluster: ClusterId,
    /// Resolved by the provisioning engine at deploy time.
    pub image_parameter: &'static str,
    pub instance_profile: InstanceProfileId,
    pub security_group: NodeSecurityGroupId,
}

impl LaunchTemplate {
    /// `resolve` reference to the machine image parameter.
    pub fn image_id(&self) -> String {
        format!("{{{{resolve:ssm:{}}}}}", self.image_parameter)
    }
}

/// Fixed-size set of nodes backing the cluster.
///
/// `node_min == node_max`: the pool never scales at runtime. Only the
/// service scales, within whatever the pool can host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityPool {
    pub id: CapacityPoolId,
    pub cluster: ClusterId,
    pub instance_type: InstanceType,
    pub node_min: u32,
    pub node_max: u32,
    pub subnets: Vec<SubnetId>,
    pub launch_template: LaunchTemplate,
    pub instance_role: InstanceRole,
    pub instance_profile: InstanceProfile,
    pub security_group: NodeSecurityGroup,
}

impl CapacityPool {
    pub fn build(
        prefix: &ResourcePrefix,
        cluster: &Cluster,
        network: &Network,
        config: &CapacityConfig,
    ) -> DescriptorResult<Self> {
        let id = CapacityPoolId::new(prefix);
        let chain = [cluster.id.to_string(), id.to_string()];

        let Some(instance_type) = InstanceType::lookup(&config.instance_type) else {
            return Err(DescriptorError::invalid(
                chain,
                format!(
                    "unknown instance type '{}' (known: {})",
                    config.instance_type,
                    InstanceType::known().collect::<Vec<_>>().join(", ")
                ),
            ));
        };
        if config.node_count == 0 {
            return Err(DescriptorError::invalid(chain, "node_count must be at least 1"));
        }

        let instance_role = InstanceRole {
            id: InstanceRoleId::new(prefix),
            trust: TrustPolicy::for_service(EC2_SERVICE_PRINCIPAL),
            managed_policies: vec![ManagedPolicyRef::aws_managed(ECS_INSTANCE_POLICY)],
        };
        let instance_profile = InstanceProfile {
            id: InstanceProfileId::new(prefix),
            role: instance_role.id.clone(),
        };
        let security_group = NodeSecurityGroup {
            id: NodeSecurityGroupId::new(prefix),
            network: network.id.clone(),
            ingress: None,
        };
        let launch_template = LaunchTemplate {
            id: LaunchTemplateId::new(prefix),
            cluster: cluster.id.clone(),
            image_parameter: ECS_OPTIMIZED_AMI_PARAMETER,
            instance_profile: instance_profile.id.clone(),
            security_group: security_group.id.clone(),
        };

        Ok(Self {
            id,
            cluster: cluster.id.clone(),
            instance_type,
            node_min: config.node_count,
            node_max: config.node_count,
            subnets: network.subnet_ids(),
            launch_template,
            instance_role,
            instance_profile,
            security_group,
        })
    }

    /// Open the host ports `from_port..=to_port` on every node to `source`.
    ///
    /// The node group admits a single source.
    pub fn allow_from(
        &mut self,
        prefix: &ResourcePrefix,
        source: &SecurityGroupId,
        (from_port, to_port): (u16, u16),
    ) -> DescriptorResult<()> {
        let id = NodeIngressId::new(prefix);
        let chain = [
            self.id.to_string(),
            self.security_group.id.to_string(),
            id.to_string(),
        ];
        if from_port == 0 || from_port > to_port {
            return Err(DescriptorError::invalid(
                chain,
                format!("invalid host port range {from_port}-{to_port}"),
            ));
        }
        if let Some(existing) = &self.security_group.ingress {
            return Err(DescriptorError::invalid(
                chain,
                format!("{} already admits {}", self.security_group.id, existing.source),
            ));
        }

        self.security_group.ingress = Some(NodeIngress {
            id,
            source: source.clone(),
            from_port,
            to_port,
        });
        Ok(())
    }

    /// Number of nodes in the pool.
    pub fn node_count(&self) -> u32 {
        self.node_max
    }

    pub fn is_fixed_size(&self) -> bool {
        self.node_min == self.node_max
    }

    /// Nodes as seen by the placement model, named `node-1..node-N`.
    pub fn node_slots(&self) -> Vec<NodeSlot> {
        (1..=self.node_count())
            .map(|i| NodeSlot::new(format!("node-{i}"), self.instance_type.memory_mib))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NetworkConfig;

    fn fixture() -> (ResourcePrefix, Network, Cluster) {
        let prefix = ResourcePrefix::parse("FISDemo").unwrap();
        let network = Network::build(&prefix, &NetworkConfig::default()).unwrap();
        let cluster = Cluster::build(&prefix, &network);
        (prefix, network, cluster)
    }

    #[test]
    fn test_cluster_binds_network_without_insights() {
        let (_, network, cluster) = fixture();
        assert_eq!(cluster.name, "FISDemo-Cluster");
        assert_eq!(cluster.network, network.id);
        assert!(!cluster.container_insights);
    }

    #[test]
    fn test_pool_is_fixed_size() {
        let (prefix, network, cluster) = fixture();
        let pool =
            CapacityPool::build(&prefix, &cluster, &network, &CapacityConfig::default()).unwrap();

        assert!(pool.is_fixed_size());
        assert_eq!(pool.node_min, 2);
        assert_eq!(pool.node_max, 2);
        assert_eq!(pool.instance_type.memory_mib, 1024);
        assert_eq!(pool.subnets.len(), 3);

        let names: Vec<_> = pool.node_slots().into_iter().map(|n| n.name).collect();
        assert_eq!(names, ["node-1", "node-2"]);
    }

    #[test]
    fn test_nodes_join_cluster_through_launch_template() {
        let (prefix, network, cluster) = fixture();
        let pool =
            CapacityPool::build(&prefix, &cluster, &network, &CapacityConfig::default()).unwrap();

        let lt = &pool.launch_template;
        assert_eq!(lt.cluster, cluster.id);
        assert_eq!(
            lt.image_id(),
            "{{resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id}}"
        );
        assert_eq!(lt.instance_profile, pool.instance_profile.id);
        assert_eq!(lt.security_group, pool.security_group.id);

        assert_eq!(pool.instance_profile.role, pool.instance_role.id);
        assert!(pool.instance_role.trust.permits("ec2.amazonaws.com"));
        assert!(!pool.instance_role.trust.permits("fis.amazonaws.com"));
        let policies: Vec<_> = pool
            .instance_role
            .managed_policies
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(policies, [ECS_INSTANCE_POLICY]);
        assert!(pool.security_group.ingress.is_none());
    }

    #[test]
    fn test_allow_from_admits_one_source() {
        let (prefix, network, cluster) = fixture();
        let mut pool =
            CapacityPool::build(&prefix, &cluster, &network, &CapacityConfig::default()).unwrap();
        let lb_sg = SecurityGroupId::new(&prefix);

        pool.allow_from(&prefix, &lb_sg, (8080, 8080)).unwrap();
        let ingress = pool.security_group.ingress.as_ref().unwrap();
        assert_eq!(ingress.id.as_str(), "FISDemo-InstanceIngressFromLB");
        assert_eq!(ingress.source, lb_sg);
        assert_eq!((ingress.from_port, ingress.to_port), (8080, 8080));

        let err = pool.allow_from(&prefix, &lb_sg, (80, 80)).unwrap_err();
        let (resource, chain) = err.failing_resource().unwrap();
        assert_eq!(resource, "FISDemo-InstanceIngressFromLB");
        assert_eq!(
            chain.to_string(),
            "FISDemo-asg -> FISDemo-InstanceSecurityGroup -> FISDemo-InstanceIngressFromLB"
        );
    }

    #[test]
    fn test_allow_from_rejects_inverted_range() {
        let (prefix, network, cluster) = fixture();
        let mut pool =
            CapacityPool::build(&prefix, &cluster, &network, &CapacityConfig::default()).unwrap();
        let lb_sg = SecurityGroupId::new(&prefix);

        assert!(pool.allow_from(&prefix, &lb_sg, (9000, 8000)).is_err());
        assert!(pool.allow_from(&prefix, &lb_sg, (0, 8080)).is_err());
        assert!(pool.security_group.ingress.is_none());
    }

    #[test]
    fn test_unknown_instance_type() {
        let (prefix, network, cluster) = fixture();
        let config = CapacityConfig {
            instance_type: "z9.gigantic".to_string(),
            node_count: 2,
        };

        let err = CapacityPool::build(&prefix, &cluster, &network, &config).unwrap_err();
        let (resource, chain) = err.failing_resource().unwrap();
        assert_eq!(resource, "FISDemo-asg");
        assert_eq!(chain.to_string(), "FISDemo-Cluster -> FISDemo-asg");
    }
}
