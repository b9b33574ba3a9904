//! Explicit resource graph with typed reference edges.
//!
//! An edge `from -> to` means `from` embeds a reference to `to` and must be
//! created after it. The provisioning engine performs its own topological
//! resolution; the descriptor computes the same order so that it can reject
//! cycles and dangling references before emitting anything.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{DescriptorError, DescriptorResult};

/// Kind of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    InternetGateway,
    GatewayAttachment,
    RouteTable,
    Route,
    RouteTableAssociation,
    Cluster,
    InstanceRole,
    InstanceProfile,
    NodeSecurityGroup,
    NodeIngress,
    LaunchTemplate,
    CapacityPool,
    TaskSpec,
    Service,
    ScalingTarget,
    ScalingPolicy,
    LoadBalancer,
    SecurityGroup,
    Listener,
    TargetGroup,
    Role,
}

impl ResourceKind {
    /// Provider resource type name.
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Network => "AWS::EC2::VPC",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::GatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::Route => "AWS::EC2::Route",
            Self::RouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Cluster => "AWS::ECS::Cluster",
            Self::InstanceRole => "AWS::IAM::Role",
            Self::InstanceProfile => "AWS::IAM::InstanceProfile",
            Self::NodeSecurityGroup => "AWS::EC2::SecurityGroup",
            Self::NodeIngress => "AWS::EC2::SecurityGroupIngress",
            Self::LaunchTemplate => "AWS::EC2::LaunchTemplate",
            Self::CapacityPool => "AWS::AutoScaling::AutoScalingGroup",
            Self::TaskSpec => "AWS::ECS::TaskDefinition",
            Self::Service => "AWS::ECS::Service",
            Self::ScalingTarget => "AWS::ApplicationAutoScaling::ScalableTarget",
            Self::ScalingPolicy => "AWS::ApplicationAutoScaling::ScalingPolicy",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Role => "AWS::IAM::Role",
        }
    }
}

/// Why one resource references another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Lives inside the network (subnet, route table, security group, target group).
    InNetwork,
    /// Gateway attachment joining the gateway and the network.
    AttachedTo,
    /// Route entry in its route table.
    BelongsTo,
    /// Route sending traffic through the gateway.
    RoutesThrough,
    /// Subnet bound to a route table.
    Associates,
    /// Ordering only: the target must be usable before the source is created.
    Requires,
    /// Cluster bound to its network.
    BoundTo,
    /// Instance profile wrapping its role.
    Carries,
    /// Launched nodes register with the cluster.
    Joins,
    /// Launched nodes run under the instance profile.
    RunsAs,
    /// Ingress rule added to a security group.
    Opens,
    /// Ingress rule admitting traffic from a security group.
    AllowsFrom,
    /// Capacity pool launches nodes from its template.
    LaunchedFrom,
    /// Capacity pool attached to its cluster.
    CapacityFor,
    /// Nodes or load balancer interfaces placed in a subnet.
    PlacedIn,
    /// Service scheduled on the cluster.
    RunsOn,
    /// Service runs replicas of the task definition.
    Wraps,
    /// Scalable target over the service's desired count.
    Scales,
    /// Policy driving the scalable target.
    Governs,
    /// Load balancer or launched nodes guarded by a security group.
    GuardedBy,
    /// Listener bound to its load balancer.
    ListensOn,
    /// Listener default action.
    ForwardsTo,
    /// Service registers its tasks in the target group.
    RegistersWith,
    /// Service registration requires the listener to exist first.
    RoutedBy,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InNetwork => "in_network",
            Self::AttachedTo => "attached_to",
            Self::BelongsTo => "belongs_to",
            Self::RoutesThrough => "routes_through",
            Self::Associates => "associates",
            Self::Requires => "requires",
            Self::BoundTo => "bound_to",
            Self::Carries => "carries",
            Self::Joins => "joins",
            Self::RunsAs => "runs_as",
            Self::Opens => "opens",
            Self::AllowsFrom => "allows_from",
            Self::LaunchedFrom => "launched_from",
            Self::CapacityFor => "capacity_for",
            Self::PlacedIn => "placed_in",
            Self::RunsOn => "runs_on",
            Self::Wraps => "wraps",
            Self::Scales => "scales",
            Self::Governs => "governs",
            Self::GuardedBy => "guarded_by",
            Self::ListensOn => "listens_on",
            Self::ForwardsTo => "forwards_to",
            Self::RegistersWith => "registers_with",
            Self::RoutedBy => "routed_by",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed dependency: `from` references `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Directed acyclic graph of declared resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGraph {
    nodes: BTreeMap<String, ResourceKind>,
    edges: BTreeSet<Edge>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource. Logical IDs are unique.
    pub fn add_node(&mut self, id: impl Into<String>, kind: ResourceKind) -> DescriptorResult<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(DescriptorError::DuplicateResource(id));
        }
        self.nodes.insert(id, kind);
        Ok(())
    }

    /// Declare that `from` references `to`. Both must already be declared.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: EdgeKind,
    ) -> DescriptorResult<()> {
        let from = from.into();
        let to = to.into();
        for endpoint in [&from, &to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(DescriptorError::DanglingReference {
                    from: from.clone(),
                    to: endpoint.clone(),
                });
            }
        }
        self.edges.insert(Edge { from, to, kind });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind_of(&self, id: &str) -> Option<ResourceKind> {
        self.nodes.get(id).copied()
    }

    /// Resources in logical-ID order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, ResourceKind)> {
        self.nodes.iter().map(|(id, kind)| (id.as_str(), *kind))
    }

    /// Edges in (from, to, kind) order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Distinct resources `id` references, sorted.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        let deps: BTreeSet<&str> = self
            .edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect();
        deps.into_iter().collect()
    }

    /// Distinct resources referencing `id`, sorted.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        let deps: BTreeSet<&str> = self
            .edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.as_str())
            .collect();
        deps.into_iter().collect()
    }

    /// Creation order (Kahn's algorithm, ties broken by logical ID).
    ///
    /// Fails with the resources left on a cycle.
    pub fn topological_order(&self) -> DescriptorResult<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), self.dependencies(id).len()))
            .collect();

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_first() {
            pending.remove(id);
            order.push(id.to_string());
            for dependent in self.dependents(id) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if !pending.is_empty() {
            return Err(DescriptorError::Cycle(
                pending.keys().map(|id| id.to_string()).collect(),
            ));
        }
        Ok(order)
    }
}
