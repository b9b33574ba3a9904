//! The deployment descriptor: one parameterized construction of the whole
//! topology from a [`DeploymentConfig`].

use fisdemo_id::{ResourcePrefix, SubnetId};
use fisdemo_reconcile::{
    spread_across_instances, tasks_per_node, Assignment, Fingerprint, PlacementError,
    ScalingSimulator,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{DescriptorError, DescriptorResult};
use crate::graph::{EdgeKind, ResourceGraph, ResourceKind};
use crate::model::cluster::EPHEMERAL_HOST_PORTS;
use crate::model::exposure::build_target_group;
use crate::model::{
    CapacityPool, Cluster, IamRole, Listener, LoadBalancer, Network, Service, TargetGroup,
    TaskSpec,
};
use crate::settings::DeploymentConfig;
use crate::template;

/// Name of the deploy-time output carrying the load balancer URL.
pub const LOAD_BALANCER_DNS_OUTPUT: &str = "LoadBalancerDNS";

/// The fully built, validated descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub prefix: ResourcePrefix,
    pub network: Network,
    pub cluster: Cluster,
    pub capacity: CapacityPool,
    pub task_spec: TaskSpec,
    pub service: Service,
    pub load_balancer: LoadBalancer,
    pub target_group: TargetGroup,
    pub role: IamRole,
    graph: ResourceGraph,
}

/// How the fixed pool relates to the service's scaling bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityReport {
    pub instance_type: String,
    pub node_count: u32,
    pub node_memory_mib: u32,
    pub task_memory_mib: u32,
    pub static_host_port: Option<u16>,
    pub tasks_per_node: u32,
    pub task_capacity: u32,
    pub desired_count: u32,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub advisories: Vec<String>,
}

impl CapacityReport {
    /// Whether the pool can host the service at `max_capacity`.
    pub fn fits_max(&self) -> bool {
        self.max_capacity <= self.task_capacity
    }
}

impl Deployment {
    /// Build and validate the descriptor.
    ///
    /// Field-level configuration rules run first. Every later failure is an
    /// [`DescriptorError::InvalidResource`] naming the first invalid resource
    /// and its reference chain; nothing is rendered for a configuration that
    /// does not build.
    #[instrument(skip(config), fields(prefix = %config.prefix))]
    pub fn build(config: &DeploymentConfig) -> DescriptorResult<Self> {
        config.check()?;
        let prefix = ResourcePrefix::parse(&config.prefix)?;

        let network = Network::build(&prefix, &config.network)?;
        info!(
            network = %network.id,
            cidr = %network.cidr,
            subnets = network.subnets.len(),
            public_routes = network.public_routes.is_some(),
            nat_gateways = network.nat_gateways(),
            "Network declared"
        );

        let cluster = Cluster::build(&prefix, &network);
        let mut capacity = CapacityPool::build(&prefix, &cluster, &network, &config.capacity)?;
        info!(
            cluster = %cluster.id,
            instance_type = capacity.instance_type.name,
            nodes = capacity.node_count(),
            launch_template = %capacity.launch_template.id,
            "Cluster and capacity declared"
        );

        let task_spec = TaskSpec::build(&prefix, &config.task)?;
        let mut service = Service::build(&prefix, &cluster, &task_spec, &config.scaling)?;

        let mut load_balancer = LoadBalancer::build(&prefix, &network, &config.exposure)?;
        let listener_id = load_balancer.next_listener_id(&prefix)?;
        let target_group = build_target_group(
            &prefix,
            &load_balancer,
            &listener_id,
            &task_spec,
            &config.exposure,
            &config.health_check,
        )?;
        let listener = Listener {
            id: listener_id,
            port: config.exposure.listener_port,
            open: config.exposure.open,
            target_group: target_group.id.clone(),
        };
        load_balancer.add_listener(listener)?;

        // Nodes only admit the load balancer, on the ports tasks bind.
        let host_ports = task_spec
            .demand()
            .host_port
            .map_or(EPHEMERAL_HOST_PORTS, |port| (port, port));
        capacity.allow_from(&prefix, &load_balancer.security_group.id, host_ports)?;
        service.register_target(
            &task_spec,
            &target_group.id,
            &config.exposure.target_container,
            config.exposure.target_container_port,
        )?;
        info!(
            service = %service.id,
            desired = service.desired_count,
            min = service.scaling_target.min_capacity,
            max = service.scaling_target.max_capacity,
            "Workload declared"
        );
        info!(
            load_balancer = %load_balancer.id,
            listener_port = config.exposure.listener_port,
            target_port = target_group.port,
            "Exposure declared"
        );

        let role = IamRole::build(&prefix, &config.grant);
        info!(role = %role.id, principal = role.trust.service_principal(), "Grant declared");

        let mut deployment = Self {
            prefix,
            network,
            cluster,
            capacity,
            task_spec,
            service,
            load_balancer,
            target_group,
            role,
            graph: ResourceGraph::new(),
        };
        deployment.graph = deployment.build_graph()?;
        deployment.graph.topological_order()?;

        let report = deployment.capacity_report();
        if report.desired_count > report.task_capacity {
            return Err(DescriptorError::invalid(
                [
                    deployment.cluster.id.to_string(),
                    deployment.capacity.id.to_string(),
                    deployment.service.id.to_string(),
                ],
                format!(
                    "desired count {} exceeds pool capacity of {} tasks ({} nodes x {} per node)",
                    report.desired_count,
                    report.task_capacity,
                    report.node_count,
                    report.tasks_per_node
                ),
            ));
        }
        for advisory in &report.advisories {
            warn!(advisory = %advisory, "Capacity advisory");
        }

        debug!(resources = deployment.graph.len(), "Descriptor built");
        Ok(deployment)
    }

    fn build_graph(&self) -> DescriptorResult<ResourceGraph> {
        let mut g = ResourceGraph::new();
        let vpc = self.network.id.as_str();

        g.add_node(vpc, ResourceKind::Network)?;
        for subnet in &self.network.subnets {
            g.add_node(subnet.id.as_str(), ResourceKind::Subnet)?;
            g.add_edge(subnet.id.as_str(), vpc, EdgeKind::InNetwork)?;
        }
        if let Some(igw) = &self.network.internet_gateway {
            let attachment = igw.attachment.as_str();
            g.add_node(igw.id.as_str(), ResourceKind::InternetGateway)?;
            g.add_node(attachment, ResourceKind::GatewayAttachment)?;
            g.add_edge(attachment, vpc, EdgeKind::AttachedTo)?;
            g.add_edge(attachment, igw.id.as_str(), EdgeKind::AttachedTo)?;

            if let Some(routes) = &self.network.public_routes {
                let table = routes.id.as_str();
                let route = routes.default_route.as_str();
                g.add_node(table, ResourceKind::RouteTable)?;
                g.add_edge(table, vpc, EdgeKind::InNetwork)?;
                g.add_node(route, ResourceKind::Route)?;
                g.add_edge(route, table, EdgeKind::BelongsTo)?;
                g.add_edge(route, igw.id.as_str(), EdgeKind::RoutesThrough)?;
                g.add_edge(route, attachment, EdgeKind::Requires)?;
                for assoc in &routes.associations {
                    g.add_node(assoc.id.as_str(), ResourceKind::RouteTableAssociation)?;
                    g.add_edge(assoc.id.as_str(), table, EdgeKind::Associates)?;
                    g.add_edge(assoc.id.as_str(), assoc.subnet.as_str(), EdgeKind::Associates)?;
                }
            }
        }

        let cluster = self.cluster.id.as_str();
        g.add_node(cluster, ResourceKind::Cluster)?;
        g.add_edge(cluster, self.cluster.network.as_str(), EdgeKind::BoundTo)?;

        let pool = &self.capacity;
        let role = pool.instance_role.id.as_str();
        let profile = pool.instance_profile.id.as_str();
        g.add_node(role, ResourceKind::InstanceRole)?;
        g.add_node(profile, ResourceKind::InstanceProfile)?;
        g.add_edge(profile, pool.instance_profile.role.as_str(), EdgeKind::Carries)?;

        let node_sg = pool.security_group.id.as_str();
        g.add_node(node_sg, ResourceKind::NodeSecurityGroup)?;
        g.add_edge(node_sg, pool.security_group.network.as_str(), EdgeKind::InNetwork)?;

        let lt = &pool.launch_template;
        g.add_node(lt.id.as_str(), ResourceKind::LaunchTemplate)?;
        g.add_edge(lt.id.as_str(), lt.cluster.as_str(), EdgeKind::Joins)?;
        g.add_edge(lt.id.as_str(), lt.instance_profile.as_str(), EdgeKind::RunsAs)?;
        g.add_edge(lt.id.as_str(), lt.security_group.as_str(), EdgeKind::GuardedBy)?;

        let pool_id = pool.id.as_str();
        g.add_node(pool_id, ResourceKind::CapacityPool)?;
        g.add_edge(pool_id, pool.cluster.as_str(), EdgeKind::CapacityFor)?;
        g.add_edge(pool_id, lt.id.as_str(), EdgeKind::LaunchedFrom)?;
        for subnet in &pool.subnets {
            g.add_edge(pool_id, subnet.as_str(), EdgeKind::PlacedIn)?;
        }
        self.require_public_routes(&mut g, pool_id, &pool.subnets)?;

        g.add_node(self.task_spec.id.as_str(), ResourceKind::TaskSpec)?;

        let lb = self.load_balancer.id.as_str();
        let sg = self.load_balancer.security_group.id.as_str();
        g.add_node(sg, ResourceKind::SecurityGroup)?;
        g.add_edge(sg, self.load_balancer.security_group.network.as_str(), EdgeKind::InNetwork)?;
        g.add_node(lb, ResourceKind::LoadBalancer)?;
        g.add_edge(lb, sg, EdgeKind::GuardedBy)?;
        for subnet in &self.load_balancer.subnets {
            g.add_edge(lb, subnet.as_str(), EdgeKind::PlacedIn)?;
        }
        self.require_public_routes(&mut g, lb, &self.load_balancer.subnets)?;

        if let Some(ingress) = &pool.security_group.ingress {
            g.add_node(ingress.id.as_str(), ResourceKind::NodeIngress)?;
            g.add_edge(ingress.id.as_str(), node_sg, EdgeKind::Opens)?;
            g.add_edge(ingress.id.as_str(), ingress.source.as_str(), EdgeKind::AllowsFrom)?;
        }

        let tg = self.target_group.id.as_str();
        g.add_node(tg, ResourceKind::TargetGroup)?;
        g.add_edge(tg, self.target_group.network.as_str(), EdgeKind::InNetwork)?;

        for listener in &self.load_balancer.listeners {
            g.add_node(listener.id.as_str(), ResourceKind::Listener)?;
            g.add_edge(listener.id.as_str(), lb, EdgeKind::ListensOn)?;
            g.add_edge(listener.id.as_str(), listener.target_group.as_str(), EdgeKind::ForwardsTo)?;
        }

        let service = self.service.id.as_str();
        g.add_node(service, ResourceKind::Service)?;
        g.add_edge(service, self.service.cluster.as_str(), EdgeKind::RunsOn)?;
        g.add_edge(service, self.service.task_spec.as_str(), EdgeKind::Wraps)?;
        // Tasks can only be placed once the pool has nodes.
        g.add_edge(service, pool_id, EdgeKind::RunsOn)?;
        if let Some(registration) = &self.service.load_balancer {
            g.add_edge(service, registration.target_group.as_str(), EdgeKind::RegistersWith)?;
            for listener in self
                .load_balancer
                .listeners
                .iter()
                .filter(|l| l.target_group == registration.target_group)
            {
                g.add_edge(service, listener.id.as_str(), EdgeKind::RoutedBy)?;
            }
        }

        let target = self.service.scaling_target.id.as_str();
        g.add_node(target, ResourceKind::ScalingTarget)?;
        g.add_edge(target, service, EdgeKind::Scales)?;
        let policy = self.service.scaling_policy.id.as_str();
        g.add_node(policy, ResourceKind::ScalingPolicy)?;
        g.add_edge(policy, target, EdgeKind::Governs)?;

        g.add_node(self.role.id.as_str(), ResourceKind::Role)?;

        Ok(g)
    }

    /// Order `from` after the default route and the route-table
    /// associations of the public subnets it is placed in.
    fn require_public_routes(
        &self,
        g: &mut ResourceGraph,
        from: &str,
        subnets: &[SubnetId],
    ) -> DescriptorResult<()> {
        let Some(routes) = &self.network.public_routes else {
            return Ok(());
        };
        g.add_edge(from, routes.default_route.as_str(), EdgeKind::Requires)?;
        for assoc in routes
            .associations
            .iter()
            .filter(|a| subnets.contains(&a.subnet))
        {
            g.add_edge(from, assoc.id.as_str(), EdgeKind::Requires)?;
        }
        Ok(())
    }

    /// The resource graph.
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Provisioning-engine input.
    pub fn template(&self) -> serde_json::Value {
        template::render(self)
    }

    /// Fingerprint of the rendered template.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_json(&self.template())
    }

    /// Capacity of the fixed pool versus the service's bounds.
    ///
    /// The pool is never resized to fit `max_capacity`. When it cannot host
    /// the maximum, that is reported as an advisory, not an error.
    pub fn capacity_report(&self) -> CapacityReport {
        let demand = self.task_spec.demand();
        let node_memory_mib = self.capacity.instance_type.memory_mib;
        let per_node = tasks_per_node(node_memory_mib, &demand);
        let node_count = self.capacity.node_count();
        let task_capacity = per_node.saturating_mul(node_count);

        let min_capacity = self.service.scaling_target.min_capacity;
        let max_capacity = self.service.scaling_target.max_capacity;

        let mut advisories = Vec::new();
        if max_capacity > task_capacity {
            let cause = match demand.host_port {
                Some(port) if per_node == 1 => {
                    format!("static host port {port} allows one task per node")
                }
                _ => format!(
                    "{} MiB nodes hold {} tasks of {} MiB",
                    node_memory_mib, per_node, demand.memory_mib
                ),
            };
            advisories.push(format!(
                "max_capacity {} exceeds the fixed pool's {} task slots ({} nodes, {}); \
                 scale-out beyond {} tasks will not be placed",
                max_capacity, task_capacity, node_count, cause, task_capacity
            ));
        }
        if demand.memory_mib > node_memory_mib {
            advisories.push(format!(
                "task memory {} MiB exceeds {} node memory {} MiB",
                demand.memory_mib, self.capacity.instance_type.name, node_memory_mib
            ));
        }

        CapacityReport {
            instance_type: self.capacity.instance_type.name.to_string(),
            node_count,
            node_memory_mib,
            task_memory_mib: demand.memory_mib,
            static_host_port: demand.host_port,
            tasks_per_node: per_node,
            task_capacity,
            desired_count: self.service.desired_count,
            min_capacity,
            max_capacity,
            advisories,
        }
    }

    /// Where the initial replicas land under the service's placement
    /// strategy.
    pub fn initial_placement(&self) -> Result<Vec<Assignment>, PlacementError> {
        self.place(self.service.desired_count)
    }

    /// Place `count` replicas on the fixed pool.
    pub fn place(&self, count: u32) -> Result<Vec<Assignment>, PlacementError> {
        spread_across_instances(
            &self.capacity.node_slots(),
            &self.task_spec.demand(),
            count,
        )
    }

    /// A scaling model seeded with the service's bounds, policy and desired
    /// count.
    pub fn scaling_simulator(&self) -> DescriptorResult<ScalingSimulator> {
        let bounds = self.service.bounds()?;
        let policy = self.service.scaling_policy.tracking()?;
        ScalingSimulator::new(bounds, policy, self.service.desired_count).map_err(|e| {
            DescriptorError::invalid([self.service.id.to_string()], e.to_string())
        })
    }
}
