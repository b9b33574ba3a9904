//! Network: VPC, zone-scoped subnets, internet gateway and the public
//! route table.
//!
//! No NAT gateway is ever provisioned. Private egress is out of scope for
//! this topology and the count is not configurable.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use fisdemo_id::{
    GatewayAttachmentId, InternetGatewayId, NetworkId, ResourcePrefix, RouteAssociationId,
    RouteId, RouteTableId, SubnetId,
};
use fisdemo_networking::{ensure_disjoint, validate_prefix_len, Ipv4Cidr, SubnetCarver};
use serde::Serialize;
use tracing::debug;

use crate::error::{DescriptorError, DescriptorResult};
use crate::settings::NetworkConfig;

/// Zone-scoped address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub availability_zone: String,
    #[serde(serialize_with = "super::display")]
    pub cidr: Ipv4Cidr,
    pub map_public_ip_on_launch: bool,
}

impl Subnet {
    pub fn is_public(&self) -> bool {
        self.map_public_ip_on_launch
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternetGateway {
    pub id: InternetGatewayId,
    /// Binds the gateway to the VPC. Routes through the gateway only work
    /// once it exists.
    pub attachment: GatewayAttachmentId,
}

/// Binding of one public subnet to the public route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteAssociation {
    pub id: RouteAssociationId,
    pub subnet: SubnetId,
}

/// Route table of the public subnets: a single default route to the
/// internet gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicRouteTable {
    pub id: RouteTableId,
    pub default_route: RouteId,
    #[serde(serialize_with = "super::display")]
    pub destination: Ipv4Cidr,
    pub associations: Vec<RouteAssociation>,
}

/// Isolated address space for the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    #[serde(serialize_with = "super::display")]
    pub cidr: Ipv4Cidr,
    pub subnets: Vec<Subnet>,
    pub internet_gateway: Option<InternetGateway>,
    /// Present exactly when the internet gateway is.
    pub public_routes: Option<PublicRouteTable>,
}

impl Network {
    /// Number of NAT gateways. Always zero.
    pub const NAT_GATEWAYS: u32 = 0;

    /// Build the network from its configuration.
    ///
    /// Subnets are carved sequentially from the VPC block, one per
    /// (zone, mask, visibility) tuple, in declaration order.
    pub fn build(prefix: &ResourcePrefix, config: &NetworkConfig) -> DescriptorResult<Self> {
        let id = NetworkId::new(prefix);
        let chain = |leaf: Option<&str>| {
            let mut ids = vec![id.to_string()];
            ids.extend(leaf.map(str::to_string));
            ids
        };

        let cidr = Ipv4Cidr::from_cidr(&config.cidr)
            .map_err(|e| DescriptorError::network(chain(None), e))?;
        validate_prefix_len(cidr.prefix_len)
            .map_err(|e| DescriptorError::network(chain(None), e))?;

        if config.subnets.len() != config.availability_zones.len() {
            return Err(DescriptorError::invalid(
                chain(None),
                format!(
                    "{} subnet definitions for {} availability zones; placement is undefined",
                    config.subnets.len(),
                    config.availability_zones.len()
                ),
            ));
        }

        let declared: BTreeSet<&str> = config
            .availability_zones
            .iter()
            .map(String::as_str)
            .collect();
        if declared.len() != config.availability_zones.len() {
            return Err(DescriptorError::invalid(
                chain(None),
                "availability zones must be distinct",
            ));
        }

        let mut carver = SubnetCarver::new(cidr);
        let mut used_zones = BTreeSet::new();
        let mut subnets = Vec::with_capacity(config.subnets.len());

        for (idx, subnet) in config.subnets.iter().enumerate() {
            let subnet_id = SubnetId::new(prefix, idx as u32 + 1)?;
            let subnet_chain = chain(Some(subnet_id.as_str()));

            let zone = subnet.availability_zone.as_str();
            if !declared.contains(zone) {
                return Err(DescriptorError::invalid(
                    subnet_chain,
                    format!("availability zone '{zone}' is not declared"),
                ));
            }
            if !used_zones.insert(zone) {
                return Err(DescriptorError::invalid(
                    subnet_chain,
                    format!("availability zone '{zone}' already has a subnet"),
                ));
            }

            validate_prefix_len(subnet.cidr_mask)
                .map_err(|e| DescriptorError::network(subnet_chain.clone(), e))?;
            let block = carver
                .carve(subnet.cidr_mask)
                .map_err(|e| DescriptorError::network(subnet_chain, e))?;

            debug!(subnet = %subnet_id, zone, cidr = %block, "Carved subnet");
            subnets.push(Subnet {
                id: subnet_id,
                availability_zone: zone.to_string(),
                cidr: block,
                map_public_ip_on_launch: subnet.public,
            });
        }

        let blocks: Vec<_> = subnets.iter().map(|s| s.cidr).collect();
        ensure_disjoint(&blocks).map_err(|e| DescriptorError::network(chain(None), e))?;
        debug!(vpc = %id, unallocated = carver.remaining(), "Subnets carved");

        let (internet_gateway, public_routes) = if subnets.iter().any(Subnet::is_public) {
            let associations = subnets
                .iter()
                .filter(|s| s.is_public())
                .map(|s| -> DescriptorResult<RouteAssociation> {
                    Ok(RouteAssociation {
                        id: RouteAssociationId::new(prefix, s.id.index())?,
                        subnet: s.id.clone(),
                    })
                })
                .collect::<DescriptorResult<Vec<_>>>()?;
            let gateway = InternetGateway {
                id: InternetGatewayId::new(prefix),
                attachment: GatewayAttachmentId::new(prefix),
            };
            let routes = PublicRouteTable {
                id: RouteTableId::new(prefix),
                default_route: RouteId::new(prefix),
                destination: Ipv4Cidr::new(Ipv4Addr::UNSPECIFIED, 0)
                    .map_err(|e| DescriptorError::network(chain(None), e))?,
                associations,
            };
            (Some(gateway), Some(routes))
        } else {
            (None, None)
        };

        Ok(Self {
            name: id.to_string(),
            id,
            cidr,
            subnets,
            internet_gateway,
            public_routes,
        })
    }

    /// Number of NAT gateways provisioned.
    pub fn nat_gateways(&self) -> u32 {
        Self::NAT_GATEWAYS
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| s.is_public())
    }

    pub fn subnet_ids(&self) -> Vec<SubnetId> {
        self.subnets.iter().map(|s| s.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SubnetConfig;

    fn prefix() -> ResourcePrefix {
        ResourcePrefix::parse("FISDemo").unwrap()
    }

    #[test]
    fn test_default_network_layout() {
        let network = Network::build(&prefix(), &NetworkConfig::default()).unwrap();

        assert_eq!(network.id.as_str(), "FISDemo-VPC");
        assert_eq!(network.cidr.to_string(), "10.0.0.0/16");
        assert_eq!(network.subnets.len(), 3);
        assert_eq!(network.nat_gateways(), 0);
        assert!(network.internet_gateway.is_some());

        let cidrs: Vec<_> = network.subnets.iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(cidrs, ["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

        let zones: Vec<_> = network
            .subnets
            .iter()
            .map(|s| s.availability_zone.as_str())
            .collect();
        assert_eq!(zones, ["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert_eq!(network.public_subnets().count(), 3);
    }

    #[test]
    fn test_public_subnets_route_through_attached_gateway() {
        let network = Network::build(&prefix(), &NetworkConfig::default()).unwrap();
        let igw = network.internet_gateway.as_ref().unwrap();
        assert_eq!(igw.attachment.as_str(), "FISDemo-IGWAttachment");

        let routes = network.public_routes.as_ref().unwrap();
        assert_eq!(routes.id.as_str(), "FISDemo-PublicRouteTable");
        assert_eq!(routes.destination.to_string(), "0.0.0.0/0");

        let associated: Vec<_> = routes
            .associations
            .iter()
            .map(|a| a.subnet.as_str())
            .collect();
        assert_eq!(
            associated,
            ["FISDemo-Public1", "FISDemo-Public2", "FISDemo-Public3"]
        );
        assert_eq!(routes.associations[2].id.as_str(), "FISDemo-RouteAssociation3");
    }

    #[test]
    fn test_only_public_subnets_are_associated() {
        let mut config = NetworkConfig::default();
        config.subnets[1].public = false;

        let network = Network::build(&prefix(), &config).unwrap();
        let routes = network.public_routes.unwrap();
        let associated: Vec<_> = routes
            .associations
            .iter()
            .map(|a| a.subnet.as_str())
            .collect();
        assert_eq!(associated, ["FISDemo-Public1", "FISDemo-Public3"]);
    }

    #[test]
    fn test_vpc_block_outside_provider_range() {
        for cidr in ["10.0.0.0/8", "10.0.0.0/15", "10.0.0.0/29"] {
            let config = NetworkConfig {
                cidr: cidr.to_string(),
                ..NetworkConfig::default()
            };
            let err = Network::build(&prefix(), &config).unwrap_err();
            let (resource, chain) = err.failing_resource().unwrap();
            assert_eq!(resource, "FISDemo-VPC", "{cidr}");
            assert_eq!(chain.to_string(), "FISDemo-VPC");
            assert!(err.to_string().contains("must be between /16 and /28"), "{err}");
        }
    }

    #[test]
    fn test_no_internet_gateway_without_public_subnets() {
        let mut config = NetworkConfig::default();
        for subnet in &mut config.subnets {
            subnet.public = false;
        }
        let network = Network::build(&prefix(), &config).unwrap();
        assert!(network.internet_gateway.is_none());
        assert!(network.public_routes.is_none());
        assert_eq!(network.nat_gateways(), 0);
    }

    #[test]
    fn test_zone_count_mismatch_fails_fast() {
        let mut config = NetworkConfig::default();
        config.availability_zones.push("us-east-1d".to_string());

        let err = Network::build(&prefix(), &config).unwrap_err();
        let (resource, _) = err.failing_resource().unwrap();
        assert_eq!(resource, "FISDemo-VPC");
    }

    #[test]
    fn test_undeclared_zone() {
        let mut config = NetworkConfig::default();
        config.subnets[2].availability_zone = "eu-west-1a".to_string();

        let err = Network::build(&prefix(), &config).unwrap_err();
        let (resource, chain) = err.failing_resource().unwrap();
        assert_eq!(resource, "FISDemo-Public3");
        assert_eq!(chain.to_string(), "FISDemo-VPC -> FISDemo-Public3");
    }

    #[test]
    fn test_duplicate_zone() {
        let mut config = NetworkConfig::default();
        config.subnets[1].availability_zone = "us-east-1a".to_string();
        assert!(Network::build(&prefix(), &config).is_err());
    }

    #[test]
    fn test_subnets_must_fit_vpc_block() {
        let config = NetworkConfig {
            cidr: "10.0.0.0/24".to_string(),
            availability_zones: vec!["a".into(), "b".into()],
            subnets: vec![
                SubnetConfig {
                    availability_zone: "a".into(),
                    cidr_mask: 24,
                    public: true,
                },
                SubnetConfig {
                    availability_zone: "b".into(),
                    cidr_mask: 25,
                    public: true,
                },
            ],
        };

        let err = Network::build(&prefix(), &config).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_invalid_cidr() {
        let config = NetworkConfig {
            cidr: "10.0.0.0".to_string(),
            ..NetworkConfig::default()
        };
        assert!(Network::build(&prefix(), &config).is_err());
    }
}
