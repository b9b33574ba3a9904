//! Typed logical ID definitions for every declared resource.
//!
//! Each ID type has a unique suffix that identifies the resource type.

use crate::{define_id, define_indexed_id};

// =============================================================================
// Network
// =============================================================================

define_id!(NetworkId, "VPC");
define_indexed_id!(SubnetId, "Public");
define_id!(InternetGatewayId, "IGW");
define_id!(GatewayAttachmentId, "IGWAttachment");
define_id!(RouteTableId, "PublicRouteTable");
define_id!(RouteId, "PublicDefaultRoute");
define_indexed_id!(RouteAssociationId, "RouteAssociation");

// =============================================================================
// Cluster and Capacity
// =============================================================================

define_id!(ClusterId, "Cluster");
define_id!(CapacityPoolId, "asg");
define_id!(LaunchTemplateId, "LaunchTemplate");
define_id!(InstanceRoleId, "InstanceRole");
define_id!(InstanceProfileId, "InstanceProfile");
define_id!(NodeSecurityGroupId, "InstanceSecurityGroup");
define_id!(NodeIngressId, "InstanceIngressFromLB");

// =============================================================================
// Workload
// =============================================================================

define_id!(TaskSpecId, "TaskDef");
define_id!(ServiceId, "Service");
define_id!(ScalingTargetId, "ScalingTarget");
define_id!(ScalingPolicyId, "CpuScaling");

// =============================================================================
// Exposure
// =============================================================================

define_id!(LoadBalancerId, "LB");
define_indexed_id!(ListenerId, "Listener");
define_id!(TargetGroupId, "TargetGroup");
define_id!(SecurityGroupId, "LBSecurityGroup");

// =============================================================================
// Fault-Injection Grant
// =============================================================================

define_id!(RoleId, "role");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdError, ResourcePrefix};

    fn prefix() -> ResourcePrefix {
        ResourcePrefix::parse("FISDemo").unwrap()
    }

    #[test]
    fn test_network_id_rendering() {
        let id = NetworkId::new(&prefix());
        assert_eq!(id.as_str(), "FISDemo-VPC");
    }

    #[test]
    fn test_network_id_roundtrip() {
        let id = NetworkId::new(&prefix());
        let parsed: NetworkId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_deterministic() {
        assert_eq!(ClusterId::new(&prefix()), ClusterId::new(&prefix()));
        assert_eq!(
            SubnetId::new(&prefix(), 2).unwrap(),
            SubnetId::new(&prefix(), 2).unwrap()
        );
    }

    #[test]
    fn test_wrong_suffix() {
        let result: Result<ClusterId, _> = "FISDemo-VPC".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidSuffix {
                expected: "Cluster",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<RoleId, _> = "FISDemorole".parse();
        assert_eq!(result.unwrap_err(), IdError::MissingSeparator);
    }

    #[test]
    fn test_empty() {
        let result: Result<RoleId, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_subnet_id_index() {
        let id = SubnetId::new(&prefix(), 3).unwrap();
        assert_eq!(id.as_str(), "FISDemo-Public3");
        assert_eq!(id.index(), 3);

        let parsed = SubnetId::parse("FISDemo-Public3").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_subnet_id_rejects_zero_and_padding() {
        assert!(SubnetId::new(&prefix(), 0).is_err());
        assert!(matches!(
            SubnetId::parse("FISDemo-Public0"),
            Err(IdError::InvalidIndex(_))
        ));
        assert!(matches!(
            SubnetId::parse("FISDemo-Public01"),
            Err(IdError::InvalidIndex(_))
        ));
        assert!(matches!(
            SubnetId::parse("FISDemo-Private1"),
            Err(IdError::InvalidSuffix { .. })
        ));
    }

    #[test]
    fn test_route_association_follows_subnet_index() {
        let subnet = SubnetId::new(&prefix(), 2).unwrap();
        let assoc = RouteAssociationId::new(&prefix(), subnet.index()).unwrap();
        assert_eq!(assoc.as_str(), "FISDemo-RouteAssociation2");
        assert!(SubnetId::parse(assoc.as_str()).is_err());
    }

    #[test]
    fn test_node_ids_do_not_collide_with_lb_ids() {
        let node_sg = NodeSecurityGroupId::new(&prefix());
        assert_eq!(node_sg.as_str(), "FISDemo-InstanceSecurityGroup");
        assert_ne!(node_sg.as_str(), SecurityGroupId::new(&prefix()).as_str());
        assert!(SecurityGroupId::parse(node_sg.as_str()).is_err());
    }

    #[test]
    fn test_role_id_json_roundtrip() {
        let id = RoleId::new(&prefix());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"FISDemo-role\"");
        let parsed: RoleId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest::proptest! {
        #[test]
        fn prop_any_valid_prefix_roundtrips(p in "[A-Za-z][A-Za-z0-9]{0,31}") {
            let prefix = ResourcePrefix::parse(&p).unwrap();
            let id = ServiceId::new(&prefix);
            let parsed = ServiceId::parse(id.as_str()).unwrap();
            proptest::prop_assert_eq!(id, parsed);
        }
    }
}
