//! Fault-injection grant: an assumable role for the external fault-injection
//! service, with two provider-managed policies attached.
//!
//! The role is never attached to anything declared here. The fault-injection
//! service assumes it when it runs experiments against the cluster.

use fisdemo_id::{ResourcePrefix, RoleId};
use serde::Serialize;

use crate::settings::GrantConfig;

/// Service principal of the fault-injection service.
pub const FIS_SERVICE_PRINCIPAL: &str = "fis.amazonaws.com";

/// Managed policy allowing fault actions on compute instances.
pub const FIS_EC2_ACCESS_POLICY: &str = "service-role/AWSFaultInjectionSimulatorEC2Access";

/// Managed policy allowing fault actions on container services.
pub const FIS_ECS_ACCESS_POLICY: &str = "service-role/AWSFaultInjectionSimulatorECSAccess";

/// Who may assume the role. Holds exactly one service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustPolicy {
    service_principal: String,
}

impl TrustPolicy {
    /// Trust restricted to one service principal.
    pub fn for_service(principal: &str) -> Self {
        Self {
            service_principal: principal.to_string(),
        }
    }

    /// Trust restricted to the fault-injection service.
    pub fn fault_injection() -> Self {
        Self::for_service(FIS_SERVICE_PRINCIPAL)
    }

    pub fn service_principal(&self) -> &str {
        &self.service_principal
    }

    /// Whether `principal` may assume the role.
    pub fn permits(&self, principal: &str) -> bool {
        principal == self.service_principal
    }

    /// Policy document in provider JSON form.
    pub fn document(&self) -> serde_json::Value {
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.service_principal },
                "Action": "sts:AssumeRole",
            }],
        })
    }
}

/// Reference to a provider-managed permission set, by well-known name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ManagedPolicyRef(String);

impl ManagedPolicyRef {
    pub fn aws_managed(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// ARN in the given partition (`aws`, `aws-cn`, ...).
    pub fn arn(&self, partition: &str) -> String {
        format!("arn:{partition}:iam::aws:policy/{}", self.0)
    }
}

/// Assumable identity for the fault-injection service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IamRole {
    pub id: RoleId,
    pub role_name: String,
    pub description: String,
    pub trust: TrustPolicy,
    pub managed_policies: Vec<ManagedPolicyRef>,
}

impl IamRole {
    pub fn build(prefix: &ResourcePrefix, config: &GrantConfig) -> Self {
        let id = RoleId::new(prefix);
        Self {
            role_name: id.to_string(),
            id,
            description: config.role_description.clone(),
            trust: TrustPolicy::fault_injection(),
            managed_policies: vec![
                ManagedPolicyRef::aws_managed(FIS_EC2_ACCESS_POLICY),
                ManagedPolicyRef::aws_managed(FIS_ECS_ACCESS_POLICY),
            ],
        }
    }
}
