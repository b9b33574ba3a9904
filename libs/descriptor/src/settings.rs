//! Deployment configuration.
//!
//! One explicit, validated value replaces module-level constants, so several
//! independent descriptors can be built in one process. Values are layered:
//!
//! 1. Built-in defaults (the reference FIS demo deployment)
//! 2. An optional TOML file
//! 3. Environment variables, e.g. `FISDEMO_SCALING__MAX_CAPACITY=6`

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::error::ConfigError;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "FISDEMO";

/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Full deployment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Naming prefix applied to every logical ID.
    #[validate(length(min = 1, max = 32))]
    pub prefix: String,

    #[validate(nested)]
    pub network: NetworkConfig,

    #[validate(nested)]
    pub capacity: CapacityConfig,

    #[validate(nested)]
    pub task: TaskConfig,

    #[validate(nested)]
    pub scaling: ScalingConfig,

    #[validate(nested)]
    pub health_check: HealthCheckConfig,

    #[validate(nested)]
    pub exposure: ExposureConfig,

    #[validate(nested)]
    pub grant: GrantConfig,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            prefix: "FISDemo".to_string(),
            network: NetworkConfig::default(),
            capacity: CapacityConfig::default(),
            task: TaskConfig::default(),
            scaling: ScalingConfig::default(),
            health_check: HealthCheckConfig::default(),
            exposure: ExposureConfig::default(),
            grant: GrantConfig::default(),
        }
    }
}

/// Virtual network layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NetworkConfig {
    /// VPC address block, `/16` to `/28`. Parsed and bounded when the VPC
    /// is built.
    pub cidr: String,

    /// Availability zones the deployment spans.
    #[validate(length(min = 1, max = 6))]
    pub availability_zones: Vec<String>,

    /// One subnet per availability zone.
    #[validate(length(min = 1), nested)]
    pub subnets: Vec<SubnetConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let zones = ["us-east-1a", "us-east-1b", "us-east-1c"];
        Self {
            cidr: "10.0.0.0/16".to_string(),
            availability_zones: zones.iter().map(|z| z.to_string()).collect(),
            subnets: zones
                .iter()
                .map(|z| SubnetConfig {
                    availability_zone: z.to_string(),
                    cidr_mask: 24,
                    public: true,
                })
                .collect(),
        }
    }
}

/// One (zone, mask, visibility) subnet tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubnetConfig {
    #[validate(length(min = 1))]
    pub availability_zone: String,

    #[validate(range(min = 16, max = 28))]
    pub cidr_mask: u8,

    /// Public subnets map a public IP on launch and route to the internet
    /// gateway.
    #[serde(default = "default_true")]
    pub public: bool,
}

/// Fixed-size node pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CapacityConfig {
    /// Instance type of every node.
    #[validate(length(min = 1))]
    pub instance_type: String,

    /// Number of nodes. The pool's min and max are both set to this value.
    #[validate(range(min = 1, max = 100))]
    pub node_count: u32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            instance_type: "t2.micro".to_string(),
            node_count: 2,
        }
    }
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Task definition inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TaskConfig {
    /// Container name, also used for load-balancer target registration.
    #[validate(length(min = 1, max = 255))]
    pub container_name: String,

    /// Image reference pulled from the public registry.
    #[validate(length(min = 1))]
    pub image: String,

    /// Hard memory limit per task.
    #[validate(range(min = 6))]
    pub memory_limit_mib: u32,

    #[validate(range(min = 1))]
    pub container_port: u16,

    /// Static host port; `0` requests a dynamic port.
    pub host_port: u16,

    pub protocol: Protocol,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            container_name: "web".to_string(),
            image: "nginx:1.24-alpine".to_string(),
            memory_limit_mib: 256,
            container_port: 80,
            host_port: 8080,
            protocol: Protocol::Tcp,
        }
    }
}

/// Service auto-scaling inputs. The service starts at `min_capacity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_capacity: u32,

    #[validate(range(min = 1))]
    pub max_capacity: u32,

    #[validate(range(min = 1, max = 100))]
    pub target_utilization_percent: u32,

    pub scale_in_cooldown_secs: u64,

    pub scale_out_cooldown_secs: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_capacity: 2,
            max_capacity: 4,
            target_utilization_percent: 50,
            scale_in_cooldown_secs: 60,
            scale_out_cooldown_secs: 60,
        }
    }
}

/// Target health check. `timeout_secs` must be strictly below
/// `interval_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthCheckConfig {
    #[validate(length(min = 1, max = 1024))]
    pub path: String,

    #[validate(range(min = 2, max = 120))]
    pub timeout_secs: u64,

    #[validate(range(min = 5, max = 300))]
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            timeout_secs: 30,
            interval_secs: 60,
        }
    }
}

/// Balancing algorithm of the target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingAlgorithm {
    #[default]
    RoundRobin,
    LeastOutstandingRequests,
}

impl LoadBalancingAlgorithm {
    /// Provider spelling.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastOutstandingRequests => "least_outstanding_requests",
        }
    }
}

/// Load balancer and listener inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExposureConfig {
    pub internet_facing: bool,

    #[validate(range(min = 1))]
    pub listener_port: u16,

    /// Open the listener port to `0.0.0.0/0`.
    pub open: bool,

    /// Container the listener forwards to.
    #[validate(length(min = 1))]
    pub target_container: String,

    #[validate(range(min = 1))]
    pub target_container_port: u16,

    pub algorithm: LoadBalancingAlgorithm,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            internet_facing: true,
            listener_port: 80,
            open: true,
            target_container: "web".to_string(),
            target_container_port: 80,
            algorithm: LoadBalancingAlgorithm::RoundRobin,
        }
    }
}

/// Fault-injection role inputs. The trusted principal and the attached
/// managed policies are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GrantConfig {
    #[validate(length(max = 1000))]
    pub role_description: String,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            role_description: "The role for FIS Demo".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl DeploymentConfig {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = ::config::Config::try_from(&Self::default())?;
        let mut builder = ::config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults (no environment).
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let defaults = ::config::Config::try_from(&Self::default())?;
        let config: Self = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::from_str(
                contents,
                ::config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Run field-level validation.
    ///
    /// Rules spanning several fields (scaling bounds, health check timing,
    /// VPC block size, zone coverage) belong to a resource and are checked
    /// where that resource is built, so failures carry its reference chain.
    pub fn check(&self) -> Result<(), ConfigError> {
        Ok(self.validate()?)
    }

    /// Initial desired task count.
    pub fn desired_count(&self) -> u32 {
        self.scaling.min_capacity
    }
}
