//! Deployment descriptor for the fault-injection demo topology.
//!
//! A [`DeploymentConfig`] is layered from defaults, an optional TOML file and
//! `FISDEMO_*` environment variables. [`Deployment::build`] turns it into a
//! validated resource model plus an explicit [`ResourceGraph`] and fails on
//! the first invalid resource. A built deployment renders to deterministic
//! provisioning-engine JSON via [`Deployment::template`].
//!
//! ```no_run
//! use fisdemo_descriptor::{Deployment, DeploymentConfig};
//!
//! let config = DeploymentConfig::load(None)?;
//! let deployment = Deployment::build(&config)?;
//! println!("{}", deployment.fingerprint());
//! # Ok::<(), fisdemo_descriptor::DescriptorError>(())
//! ```

pub mod error;
pub mod graph;
pub mod model;
pub mod settings;
pub mod template;

mod deployment;

pub use deployment::{CapacityReport, Deployment, LOAD_BALANCER_DNS_OUTPUT};
pub use error::{ConfigError, DescriptorError, DescriptorResult, ReferenceChain};
pub use graph::{Edge, EdgeKind, ResourceGraph, ResourceKind};
pub use settings::DeploymentConfig;
