//! # fisdemo-id
//!
//! Deterministic logical IDs for every resource the descriptor declares.
//!
//! ## Design Principles
//!
//! - Logical IDs are derived from the deployment prefix, never generated
//! - Building the same descriptor twice yields byte-identical IDs
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed to prevent wiring a subnet where a cluster is expected
//!
//! ## ID Format
//!
//! All logical IDs use the format `{prefix}-{suffix}`:
//!
//! - `FISDemo-VPC`
//! - `FISDemo-Public2`
//! - `FISDemo-role`
//!
//! The prefix is the only mitigation against duplicate resources after a
//! failed apply: the provisioning engine sees the same names on every run.

mod error;
mod macros;
mod prefix;
mod types;

pub use error::IdError;
pub use prefix::ResourcePrefix;
pub use types::*;

#[doc(hidden)]
pub use prefix::split_logical as __split_logical;
