//! Convergence models for the deployed topology.
//!
//! The provisioning engine and the provider's control plane own the real
//! reconciliation. This library models the parts of it the descriptor has to
//! reason about offline:
//!
//! - **Fingerprints**: a stable hash of a rendered descriptor, so two
//!   synthesized templates can be compared without a diff.
//! - **Placement**: how the spread-across-instances strategy distributes
//!   task replicas over a fixed node pool.
//! - **Scaling**: how a CPU target-tracking policy moves the task count
//!   within its bounds, gated by cooldowns.
//!
//! # Invariants
//!
//! - All functions are deterministic given the same inputs
//! - Scaling never proposes a count outside `[min, max]`

pub mod placement;
pub mod scaling;

use sha2::{Digest, Sha256};

pub use placement::{
    spread_across_instances, tasks_by_node, tasks_per_node, Assignment, NodeSlot, PlacementError,
    TaskDemand,
};
pub use scaling::{
    ScalingActivity, ScalingBounds, ScalingDirection, ScalingError, ScalingSimulator,
    TargetTracking,
};

/// A content fingerprint for deterministic comparison.
///
/// Two descriptors built from identical inputs must have equal fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from a JSON document, ignoring key order.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = sort_keys(json.clone()).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        // First 16 bytes (128 bits)
        Self(format!("sha256:{}", hex::encode(&digest[..16])))
    }

    /// Get the fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild objects with their keys in lexical order, recursively.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}
