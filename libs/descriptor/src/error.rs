//! Error types for descriptor construction.

use fisdemo_id::IdError;
use fisdemo_networking::NetworkError;
use thiserror::Error;

/// Result type for descriptor operations.
pub type DescriptorResult<T> = Result<T, DescriptorError>;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer (defaults, file, environment) could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Field-level validation failed.
    #[error("configuration failed validation: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Path of references leading from a resource group root to the resource
/// that failed, e.g. `FISDemo-LB -> FISDemo-Listener1 -> FISDemo-TargetGroup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceChain(Vec<String>);

impl ReferenceChain {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    /// The resource at the end of the chain.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ReferenceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

/// Descriptor construction errors.
///
/// Every error is raised before any template is produced.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid resource ID: {0}")]
    Id(#[from] IdError),

    /// A resource violates one of its invariants.
    #[error("{resource}: {reason} (reference chain: {chain})")]
    InvalidResource {
        resource: String,
        chain: ReferenceChain,
        reason: String,
    },

    /// Two resources share a logical ID.
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// An edge points at a resource that was never declared.
    #[error("{from} references undeclared resource {to}")]
    DanglingReference { from: String, to: String },

    /// The resource graph is not acyclic.
    #[error("dependency cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

impl DescriptorError {
    /// Build an [`DescriptorError::InvalidResource`] whose resource is the
    /// last element of `chain`.
    pub fn invalid<S: Into<String>>(
        chain: impl IntoIterator<Item = S>,
        reason: impl Into<String>,
    ) -> Self {
        let chain = ReferenceChain::new(chain);
        Self::InvalidResource {
            resource: chain.leaf().unwrap_or("<descriptor>").to_string(),
            chain,
            reason: reason.into(),
        }
    }

    /// Wrap a networking error raised while building `chain`.
    pub(crate) fn network<S: Into<String>>(
        chain: impl IntoIterator<Item = S>,
        err: NetworkError,
    ) -> Self {
        Self::invalid(chain, err.to_string())
    }

    /// Returns the failing resource and its chain, if this error is tied to
    /// one resource.
    pub fn failing_resource(&self) -> Option<(&str, &ReferenceChain)> {
        match self {
            Self::InvalidResource {
                resource, chain, ..
            } => Some((resource.as_str(), chain)),
            _ => None,
        }
    }
}
