//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The prefix contains characters outside `[A-Za-z0-9]` or does not start
    /// with a letter.
    #[error("invalid resource prefix '{0}': must start with a letter and be alphanumeric")]
    InvalidPrefix(String),

    /// The prefix is longer than [`crate::ResourcePrefix::MAX_LEN`].
    #[error("resource prefix '{prefix}' is {len} characters (max {max})")]
    PrefixTooLong {
        prefix: String,
        len: usize,
        max: usize,
    },

    /// The ID is missing the hyphen separator.
    #[error("ID missing '-' separator")]
    MissingSeparator,

    /// The suffix does not match the ID type.
    #[error("invalid ID suffix: expected '{expected}', got '{actual}'")]
    InvalidSuffix {
        expected: &'static str,
        actual: String,
    },

    /// The index of an indexed ID is missing, zero or malformed.
    #[error("invalid ID index: {0}")]
    InvalidIndex(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error is about the prefix portion.
    pub fn is_prefix_error(&self) -> bool {
        matches!(
            self,
            IdError::InvalidPrefix(_) | IdError::PrefixTooLong { .. }
        )
    }
}
