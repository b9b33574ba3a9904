//! The deployment-wide naming prefix.

use std::str::FromStr;

use crate::IdError;

/// Validated naming prefix shared by every logical ID of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePrefix(String);

impl ResourcePrefix {
    /// Longest accepted prefix. Keeps `{prefix}-role` well under the IAM
    /// role name limit of 64 characters.
    pub const MAX_LEN: usize = 32;

    /// Parses and validates a prefix.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(IdError::PrefixTooLong {
                prefix: s.to_string(),
                len: s.len(),
                max: Self::MAX_LEN,
            });
        }

        let mut chars = s.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        if !starts_with_letter || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidPrefix(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the prefix string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourcePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourcePrefix {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ResourcePrefix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ResourcePrefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Splits `{prefix}-{rest}` and validates the prefix half.
pub fn split_logical(s: &str) -> Result<(ResourcePrefix, &str), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    let Some((prefix, rest)) = s.split_once('-') else {
        return Err(IdError::MissingSeparator);
    };
    Ok((ResourcePrefix::parse(prefix)?, rest))
}
