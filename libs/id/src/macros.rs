//! Macros for defining typed logical ID types.

/// Macro to define a typed logical ID with a fixed suffix.
///
/// This generates a newtype wrapper around the rendered `{prefix}-{suffix}`
/// string with:
/// - A `SUFFIX` constant
/// - `new()` to derive the ID from a [`crate::ResourcePrefix`]
/// - `parse()` to parse from string
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations
///
/// # Example
///
/// ```ignore
/// define_id!(NetworkId, "VPC");
///
/// let prefix = ResourcePrefix::parse("FISDemo")?;
/// assert_eq!(NetworkId::new(&prefix).as_str(), "FISDemo-VPC");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $suffix:literal) => {
        /// A typed logical ID for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// The suffix for this ID type.
            pub const SUFFIX: &'static str = $suffix;

            /// Derives the ID from the deployment prefix.
            #[must_use]
            pub fn new(prefix: &$crate::ResourcePrefix) -> Self {
                Self(format!("{}-{}", prefix, Self::SUFFIX))
            }

            /// Parses an ID from a string.
            ///
            /// The string must be in the format `{prefix}-{suffix}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                let (_, suffix) = $crate::__split_logical(s)?;
                if suffix != Self::SUFFIX {
                    return Err($crate::IdError::InvalidSuffix {
                        expected: Self::SUFFIX,
                        actual: suffix.to_string(),
                    });
                }
                Ok(Self(s.to_string()))
            }

            /// Returns the rendered ID.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Macro to define a typed logical ID whose suffix carries a 1-based index,
/// e.g. `FISDemo-Public1`, `FISDemo-Public2`.
#[macro_export]
macro_rules! define_indexed_id {
    ($name:ident, $stem:literal) => {
        /// A typed, indexed logical ID for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            rendered: String,
            index: u32,
        }

        impl $name {
            /// The stem preceding the index.
            pub const STEM: &'static str = $stem;

            /// Derives the ID from the deployment prefix and a 1-based index.
            pub fn new(prefix: &$crate::ResourcePrefix, index: u32) -> Result<Self, $crate::IdError> {
                if index == 0 {
                    return Err($crate::IdError::InvalidIndex("index must be >= 1".to_string()));
                }
                Ok(Self {
                    rendered: format!("{}-{}{}", prefix, Self::STEM, index),
                    index,
                })
            }

            /// Parses an ID from a string.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                let (_, suffix) = $crate::__split_logical(s)?;
                let Some(digits) = suffix.strip_prefix(Self::STEM) else {
                    return Err($crate::IdError::InvalidSuffix {
                        expected: Self::STEM,
                        actual: suffix.to_string(),
                    });
                };
                if digits.starts_with('0') {
                    return Err($crate::IdError::InvalidIndex(digits.to_string()));
                }
                let index = digits
                    .parse::<u32>()
                    .map_err(|_| $crate::IdError::InvalidIndex(digits.to_string()))?;
                Ok(Self {
                    rendered: s.to_string(),
                    index,
                })
            }

            /// Returns the 1-based index.
            #[must_use]
            pub fn index(&self) -> u32 {
                self.index
            }

            /// Returns the rendered ID.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.rendered
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.rendered)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.rendered
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.rendered)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
