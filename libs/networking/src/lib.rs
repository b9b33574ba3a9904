//! Networking utilities for the deployment descriptor.
//!
//! This library provides helpers for:
//! - IPv4 CIDR parsing and containment checks
//! - Sequential carving of subnets out of a VPC block
//! - Overlap detection between subnet ranges

use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Address pool exhausted.
    #[error("address pool exhausted: {0}")]
    PoolExhausted(String),

    /// Requested subnet mask is wider than (or equal to) the parent block.
    #[error("subnet mask /{mask} does not fit inside {parent}")]
    MaskTooWide { mask: u8, parent: String },

    /// Two ranges share addresses.
    #[error("{a} overlaps {b}")]
    Overlap { a: String, b: String },
}

// ============================================================================
// CIDR blocks
// ============================================================================

/// Widest VPC or subnet block the provider accepts.
pub const MIN_PREFIX_LEN: u8 = 16;

/// Narrowest VPC or subnet block the provider accepts.
pub const MAX_PREFIX_LEN: u8 = 28;

/// IPv4 block in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    /// Base address of the block.
    pub address: Ipv4Addr,

    /// Prefix length (e.g., 16 for /16).
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a new block, masking host bits off the address.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        Ok(Self {
            address: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.0.0.0/16").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this block.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.address
    }

    /// Check if another block lies entirely within this one.
    pub fn contains_block(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_len >= self.prefix_len && self.contains(other.address)
    }

    /// Check if two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains_block(other) || other.contains_block(self)
    }

    /// Number of addresses in this block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

/// Mask an IPv4 address to a prefix length.
fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else if prefix_len >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - prefix_len)
    };
    Ipv4Addr::from(bits & mask)
}

// ============================================================================
// Subnet carving
// ============================================================================

/// Sequential subnet allocator.
///
/// Hands out aligned child blocks in address order, the same layout the
/// provisioning engine produces for an evenly split VPC.
#[derive(Debug)]
pub struct SubnetCarver {
    /// Block to carve from.
    parent: Ipv4Cidr,

    /// Offset (from the parent base) of the next free address.
    next_offset: u64,
}

impl SubnetCarver {
    /// Create a new carver for a parent block.
    pub fn new(parent: Ipv4Cidr) -> Self {
        Self {
            parent,
            next_offset: 0,
        }
    }

    /// Carve the next free block with the given prefix length.
    pub fn carve(&mut self, prefix_len: u8) -> Result<Ipv4Cidr, NetworkError> {
        if prefix_len <= self.parent.prefix_len || prefix_len > 32 {
            return Err(NetworkError::MaskTooWide {
                mask: prefix_len,
                parent: self.parent.to_string(),
            });
        }

        let block_size = 1u64 << (32 - u32::from(prefix_len));
        // Round up to the block's natural alignment.
        let aligned = self.next_offset.div_ceil(block_size) * block_size;
        if aligned + block_size > self.parent.size() {
            return Err(NetworkError::PoolExhausted(self.parent.to_string()));
        }

        let base = u64::from(u32::from(self.parent.address)) + aligned;
        self.next_offset = aligned + block_size;

        Ipv4Cidr::new(Ipv4Addr::from(base as u32), prefix_len)
    }

    /// Addresses not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.parent.size().saturating_sub(self.next_offset)
    }
}

/// Verify that no two blocks overlap.
pub fn ensure_disjoint(blocks: &[Ipv4Cidr]) -> Result<(), NetworkError> {
    for (i, a) in blocks.iter().enumerate() {
        for b in &blocks[i + 1..] {
            if a.overlaps(b) {
                return Err(NetworkError::Overlap {
                    a: a.to_string(),
                    b: b.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Validate a VPC or subnet prefix length against provider limits.
pub fn validate_prefix_len(prefix_len: u8) -> Result<u8, NetworkError> {
    if !(MIN_PREFIX_LEN..=MAX_PREFIX_LEN).contains(&prefix_len) {
        return Err(NetworkError::InvalidPrefix(format!(
            "/{} (must be between /{} and /{})",
            prefix_len, MIN_PREFIX_LEN, MAX_PREFIX_LEN
        )));
    }
    Ok(prefix_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ipv4_cidr() {
        let block = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        assert_eq!(block.prefix_len, 16);
        assert_eq!(block.size(), 65536);

        assert!(block.contains("10.0.200.1".parse().unwrap()));
        assert!(!block.contains("10.1.0.1".parse().unwrap()));
    }

    #[test]
    fn test_host_bits_are_masked() {
        let block = Ipv4Cidr::from_cidr("10.0.3.7/24").unwrap();
        assert_eq!(block.to_string(), "10.0.3.0/24");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(matches!(
            Ipv4Cidr::from_cidr("10.0.0.0"),
            Err(NetworkError::InvalidPrefix(_))
        ));
        assert!(matches!(
            Ipv4Cidr::from_cidr("10.0.0/16"),
            Err(NetworkError::InvalidAddress(_))
        ));
        assert!(Ipv4Cidr::from_cidr("10.0.0.0/33").is_err());
    }

    #[test]
    fn test_carve_three_slash_24() {
        let parent = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        let mut carver = SubnetCarver::new(parent);

        let blocks: Vec<_> = (0..3).map(|_| carver.carve(24).unwrap()).collect();
        let rendered: Vec<_> = blocks.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

        assert!(ensure_disjoint(&blocks).is_ok());
        assert!(blocks.iter().all(|b| parent.contains_block(b)));
        assert_eq!(carver.remaining(), 65536 - 3 * 256);
    }

    #[test]
    fn test_carve_aligns_mixed_sizes() {
        let parent = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        let mut carver = SubnetCarver::new(parent);

        assert_eq!(carver.carve(26).unwrap().to_string(), "10.0.0.0/26");
        // A /24 cannot start at .64, so it moves to the next /24 boundary.
        assert_eq!(carver.carve(24).unwrap().to_string(), "10.0.1.0/24");
    }

    #[test]
    fn test_carve_exhaustion() {
        let parent = Ipv4Cidr::from_cidr("10.0.0.0/23").unwrap();
        let mut carver = SubnetCarver::new(parent);

        assert!(carver.carve(24).is_ok());
        assert!(carver.carve(24).is_ok());
        assert!(matches!(
            carver.carve(24),
            Err(NetworkError::PoolExhausted(_))
        ));
    }

    #[test]
    fn test_carve_rejects_wider_mask() {
        let parent = Ipv4Cidr::from_cidr("10.0.0.0/24").unwrap();
        let mut carver = SubnetCarver::new(parent);
        assert!(matches!(
            carver.carve(16),
            Err(NetworkError::MaskTooWide { mask: 16, .. })
        ));
    }

    #[test]
    fn test_overlap_detection() {
        let a = Ipv4Cidr::from_cidr("10.0.0.0/23").unwrap();
        let b = Ipv4Cidr::from_cidr("10.0.1.0/24").unwrap();
        let c = Ipv4Cidr::from_cidr("10.0.2.0/24").unwrap();

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(ensure_disjoint(&[a, b]).is_err());
        assert!(ensure_disjoint(&[a, c]).is_ok());
    }

    #[test]
    fn test_prefix_limits() {
        assert!(validate_prefix_len(24).is_ok());
        assert!(validate_prefix_len(16).is_ok());
        assert!(validate_prefix_len(28).is_ok());
        assert!(validate_prefix_len(8).is_err());
        assert!(validate_prefix_len(15).is_err());
        assert!(validate_prefix_len(29).is_err());
    }

    proptest! {
        #[test]
        fn prop_carved_blocks_are_contained_and_disjoint(
            masks in proptest::collection::vec(20u8..=28, 1..8)
        ) {
            let parent = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
            let mut carver = SubnetCarver::new(parent);
            let blocks: Vec<_> = masks.iter().map(|m| carver.carve(*m).unwrap()).collect();

            prop_assert!(blocks.iter().all(|b| parent.contains_block(b)));
            prop_assert!(ensure_disjoint(&blocks).is_ok());
        }
    }
}
