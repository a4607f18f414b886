//! Subnet allocation.
//!
//! An [`AddressPool`] hands out one subnet per call, walking forward through a
//! supernet. Clusters that descend from a common ancestor share the ancestor's
//! pool by [`PoolId`], so every cluster in a tree ends up with its own subnet.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Index of a pool inside the topology arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub usize);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool{}", self.0)
    }
}

/// Errors raised by address allocation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("requested {requested} hosts but {network}/{prefix_len} holds only {capacity}")]
    CapacityExceeded {
        requested: usize,
        capacity: u64,
        network: Ipv4Addr,
        prefix_len: u8,
    },

    #[error("address space {supernet}/{supernet_prefix} has no free subnet left")]
    AddressSpaceExhausted { supernet: Ipv4Addr, supernet_prefix: u8 },

    #[error("invalid prefix /{prefix_len} inside supernet /{supernet_prefix}")]
    InvalidPrefix { prefix_len: u8, supernet_prefix: u8 },

    #[error("netmask {0} is not contiguous")]
    InvalidMask(Ipv4Addr),
}

/// A contiguous run of host addresses inside one subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    pub first_host: Ipv4Addr,
    pub host_count: u32,
}

impl AddressRange {
    pub fn is_empty(&self) -> bool {
        self.host_count == 0
    }

    /// Host addresses in allocation order
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let start = u32::from(self.first_host);
        (0..self.host_count).map(move |i| Ipv4Addr::from(start + i))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let start = u64::from(u32::from(self.first_host));
        let value = u64::from(u32::from(addr));
        value >= start && value < start + u64::from(self.host_count)
    }

    /// True when the two host runs share at least one address
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (a_start, a_end) = self.bounds();
        let (b_start, b_end) = other.bounds();
        a_start < b_end && b_start < a_end
    }

    /// True when the enclosing subnets intersect, independent of host counts
    pub fn subnet_overlaps(&self, other: &AddressRange) -> bool {
        let (a_start, a_end) = subnet_bounds(self.network, self.prefix_len);
        let (b_start, b_end) = subnet_bounds(other.network, other.prefix_len);
        a_start < b_end && b_start < a_end
    }

    fn bounds(&self) -> (u64, u64) {
        let start = u64::from(u32::from(self.first_host));
        (start, start + u64::from(self.host_count))
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)?;
        if !self.is_empty() {
            write!(f, " ({} hosts from {})", self.host_count, self.first_host)?;
        }
        Ok(())
    }
}

fn subnet_bounds(network: Ipv4Addr, prefix_len: u8) -> (u64, u64) {
    let start = u64::from(u32::from(network));
    (start, start + (1u64 << (32 - u32::from(prefix_len))))
}

/// Converts a dotted netmask such as `255.255.255.0` to a prefix length
pub fn mask_to_prefix(mask: Ipv4Addr) -> Result<u8, PoolError> {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(PoolError::InvalidMask(mask));
    }
    Ok(prefix as u8)
}

fn network_of(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    Ipv4Addr::from(u32::from(addr) & mask)
}

/// Allocates non-overlapping subnets on demand.
#[derive(Debug, Clone)]
pub struct AddressPool {
    base: Ipv4Addr,
    prefix_len: u8,
    supernet_prefix: u8,
    cursor: u64,
}

impl AddressPool {
    /// Creates a pool whose first subnet is `base/prefix_len`, bounded by the
    /// `/supernet_prefix` block that contains `base`.
    pub fn new(base: Ipv4Addr, prefix_len: u8, supernet_prefix: u8) -> Result<Self, PoolError> {
        if prefix_len == 0 || prefix_len > 32 || supernet_prefix > prefix_len {
            return Err(PoolError::InvalidPrefix { prefix_len, supernet_prefix });
        }
        Ok(Self {
            base: network_of(base, prefix_len),
            prefix_len,
            supernet_prefix,
            cursor: 0,
        })
    }

    /// Same as [`AddressPool::new`] with the subnet given as a dotted netmask
    pub fn with_mask(base: Ipv4Addr, mask: Ipv4Addr, supernet_prefix: u8) -> Result<Self, PoolError> {
        Self::new(base, mask_to_prefix(mask)?, supernet_prefix)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Index of the next free subnet
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of usable hosts in a single subnet of this pool
    pub fn host_capacity(&self) -> u64 {
        match self.prefix_len {
            32 => 1,
            31 => 2,
            p => (1u64 << (32 - u32::from(p))) - 2,
        }
    }

    /// Network address the next allocation will draw from
    pub fn current_network(&self) -> Ipv4Addr {
        Ipv4Addr::from((u64::from(u32::from(self.base)) + self.cursor * self.subnet_size()) as u32)
    }

    /// Total number of subnets that fit between `base` and the end of the supernet
    pub fn subnet_limit(&self) -> u64 {
        let supernet = network_of(self.base, self.supernet_prefix);
        let supernet_end = u64::from(u32::from(supernet)) + (1u64 << (32 - u32::from(self.supernet_prefix)));
        (supernet_end - u64::from(u32::from(self.base))) / self.subnet_size()
    }

    /// Returns `host_count` contiguous host addresses from the current subnet,
    /// then moves to the next subnet. On error the cursor does not move.
    pub fn allocate(&mut self, host_count: usize) -> Result<AddressRange, PoolError> {
        if self.cursor >= self.subnet_limit() {
            return Err(self.exhausted());
        }
        let capacity = self.host_capacity();
        let network = self.current_network();
        if host_count as u64 > capacity {
            return Err(PoolError::CapacityExceeded {
                requested: host_count,
                capacity,
                network,
                prefix_len: self.prefix_len,
            });
        }
        let first_offset = if self.prefix_len >= 31 { 0 } else { 1 };
        let range = AddressRange {
            network,
            prefix_len: self.prefix_len,
            first_host: Ipv4Addr::from(u32::from(network) + first_offset),
            host_count: host_count as u32,
        };
        self.cursor += 1;
        log::debug!("Allocated {}", range);
        Ok(range)
    }

    /// Skips to the next subnet without handing out any hosts and returns the
    /// network address that is now current.
    pub fn new_network(&mut self) -> Result<Ipv4Addr, PoolError> {
        if self.cursor >= self.subnet_limit() {
            return Err(self.exhausted());
        }
        self.cursor += 1;
        Ok(self.current_network())
    }

    fn subnet_size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    fn exhausted(&self) -> PoolError {
        PoolError::AddressSpaceExhausted {
            supernet: network_of(self.base, self.supernet_prefix),
            supernet_prefix: self.supernet_prefix,
        }
    }
}
