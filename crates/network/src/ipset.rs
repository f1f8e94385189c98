//! Prefix bifurcation, siblings, and a `BTreeSet`-backed set of non-overlapping
//! prefixes, adapted from `carbide-network`'s `ip::ipset`/`ip::prefix`
//! modules. C7's subnet auto-allocator walks a set of these to find the next
//! free block of a requested size.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::address::{self, AddressError};
use crate::address_family::{AddressFamily, IdentifyAddressFamily};

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum PrefixError {
    #[error("prefix {0} is already maximally specific and cannot be bifurcated")]
    AlreadyHost(IpNet),

    #[error("{0} is not in canonical form (host bits set)")]
    NotCanonical(IpNet),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Require that `net`'s address is the network address (no set host bits),
/// the way the teacher's `IpPrefix` constructor does.
pub fn require_canonical(net: IpNet) -> Result<IpNet, PrefixError> {
    let canon = IpNet::new(net.network(), net.prefix_len()).expect("prefix_len already valid");
    if canon.addr() != net.addr() {
        return Err(PrefixError::NotCanonical(net));
    }
    Ok(net)
}

/// Split `net` into its two immediate children (e.g. a /24 into two /25s).
pub fn bifurcate(net: IpNet) -> Result<(IpNet, IpNet), PrefixError> {
    let max_bits = net.address_family().bits();
    if net.prefix_len() >= max_bits {
        return Err(PrefixError::AlreadyHost(net));
    }
    let child_len = net.prefix_len() + 1;
    let first = IpNet::new(net.network(), child_len).expect("child_len <= max_bits");
    let half_size = half_size_offset(net);
    let second_addr = address::plus(net.network(), half_size)?;
    let second = IpNet::new(second_addr, child_len).expect("child_len <= max_bits");
    Ok((first, second))
}

fn half_size_offset(net: IpNet) -> i64 {
    let max_bits = net.address_family().bits() as u32;
    let host_bits = max_bits - net.prefix_len() as u32 - 1;
    // Subnet auto-allocation never deals with anything wider than a /16 in
    // v4 or a /48 equivalent in v6, so this always fits in i64.
    1i64 << host_bits.min(62)
}

/// The other half of `net`'s parent — the block that, together with `net`,
/// forms the immediate parent prefix.
pub fn sibling(net: IpNet) -> Result<IpNet, PrefixError> {
    if net.prefix_len() == 0 {
        return Err(PrefixError::AlreadyHost(net));
    }
    let offset = half_size_offset(IpNet::new(net.network(), net.prefix_len() - 1).unwrap());
    let addr = net.addr();
    let sibling_addr = if is_lower_half(net) {
        address::plus(addr, offset)?
    } else {
        address::minus(addr, offset)?
    };
    Ok(IpNet::new(sibling_addr, net.prefix_len()).expect("same prefix length"))
}

fn is_lower_half(net: IpNet) -> bool {
    match net.addr() {
        IpAddr::V4(v4) => {
            let host_bits = 32 - net.prefix_len() as u32;
            if host_bits == 0 {
                return true;
            }
            (u32::from(v4) >> (host_bits - 1)) & 1 == 0
        }
        IpAddr::V6(v6) => {
            let host_bits = 128 - net.prefix_len() as u32;
            if host_bits == 0 {
                return true;
            }
            (u128::from(v6) >> (host_bits - 1)) & 1 == 0
        }
    }
}

/// Two adjacent, equal-size prefixes that share a parent: merge them back
/// into that parent. Returns `None` if they aren't aggregable.
pub fn try_aggregate(a: IpNet, b: IpNet) -> Option<IpNet> {
    if a.prefix_len() != b.prefix_len() || a.prefix_len() == 0 {
        return None;
    }
    let parent = IpNet::new(a.network(), a.prefix_len() - 1).ok()?;
    if !parent.contains(&b.addr()) {
        return None;
    }
    let (low, high) = bifurcate(parent).ok()?;
    if (low == a && high == b) || (low == b && high == a) {
        Some(parent)
    } else {
        None
    }
}

/// A set of non-overlapping prefixes, used to track which blocks of an
/// address plan are still free.
#[derive(Debug, Clone, Default)]
pub struct PrefixSet {
    prefixes: BTreeSet<IpNet>,
}

impl PrefixSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, net: IpNet) {
        self.prefixes.insert(net);
    }

    pub fn remove(&mut self, net: &IpNet) -> bool {
        self.prefixes.remove(net)
    }

    pub fn contains(&self, net: &IpNet) -> bool {
        self.prefixes
            .iter()
            .any(|existing| existing.prefix_len() <= net.prefix_len() && existing.contains(&net.addr()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpNet> {
        self.prefixes.iter()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Repeatedly merge any pair of aggregable siblings until none remain.
    pub fn aggregate(&mut self) {
        loop {
            let mut merged = None;
            'outer: for a in self.prefixes.iter() {
                for b in self.prefixes.iter() {
                    if a == b {
                        continue;
                    }
                    if let Some(parent) = try_aggregate(*a, *b) {
                        merged = Some((*a, *b, parent));
                        break 'outer;
                    }
                }
            }
            match merged {
                Some((a, b, parent)) => {
                    self.prefixes.remove(&a);
                    self.prefixes.remove(&b);
                    self.prefixes.insert(parent);
                }
                None => break,
            }
        }
    }

    /// Remove the first prefix of exactly `prefix_len` found via recursive
    /// bifurcation of any larger free block, returning it. Mirrors how the
    /// IP allocator carves a concrete subnet out of free space on demand.
    pub fn take_of_size(&mut self, family: AddressFamily, prefix_len: u8) -> Option<IpNet> {
        let candidate = self
            .prefixes
            .iter()
            .find(|p| p.address_family() == family && p.prefix_len() <= prefix_len)
            .copied()?;
        self.prefixes.remove(&candidate);
        let mut current = candidate;
        while current.prefix_len() < prefix_len {
            let (first, second) = bifurcate(current).expect("prefix_len < max_bits");
            self.prefixes.insert(second);
            current = first;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn bifurcate_splits_in_half() {
        let net = IpNet::from_str("10.0.0.0/24").unwrap();
        let (a, b) = bifurcate(net).unwrap();
        assert_eq!(a, IpNet::from_str("10.0.0.0/25").unwrap());
        assert_eq!(b, IpNet::from_str("10.0.0.128/25").unwrap());
    }

    #[test]
    fn sibling_is_involutive() {
        let net = IpNet::from_str("10.0.0.128/25").unwrap();
        let sib = sibling(net).unwrap();
        assert_eq!(sib, IpNet::from_str("10.0.0.0/25").unwrap());
        assert_eq!(sibling(sib).unwrap(), net);
    }

    #[test]
    fn aggregate_merges_siblings() {
        let a = IpNet::from_str("10.0.0.0/25").unwrap();
        let b = IpNet::from_str("10.0.0.128/25").unwrap();
        assert_eq!(try_aggregate(a, b), Some(IpNet::from_str("10.0.0.0/24").unwrap()));
        assert_eq!(try_aggregate(a, a), None);
    }

    #[test]
    fn take_of_size_carves_out_subnet() {
        let mut set = PrefixSet::new();
        set.add(IpNet::from_str("10.0.0.0/24").unwrap());
        let taken = set.take_of_size(AddressFamily::V4, 26).unwrap();
        assert_eq!(taken, IpNet::from_str("10.0.0.0/26").unwrap());
        assert_eq!(set.len(), 2);
        assert!(set.iter().any(|p| *p == IpNet::from_str("10.0.0.64/26").unwrap()));
        assert!(set.iter().any(|p| *p == IpNet::from_str("10.0.0.128/25").unwrap()));
    }

    #[test]
    fn prefix_set_roundtrips_through_aggregate() {
        let mut set = PrefixSet::new();
        set.add(IpNet::from_str("10.0.0.0/25").unwrap());
        set.add(IpNet::from_str("10.0.0.128/25").unwrap());
        set.aggregate();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&IpNet::from_str("10.0.0.0/24").unwrap()));
    }
}
