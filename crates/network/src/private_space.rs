//! The private address plan used by C7's subnet auto-allocator: the three
//! RFC 1918 ranges treated as one contiguous space, and `fd00::/8` for v6.
//!
//! There is no teacher module for this — `carbide-network` allocates out of
//! tenant-specified VPC CIDRs rather than a fixed private plan — so this is
//! new logic in the teacher's idiom, built on the arithmetic in
//! [`crate::address`] and [`crate::ipset`].

use std::net::IpAddr;

use ipnet::IpNet;

use crate::address::{self, AddressError};
use crate::address_family::{AddressFamily, IdentifyAddressFamily};

/// The three RFC 1918 blocks in ascending order, plus the one-address gaps
/// between them collapsed away: `10/8` is immediately followed by `172.16/12`
/// (i.e. `172.16.0.0 - 1 == 10.255.255.255` is NOT true — they are not
/// actually adjacent on the wire, but the address *plan* treats them as one
/// logical sequence of candidate blocks to walk when auto-allocating).
pub fn address_plan(family: AddressFamily) -> Vec<IpNet> {
    match family {
        AddressFamily::V4 => address::rfc1918_spaces().to_vec(),
        AddressFamily::V6 => vec![address::unique_local_space()],
    }
}

/// Whether `addr` falls in the private address plan for its family.
pub fn is_private(addr: IpAddr) -> bool {
    match addr.address_family() {
        AddressFamily::V4 => address::rfc1918_spaces()
            .iter()
            .any(|space| space.contains(&addr)),
        AddressFamily::V6 => address::unique_local_space().contains(&addr),
    }
}

/// Walk the address plan for `family` yielding successive candidate subnets
/// of `prefix_len`, starting at `start` (or the beginning of the plan if
/// `start` is `None`). Used by C7 to generate the bounded list of candidate
/// subnets before intersecting with already-allocated space.
pub fn candidate_subnets(
    family: AddressFamily,
    prefix_len: u8,
    start: Option<IpAddr>,
) -> Result<CandidateSubnets, AddressError> {
    let plan = address_plan(family);
    let (space_idx, next) = match start {
        Some(addr) => {
            let idx = plan
                .iter()
                .position(|space| space.contains(&addr))
                .ok_or_else(|| AddressError::Parse(format!("{addr} is outside the private address plan")))?;
            (idx, addr)
        }
        None => (0, plan[0].network()),
    };
    Ok(CandidateSubnets {
        plan,
        space_idx,
        next,
        prefix_len,
    })
}

/// Lazily yields candidate subnets across the whole private address plan,
/// hopping from one RFC 1918 range to the next once the current one is
/// exhausted.
pub struct CandidateSubnets {
    plan: Vec<IpNet>,
    space_idx: usize,
    next: IpAddr,
    prefix_len: u8,
}

impl Iterator for CandidateSubnets {
    type Item = IpNet;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let space = self.plan.get(self.space_idx)?;
            if !space.contains(&self.next) {
                self.space_idx += 1;
                if let Some(next_space) = self.plan.get(self.space_idx) {
                    self.next = next_space.network();
                }
                continue;
            }
            let candidate = IpNet::new(self.next, self.prefix_len).ok()?;
            if !space.contains(&candidate.broadcast()) {
                self.space_idx += 1;
                if let Some(next_space) = self.plan.get(self.space_idx) {
                    self.next = next_space.network();
                }
                continue;
            }
            let stride = subnet_size(self.prefix_len, space.address_family());
            self.next = match address::plus(self.next, stride) {
                Ok(addr) => addr,
                Err(_) => {
                    self.space_idx += 1;
                    if let Some(next_space) = self.plan.get(self.space_idx) {
                        self.next = next_space.network();
                    }
                    return Some(candidate);
                }
            };
            return Some(candidate);
        }
    }
}

fn subnet_size(prefix_len: u8, family: AddressFamily) -> i64 {
    let host_bits = (family.bits() - prefix_len) as u32;
    1i64 << host_bits.min(32)
}

/// Reconstructs an `IpNet` the way the API layer needs it when a caller
/// hands in a bare `"10.0.0.0"` + `/24` pair, rather than CIDR notation.
pub fn net_from_parts(addr: &str, prefix_len: u8) -> Result<IpNet, AddressError> {
    let addr = address::parse(addr)?;
    IpNet::new(addr, prefix_len).map_err(|_| AddressError::Parse(format!("{addr}/{prefix_len}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn private_matches_rfc1918() {
        assert!(is_private(address::parse("10.1.2.3").unwrap()));
        assert!(is_private(address::parse("172.20.0.1").unwrap()));
        assert!(is_private(address::parse("192.168.1.1").unwrap()));
        assert!(!is_private(address::parse("8.8.8.8").unwrap()));
    }

    #[test]
    fn private_matches_unique_local() {
        assert!(is_private(address::parse("fd12::1").unwrap()));
        assert!(!is_private(address::parse("2001:db8::1").unwrap()));
    }

    #[test]
    fn candidate_subnets_walk_sequentially_within_a_range() {
        let mut iter = candidate_subnets(AddressFamily::V4, 12, None).unwrap();
        assert_eq!(iter.next().unwrap(), IpNet::from_str("10.0.0.0/12").unwrap());
        assert_eq!(iter.next().unwrap(), IpNet::from_str("10.16.0.0/12").unwrap());
    }

    #[test]
    fn candidate_subnets_hop_from_10_8_into_172_16_12() {
        // 10.0.0.0/8 holds exactly one /8-sized candidate, so the second
        // candidate must come from the next range in the plan.
        let mut iter = candidate_subnets(AddressFamily::V4, 8, None).unwrap();
        assert_eq!(iter.next().unwrap(), IpNet::from_str("10.0.0.0/8").unwrap());
        let second = iter.next().unwrap();
        assert_eq!(second.addr(), IpAddr::from_str("172.16.0.0").unwrap());
    }

    #[test]
    fn candidate_subnets_stay_within_a_single_range_for_finer_prefixes() {
        let iter = candidate_subnets(AddressFamily::V4, 24, None).unwrap();
        let first_five: Vec<_> = iter.take(5).collect();
        assert_eq!(first_five[0], IpNet::from_str("10.0.0.0/24").unwrap());
        assert_eq!(first_five[1], IpNet::from_str("10.0.1.0/24").unwrap());
        assert_eq!(first_five[4], IpNet::from_str("10.0.4.0/24").unwrap());
    }
}
