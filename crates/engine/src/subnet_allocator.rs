//! Subnet auto-allocator (C7): two stream stages over the private address
//! plan — adjacent-pair detection, then available-prefix emission — per
//! spec.md §4.7.
//!
//! There is no teacher module for this; the stream-stage shape is new logic
//! grounded on [`netreg_network::private_space`]'s candidate-walking
//! iterator, itself built in the teacher's idiom (small iterator adapters
//! over [`crate::error`]-flavored results rather than a generic stream
//! crate).

use std::cmp::Ordering;
use std::net::IpAddr;

use ipnet::IpNet;
use netreg_network::address::{self, AddressError};
use netreg_network::address_family::{AddressFamily, IdentifyAddressFamily};
use netreg_network::private_space;

use crate::error::EngineError;

/// Fixed per spec.md §4.7.
pub const MAX_CANDIDATES: usize = 16;

/// A sliding window of one or two subnets, as emitted by [`SubnetPairStream`].
#[derive(Debug, Clone, Copy)]
pub struct SubnetPair {
    pub first: IpNet,
    pub second: Option<IpNet>,
}

/// Consumes an ordered stream of existing subnets and emits a sliding window
/// of two. If only one subnet was ever received, emits a singleton window
/// once the input closes.
pub struct SubnetPairStream<I> {
    inner: I,
    prev: Option<IpNet>,
    emitted_any: bool,
    closed: bool,
}

impl<I: Iterator<Item = IpNet>> SubnetPairStream<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            prev: None,
            emitted_any: false,
            closed: false,
        }
    }
}

impl<I: Iterator<Item = IpNet>> Iterator for SubnetPairStream<I> {
    type Item = SubnetPair;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next() {
                Some(next) => match self.prev.replace(next) {
                    Some(prev) => {
                        self.emitted_any = true;
                        return Some(SubnetPair {
                            first: prev,
                            second: Some(next),
                        });
                    }
                    None => continue,
                },
                None => {
                    if !self.closed {
                        self.closed = true;
                        if !self.emitted_any {
                            if let Some(prev) = self.prev.take() {
                                return Some(SubnetPair { first: prev, second: None });
                            }
                        }
                    }
                    return None;
                }
            }
        }
    }
}

/// The address immediately following `addr` within the private address
/// plan: ordinary `+1` inside a block, or a hop to the start of the next
/// block if `addr` is the last address of its block. `None` if `addr` is the
/// last address of the last block.
fn plan_next(addr: IpAddr, family: AddressFamily) -> Result<Option<IpAddr>, AddressError> {
    let plan = private_space::address_plan(family);
    let idx = plan.iter().position(|space| space.contains(&addr));
    let Some(idx) = idx else {
        return Ok(None);
    };
    let space = plan[idx];
    if addr == space.broadcast() {
        Ok(plan.get(idx + 1).map(|next| next.network()))
    } else {
        address::plus(addr, 1).map(Some)
    }
}

pub(crate) fn overlaps(a: IpNet, b: IpNet) -> bool {
    address::compare(a.network(), b.broadcast()) != Ordering::Greater
        && address::compare(b.network(), a.broadcast()) != Ordering::Greater
}

fn is_adjacent(a: IpNet, b: IpNet) -> Result<bool, AddressError> {
    Ok(plan_next(a.broadcast(), a.address_family())?
        .map(|next| next == b.network())
        .unwrap_or(false))
}

fn gap_candidates(
    a: IpNet,
    b: IpNet,
    family: AddressFamily,
    prefix_len: u8,
) -> Result<Vec<IpNet>, EngineError> {
    if overlaps(a, b) || is_adjacent(a, b)? {
        return Ok(vec![]);
    }
    let Some(start) = plan_next(a.broadcast(), family)? else {
        return Ok(vec![]);
    };
    let boundary = b.network();
    let candidates = private_space::candidate_subnets(family, prefix_len, Some(start))
        .map_err(|e| EngineError::invalid("prefix_len", "INVALID_PREFIX_LEN", e.to_string()))?
        .take_while(|c| address::compare(c.broadcast(), boundary) == Ordering::Less)
        .take(MAX_CANDIDATES)
        .collect();
    Ok(candidates)
}

fn candidates_before(subnet: IpNet, family: AddressFamily, prefix_len: u8) -> Result<Vec<IpNet>, EngineError> {
    let boundary = subnet.network();
    let candidates = private_space::candidate_subnets(family, prefix_len, None)
        .map_err(|e| EngineError::invalid("prefix_len", "INVALID_PREFIX_LEN", e.to_string()))?
        .take_while(|c| address::compare(c.broadcast(), boundary) == Ordering::Less)
        .take(MAX_CANDIDATES)
        .collect();
    Ok(candidates)
}

fn candidates_after(subnet: IpNet, family: AddressFamily, prefix_len: u8) -> Result<Vec<IpNet>, EngineError> {
    let Some(start) = plan_next(subnet.broadcast(), family)? else {
        return Ok(vec![]);
    };
    let candidates = private_space::candidate_subnets(family, prefix_len, Some(start))
        .map_err(|e| EngineError::invalid("prefix_len", "INVALID_PREFIX_LEN", e.to_string()))?
        .take(MAX_CANDIDATES)
        .collect();
    Ok(candidates)
}

/// Auto-allocate up to [`MAX_CANDIDATES`] candidate subnets of `prefix_len`
/// for `family`, given the subnets already in use. `existing` need not be
/// sorted or pre-filtered by family.
pub fn available_subnets(
    existing: &[IpNet],
    family: AddressFamily,
    prefix_len: u8,
) -> Result<Vec<IpNet>, EngineError> {
    let mut sorted: Vec<IpNet> = existing
        .iter()
        .copied()
        .filter(|n| n.address_family() == family)
        .collect();
    sorted.sort_by(|a, b| address::compare(a.network(), b.network()));

    if sorted.is_empty() {
        let candidates = private_space::candidate_subnets(family, prefix_len, None)
            .map_err(|e| EngineError::invalid("prefix_len", "INVALID_PREFIX_LEN", e.to_string()))?
            .take(MAX_CANDIDATES)
            .collect();
        return Ok(candidates);
    }

    let mut out = Vec::new();
    for pair in SubnetPairStream::new(sorted.iter().copied()) {
        if out.len() >= MAX_CANDIDATES {
            break;
        }
        if let Some(second) = pair.second {
            out.extend(gap_candidates(pair.first, second, family, prefix_len)?);
            out.truncate(MAX_CANDIDATES);
        }
    }

    if out.len() < MAX_CANDIDATES {
        let smallest = *sorted.first().unwrap();
        out.extend(candidates_before(smallest, family, prefix_len)?);
        out.truncate(MAX_CANDIDATES);
    }
    if out.len() < MAX_CANDIDATES {
        let largest = *sorted.last().unwrap();
        out.extend(candidates_after(largest, family, prefix_len)?);
        out.truncate(MAX_CANDIDATES);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn scenario_5_no_existing_subnets_starts_at_10_0_0_0() {
        let result = available_subnets(&[], AddressFamily::V4, 24).unwrap();
        assert_eq!(result.len(), 16);
        assert_eq!(result[0], IpNet::from_str("10.0.0.0/24").unwrap());
        assert_eq!(result[15], IpNet::from_str("10.0.15.0/24").unwrap());
    }

    #[test]
    fn fills_a_gap_between_two_existing_subnets() {
        let existing = vec![
            IpNet::from_str("10.0.0.0/24").unwrap(),
            IpNet::from_str("10.0.5.0/24").unwrap(),
        ];
        let result = available_subnets(&existing, AddressFamily::V4, 24).unwrap();
        assert!(result.contains(&IpNet::from_str("10.0.1.0/24").unwrap()));
        assert!(!result.contains(&IpNet::from_str("10.0.0.0/24").unwrap()));
    }

    #[test]
    fn single_existing_subnet_yields_candidates_on_both_sides() {
        let existing = vec![IpNet::from_str("10.0.5.0/24").unwrap()];
        let result = available_subnets(&existing, AddressFamily::V4, 24).unwrap();
        assert!(result.contains(&IpNet::from_str("10.0.0.0/24").unwrap()));
        assert!(result.contains(&IpNet::from_str("10.0.6.0/24").unwrap()));
    }

    #[test]
    fn adjacent_subnets_leave_no_gap() {
        let existing = vec![
            IpNet::from_str("10.0.0.0/24").unwrap(),
            IpNet::from_str("10.0.1.0/24").unwrap(),
        ];
        let result = available_subnets(&existing, AddressFamily::V4, 24).unwrap();
        assert!(!result.contains(&IpNet::from_str("10.0.1.0/24").unwrap()));
        assert!(!result.contains(&IpNet::from_str("10.0.0.0/24").unwrap()));
    }

    #[test]
    fn pair_stream_emits_singleton_on_single_input() {
        let subnets = vec![IpNet::from_str("10.0.0.0/24").unwrap()];
        let pairs: Vec<_> = SubnetPairStream::new(subnets.into_iter()).collect();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].second.is_none());
    }

    #[test]
    fn pair_stream_emits_sliding_windows() {
        let subnets = vec![
            IpNet::from_str("10.0.0.0/24").unwrap(),
            IpNet::from_str("10.0.1.0/24").unwrap(),
            IpNet::from_str("10.0.2.0/24").unwrap(),
        ];
        let pairs: Vec<_> = SubnetPairStream::new(subnets.into_iter()).collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.second.is_some()));
    }
}
