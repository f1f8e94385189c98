//! IPv4/IPv6/MAC address arithmetic.
//!
//! This is the one crate every other crate in the workspace depends on for
//! touching an address: parsing, offset arithmetic, subnet containment,
//! netmask conversion, prefix bifurcation, and the private address plan used
//! by subnet auto-allocation. Adapted from `carbide-network`'s `ip` module.

pub mod address;
pub mod address_family;
pub mod ipset;
pub mod private_space;

pub use address::{AddressError, Mac};
pub use address_family::{AddressFamily, IdentifyAddressFamily};
pub use ipset::{PrefixError, PrefixSet};
