//! Address family tagging, adapted from `carbide-network`'s
//! `ip::address_family` module.

use std::net::IpAddr;

use ipnet::IpNet;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn bits(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }
}

pub trait IdentifyAddressFamily {
    fn address_family(&self) -> AddressFamily;
}

impl IdentifyAddressFamily for IpAddr {
    fn address_family(&self) -> AddressFamily {
        match self {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl IdentifyAddressFamily for IpNet {
    fn address_family(&self) -> AddressFamily {
        match self {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tags_v4_and_v6() {
        assert_eq!(
            IpAddr::from_str("10.0.0.1").unwrap().address_family(),
            AddressFamily::V4
        );
        assert_eq!(
            IpAddr::from_str("fd00::1").unwrap().address_family(),
            AddressFamily::V6
        );
    }
}
