//! Pure address arithmetic: parsing, comparison, offset arithmetic, netmask
//! conversion, and the RFC 1918 / unique-local nested-subnet tests.
//!
//! This mirrors the role of `carbide-network`'s `ip::prefix` module but is
//! scoped to exactly what the allocation engine needs: whole-address
//! arithmetic rather than prefix bifurcation/aggregation (that lives in
//! `ipset`).

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::IpNet;
use mac_address::MacAddress;

/// The largest offset `plus`/`minus` will accept, per spec.md §4.1.
pub const MAX_OFFSET: i64 = (1u64 << 32) as i64 - 1;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum AddressError {
    #[error("could not parse address: {0}")]
    Parse(String),

    #[error("offset {0} is outside the allowed range [-{MAX_OFFSET}, {MAX_OFFSET}]")]
    OffsetOutOfRange(i64),

    #[error("address arithmetic overflowed past the top of the address space")]
    Overflow,

    #[error("address arithmetic underflowed past the bottom of the address space")]
    Underflow,

    #[error("{0} is not a valid netmask")]
    NotANetmask(Ipv4Addr),
}

/// Parse a string or a plain integer-looking string into an [`IpAddr`].
/// Rejects the "octets"/"parts" object representations spec.md §9's open
/// question calls out — only canonical dotted/colon strings are accepted.
pub fn parse(input: &str) -> Result<IpAddr, AddressError> {
    IpAddr::from_str(input.trim()).map_err(|_| AddressError::Parse(input.to_string()))
}

fn to_u128(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(family_hint: IpAddr, value: u128) -> Result<IpAddr, AddressError> {
    match family_hint {
        IpAddr::V4(_) => {
            if value > u32::MAX as u128 {
                return Err(AddressError::Overflow);
            }
            Ok(IpAddr::V4(Ipv4Addr::from(value as u32)))
        }
        IpAddr::V6(_) => {
            if value > u128::MAX {
                return Err(AddressError::Overflow);
            }
            Ok(IpAddr::V6(Ipv6Addr::from(value)))
        }
    }
}

/// Add `n` to `addr`, failing on overflow past the top of the address
/// family's space. `n` may be negative (equivalent to `minus`).
pub fn plus(addr: IpAddr, n: i64) -> Result<IpAddr, AddressError> {
    if !(-MAX_OFFSET..=MAX_OFFSET).contains(&n) {
        return Err(AddressError::OffsetOutOfRange(n));
    }
    let base = to_u128(addr);
    if n >= 0 {
        let delta = n as u128;
        let result = base.checked_add(delta).ok_or(AddressError::Overflow)?;
        from_u128(addr, result)
    } else {
        let delta = n.unsigned_abs() as u128;
        let result = base.checked_sub(delta).ok_or(AddressError::Underflow)?;
        from_u128(addr, result)
    }
}

/// Subtract `n` from `addr`. Equivalent to `plus(addr, -n)`.
pub fn minus(addr: IpAddr, n: i64) -> Result<IpAddr, AddressError> {
    let negated = n
        .checked_neg()
        .ok_or(AddressError::OffsetOutOfRange(n))?;
    plus(addr, negated)
}

/// Compare two addresses, mapping v4 into v4-mapped-v6 space so that
/// cross-family comparisons are well defined (and always order v4 before
/// the "real" v6 range, matching `IpPrefix`'s `Ord` in the teacher).
pub fn compare(a: IpAddr, b: IpAddr) -> Ordering {
    to_v4_mapped_v6(a).cmp(&to_v4_mapped_v6(b))
}

fn to_v4_mapped_v6(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6) + (1u128 << 32),
    }
}

/// `b - a`, same-family only, bounded to `i64` (callers in this workspace
/// never diff addresses more than `MAX_OFFSET` apart).
pub fn diff(a: IpAddr, b: IpAddr) -> Result<i64, AddressError> {
    let delta = to_u128(b) as i128 - to_u128(a) as i128;
    i64::try_from(delta).map_err(|_| AddressError::OffsetOutOfRange(i64::MAX))
}

/// Whether `cidr` contains `addr`.
pub fn contains(cidr: &IpNet, addr: IpAddr) -> bool {
    cidr.contains(&addr)
}

/// Convert a prefix length to an IPv4 netmask (e.g. 24 -> 255.255.255.0).
pub fn bits_to_netmask(bits: u8) -> Result<Ipv4Addr, AddressError> {
    if bits > 32 {
        return Err(AddressError::Parse(format!("{bits} is not a valid IPv4 prefix length")));
    }
    let mask: u32 = if bits == 0 {
        0
    } else {
        u32::MAX << (32 - bits)
    };
    Ok(Ipv4Addr::from(mask))
}

/// Convert an IPv4 netmask back to a prefix length, rejecting non-contiguous
/// masks (e.g. `255.0.255.0`).
pub fn netmask_to_bits(mask: Ipv4Addr) -> Result<u8, AddressError> {
    let bits = u32::from(mask);
    let ones = bits.count_ones();
    let expected = if ones == 0 { 0 } else { u32::MAX << (32 - ones) };
    if bits != expected {
        return Err(AddressError::NotANetmask(mask));
    }
    Ok(ones as u8)
}

/// The three RFC 1918 private ranges.
pub fn rfc1918_spaces() -> [IpNet; 3] {
    [
        IpNet::from_str("10.0.0.0/8").unwrap(),
        IpNet::from_str("172.16.0.0/12").unwrap(),
        IpNet::from_str("192.168.0.0/16").unwrap(),
    ]
}

/// The IPv6 unique-local space used for fabric auto-allocation.
pub fn unique_local_space() -> IpNet {
    IpNet::from_str("fd00::/8").unwrap()
}

/// `isRFC1918(cidr)`: nested-subnet test — some private space contains
/// `cidr`'s address and is no more specific than `cidr` itself.
pub fn is_rfc1918(cidr: &IpNet) -> bool {
    rfc1918_spaces()
        .iter()
        .any(|space| nested_subnet(space, cidr))
}

/// `isUniqueLocal(cidr)`: same nested-subnet test against `fd00::/8`.
pub fn is_unique_local(cidr: &IpNet) -> bool {
    nested_subnet(&unique_local_space(), cidr)
}

fn nested_subnet(space: &IpNet, cidr: &IpNet) -> bool {
    space.contains(&cidr.addr()) && space.prefix_len() <= cidr.prefix_len()
}

/// A MAC address represented as the 48-bit integer the rest of the engine
/// works with; string form is only produced/parsed at the API boundary
/// (spec.md §4.4 / §9). Wraps [`mac_address::MacAddress`] for byte storage
/// and canonical display.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Mac(u64);

impl Mac {
    pub const MAX: u64 = (1u64 << 48) - 1;

    pub fn from_u64(value: u64) -> Result<Self, AddressError> {
        if value > Self::MAX {
            return Err(AddressError::Parse(format!(
                "{value:#x} does not fit in 48 bits"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn bytes(&self) -> [u8; 6] {
        let be = self.0.to_be_bytes();
        [be[2], be[3], be[4], be[5], be[6], be[7]]
    }

    pub fn as_mac_address(&self) -> MacAddress {
        MacAddress::new(self.bytes())
    }

    /// Accepts 12 hex digits with optional `:` or `-` separators every two
    /// digits, and nothing else (no bare `.`-grouped forms, no whitespace).
    /// `mac_address::MacAddress`'s own parser is more permissive than
    /// spec.md §4.1 allows (it also accepts `.`-grouped forms), so the
    /// separator shape is validated here before handing the bytes off.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let cleaned: String = if input.contains(':') {
            parse_separated(input, ':')?
        } else if input.contains('-') {
            parse_separated(input, '-')?
        } else {
            input.to_string()
        };

        if cleaned.len() != 12 || !cleaned.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::Parse(format!(
                "'{input}' is not a valid MAC address"
            )));
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&cleaned[i * 2..i * 2 + 2], 16)
                .map_err(|_| AddressError::Parse(format!("'{input}' is not a valid MAC address")))?;
        }
        Ok(Self::from_mac_address(MacAddress::new(bytes)))
    }

    fn from_mac_address(mac: MacAddress) -> Self {
        let bytes = mac.bytes();
        let value = u64::from_be_bytes([0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]);
        Self(value)
    }
}

fn parse_separated(input: &str, sep: char) -> Result<String, AddressError> {
    let groups: Vec<&str> = input.split(sep).collect();
    if groups.len() != 6 || groups.iter().any(|g| g.len() != 2) {
        return Err(AddressError::Parse(format!(
            "'{input}' is not a valid MAC address"
        )));
    }
    Ok(groups.concat())
}

impl fmt::Display for Mac {
    /// Colon-separated canonical form, as spec.md §4.4/§6 require at the
    /// API boundary.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Serializes/deserializes in the colon form spec.md §4.4/§9 mandates at
/// API boundaries. Internal bucket storage bypasses this (`nic_engine`
/// reads/writes the raw `u64` directly); this impl exists for `Nic`'s JSON
/// representation at the HTTP surface.
impl serde::Serialize for Mac {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Mac {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Mac::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_idempotent() {
        let a = parse("10.0.2.5").unwrap();
        assert_eq!(parse(&a.to_string()).unwrap(), a);
        let b = parse("fd00::1").unwrap();
        assert_eq!(parse(&b.to_string()).unwrap(), b);
    }

    #[test]
    fn plus_minus_roundtrip() {
        let a = parse("10.0.2.5").unwrap();
        let b = plus(a, 10).unwrap();
        assert_eq!(minus(b, 10).unwrap(), a);
    }

    #[test]
    fn plus_rejects_offset_out_of_range() {
        let a = parse("10.0.2.5").unwrap();
        assert_eq!(
            plus(a, MAX_OFFSET + 1),
            Err(AddressError::OffsetOutOfRange(MAX_OFFSET + 1))
        );
    }

    #[test]
    fn plus_overflows_at_top_of_v4_space() {
        let top = parse("255.255.255.255").unwrap();
        assert_eq!(plus(top, 1), Err(AddressError::Overflow));
    }

    #[test]
    fn minus_underflows_at_bottom_of_v4_space() {
        let bottom = parse("0.0.0.0").unwrap();
        assert_eq!(minus(bottom, 1), Err(AddressError::Underflow));
    }

    #[test]
    fn compare_orders_v4_before_v6() {
        let v4 = parse("255.255.255.255").unwrap();
        let v6 = parse("::0").unwrap();
        assert_eq!(compare(v4, v6), Ordering::Less);
    }

    #[test]
    fn netmask_roundtrip() {
        for bits in 0..=32u8 {
            let mask = bits_to_netmask(bits).unwrap();
            assert_eq!(netmask_to_bits(mask).unwrap(), bits);
        }
    }

    #[test]
    fn netmask_rejects_non_contiguous() {
        assert!(netmask_to_bits(Ipv4Addr::new(255, 0, 255, 0)).is_err());
    }

    #[test]
    fn rfc1918_is_nested_subnet() {
        let inside = IpNet::from_str("10.0.2.0/24").unwrap();
        assert!(is_rfc1918(&inside));
        let outside = IpNet::from_str("11.0.0.0/8").unwrap();
        assert!(!is_rfc1918(&outside));
        // A /7 containing 10.0.0.0/8 is NOT nested inside it (it's broader).
        let too_broad = IpNet::from_str("10.0.0.0/7").unwrap();
        assert!(!is_rfc1918(&too_broad));
    }

    #[test]
    fn unique_local_matches_fd00_8() {
        let inside = IpNet::from_str("fd12:3456::/32").unwrap();
        assert!(is_unique_local(&inside));
        let outside = IpNet::from_str("fe80::/10").unwrap();
        assert!(!is_unique_local(&outside));
    }

    #[test]
    fn mac_parse_accepts_colon_dash_and_bare() {
        let expected = Mac::from_u64(0x90b8d0173717).unwrap();
        assert_eq!(Mac::parse("90:b8:d0:17:37:17").unwrap(), expected);
        assert_eq!(Mac::parse("90-b8-d0-17-37-17").unwrap(), expected);
        assert_eq!(Mac::parse("90b8d0173717").unwrap(), expected);
    }

    #[test]
    fn mac_parse_rejects_garbage() {
        assert!(Mac::parse("not-a-mac").is_err());
        assert!(Mac::parse("90:b8:d0:17:37").is_err());
        assert!(Mac::parse("90.b8.d0.17.37.17").is_err());
    }

    #[test]
    fn mac_display_is_colon_form() {
        let mac = Mac::parse("90-B8-D0-17-37-17").unwrap();
        assert_eq!(mac.to_string(), "90:b8:d0:17:37:17");
    }
}
