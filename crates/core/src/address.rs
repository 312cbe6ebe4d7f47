//! Prefix normalization.
//!
//! Turns a variable-width prefix such as `10.0.0.0/24` or `2001:db8::/32`
//! into the first and last address of the range, rendered in a fixed-width,
//! zero-padded form so that string ordering matches numeric ordering:
//!
//! - IPv4: three-digit decimal octets joined by `.` (`010.000.000.000`)
//! - IPv6: eight four-digit lowercase hex groups joined by `:`

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::InvalidAddressError;

/// Inclusive address range in padded textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRange {
    pub min: String,
    pub max: String,
}

/// Normalize a prefix string into its padded `(min, max)` bounds.
///
/// A bare address without `/len` is treated as a host route.
pub fn normalize_prefix(prefix: &str) -> Result<AddressRange, InvalidAddressError> {
    let input = prefix.trim();
    let (addr, len) = match input.split_once('/') {
        Some((addr, len)) => (addr, Some(len)),
        None => (input, None),
    };

    let addr: IpAddr = addr
        .parse()
        .map_err(|_| InvalidAddressError::new(input, "unparseable address"))?;
    let len = match len {
        Some(len) => Some(
            len.parse::<u32>()
                .map_err(|_| InvalidAddressError::new(input, "prefix length is not a number"))?,
        ),
        None => None,
    };

    match addr {
        IpAddr::V4(v4) => {
            let len = len.unwrap_or(32);
            if len > 32 {
                return Err(InvalidAddressError::new(input, "prefix length exceeds 32"));
            }
            let bits = u32::from(v4);
            let host = u32::MAX.checked_shr(len).unwrap_or(0);
            Ok(AddressRange {
                min: pad_ipv4(Ipv4Addr::from(bits & !host)),
                max: pad_ipv4(Ipv4Addr::from(bits | host)),
            })
        }
        IpAddr::V6(v6) => {
            let len = len.unwrap_or(128);
            if len > 128 {
                return Err(InvalidAddressError::new(input, "prefix length exceeds 128"));
            }
            let bits = u128::from(v6);
            let host = u128::MAX.checked_shr(len).unwrap_or(0);
            Ok(AddressRange {
                min: pad_ipv6(Ipv6Addr::from(bits & !host)),
                max: pad_ipv6(Ipv6Addr::from(bits | host)),
            })
        }
    }
}

/// `192.168.0.1` -> `192.168.000.001`
pub fn pad_ipv4(addr: Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{a:03}.{b:03}.{c:03}.{d:03}")
}

/// `2001:db8::1` -> `2001:0db8:0000:0000:0000:0000:0000:0001`
pub fn pad_ipv6(addr: Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|s| format!("{s:04x}"))
        .collect::<Vec<_>>()
        .join(":")
}
