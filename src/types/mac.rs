//! Bridge hardware address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// A bridge's hardware (MAC) address.
///
/// Bridges report their address without separators (`ACCF23A1B2C3`) while
/// persisted device data usually carries the colon form. Both parse to the
/// same canonical value, so registry lookups do not depend on formatting.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use milight_rs::MacAddress;
///
/// let a = MacAddress::from_str("ac:cf:23:a1:b2:c3").unwrap();
/// let b = MacAddress::from_str("ACCF23A1B2C3").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "AC:CF:23:A1:B2:C3");
/// assert!(MacAddress::from_str("ACCF23").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let digits: Vec<u8> = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| Error::InvalidMac(s.to_string()))?;

        if digits.len() != 12 {
            return Err(Error::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, pair) in octets.iter_mut().zip(digits.chunks(2)) {
            *octet = (pair[0] << 4) | pair[1];
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}
