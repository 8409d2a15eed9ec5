use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::types::{MacAddress, ZoneType};

/// All error types that can occur when discovering or commanding bridges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A numeric input was outside its accepted range.
    #[error("validation error: {parameter} {reason}")]
    Validation { parameter: String, reason: String },

    /// The zone's type has no frame for the requested operation.
    #[error("{operation} is not supported for zone type {zone_type}")]
    NotSupportedForType {
        operation: &'static str,
        zone_type: ZoneType,
    },

    /// A bridge candidate was registered without an IP address.
    #[error("missing_bridge_ip")]
    MissingBridgeIp,

    /// A bridge candidate was registered without a hardware address.
    #[error("missing_bridge_mac")]
    MissingBridgeMac,

    /// A hardware address string could not be parsed.
    #[error("invalid hardware address {0:?}")]
    InvalidMac(String),

    /// No registered bridge matched a lookup.
    #[error("could_not_find_bridge {0}")]
    CouldNotFindBridge(MacAddress),

    /// A lookup still failed after running a discovery pass.
    #[error("bridge_not_found_after_discovering {0}")]
    BridgeNotFoundAfterDiscovering(MacAddress),

    /// The bridge has no zone in the requested slot.
    #[error("zone {zone_type} {number} not found")]
    ZoneNotFound { zone_type: ZoneType, number: u8 },

    /// The bridge was destroyed and no longer accepts commands.
    #[error("bridge {0} was destroyed")]
    BridgeDestroyed(MacAddress),

    /// The batch carrying a command failed to reach the bridge.
    #[error("transmission to bridge {mac} failed: {reason}")]
    Transmission { mac: MacAddress, reason: String },

    /// A v6 bridge did not answer the session handshake properly.
    #[error("session handshake with {ip} failed: {reason}")]
    SessionHandshake { ip: Ipv4Addr, reason: String },

    /// A shared discovery pass failed.
    #[error("discovery failed: {0}")]
    Discovery(#[source] Arc<Error>),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new validation error
    pub fn validation(parameter: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn not_supported(operation: &'static str, zone_type: ZoneType) -> Self {
        Error::NotSupportedForType {
            operation,
            zone_type,
        }
    }

    /// Create a new transmission error
    pub fn transmission(mac: &MacAddress, reason: impl Into<String>) -> Self {
        Error::Transmission {
            mac: *mac,
            reason: reason.into(),
        }
    }

    /// Create a new session handshake error
    pub fn handshake(ip: Ipv4Addr, reason: impl Into<String>) -> Self {
        Error::SessionHandshake {
            ip,
            reason: reason.into(),
        }
    }

    /// Whether the error describes bad caller input rather than a runtime failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::NotSupportedForType { .. }
                | Error::MissingBridgeIp
                | Error::MissingBridgeMac
                | Error::InvalidMac(_)
        )
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// Checks that a unit-interval input is finite and within `0.0..=1.0`.
pub(crate) fn check_unit(parameter: &str, value: f64) -> Result<f64, Error> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::validation(
            parameter,
            format!("must be within 0..=1, got {value}"),
        ))
    }
}
