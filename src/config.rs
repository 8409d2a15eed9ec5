//! Manager, pacing and protocol configuration.
//!
//! Every value has a default that matches what the bridges tolerate in
//! practice, so `ManagerConfig::default()` is a working setup. Durations are
//! (de)serialized as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::discovery::DiscoveryKind;
use crate::errors::Error;
use crate::types::{Generation, ZoneType};

/// Top-level configuration for a [`crate::BridgeManager`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use milight_rs::ManagerConfig;
///
/// let config = ManagerConfig::from_json(r#"{"pollIntervalMs": 10000, "pacing": {"debounceMs": 150}}"#).unwrap();
/// assert_eq!(config.poll_interval, Duration::from_secs(10));
/// assert_eq!(config.pacing.debounce, Duration::from_millis(150));
/// assert_eq!(config.pacing.frame_gap, Duration::from_millis(50));
/// assert_eq!(config.offline_threshold, 1);
/// ```
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    pub discovery: DiscoveryConfig,
    pub pacing: PacingConfig,
    pub hue_calibration: HueCalibration,
    pub v6: V6Config,
    /// Interval between liveness discovery passes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "pollIntervalMs")]
    pub poll_interval: Duration,
    /// A bridge goes offline once its consecutive misses exceed this value.
    pub offline_threshold: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            pacing: PacingConfig::default(),
            hue_calibration: HueCalibration::default(),
            v6: V6Config::default(),
            poll_interval: Duration::from_secs(30),
            offline_threshold: 1,
        }
    }
}

impl ManagerConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Error::JsonLoad)
    }
}

/// Discovery pass settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// How long a pass listens for replies.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeoutMs")]
    pub timeout: Duration,
    pub kind: DiscoveryKind,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            kind: DiscoveryKind::All,
        }
    }
}

/// Outbound command pacing.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PacingConfig {
    /// Quiet period after the last enqueue before a batch is flushed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "debounceMs")]
    pub debounce: Duration,
    /// Minimum spacing between two socket writes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "frameGapMs")]
    pub frame_gap: Duration,
    /// How often a repeatable frame is written. Step frames are always written once.
    pub command_repeat: u8,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            frame_gap: Duration::from_millis(50),
            command_repeat: 3,
        }
    }
}

/// v6 session settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct V6Config {
    /// A session unused for this long is re-established before the next send.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "sessionIdleTimeoutMs")]
    pub session_idle_timeout: Duration,
    /// How long to wait for the bridge's handshake reply.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "handshakeTimeoutMs")]
    pub handshake_timeout: Duration,
}

impl Default for V6Config {
    fn default() -> Self {
        Self {
            session_idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(1),
        }
    }
}

/// Hue zero-point offsets per bulb family, added before encoding.
///
/// The v6 defaults are rough and were never validated against hardware;
/// override them when colors come out shifted. Offsets missing from a
/// partial override keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CalibrationOverrides")]
pub struct HueCalibration {
    pub legacy: HueOffsets,
    pub v6: HueOffsets,
}

impl HueCalibration {
    pub fn offset(&self, generation: Generation, zone_type: ZoneType) -> f64 {
        let offsets = match generation {
            Generation::Legacy => &self.legacy,
            Generation::V6 => &self.v6,
        };
        offsets.get(zone_type)
    }
}

/// Offsets for one protocol generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HueOffsets {
    pub rgb: f64,
    pub rgbw: f64,
    pub rgbww: f64,
    pub bridge_light: f64,
}

impl HueOffsets {
    pub fn get(&self, zone_type: ZoneType) -> f64 {
        match zone_type {
            ZoneType::Rgb => self.rgb,
            ZoneType::Rgbw => self.rgbw,
            ZoneType::Rgbww => self.rgbww,
            ZoneType::BridgeLight => self.bridge_light,
            ZoneType::White => 0.0,
        }
    }
}

impl Default for HueCalibration {
    fn default() -> Self {
        Self {
            legacy: HueOffsets::default(),
            v6: HueOffsets {
                rgb: 0.0,
                rgbw: 0.015,
                rgbww: 0.045,
                bridge_light: 0.115,
            },
        }
    }
}

/// Deserialized form of [`HueCalibration`]: only the offsets a document
/// mentions, merged over the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalibrationOverrides {
    legacy: OffsetOverrides,
    v6: OffsetOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OffsetOverrides {
    rgb: Option<f64>,
    rgbw: Option<f64>,
    rgbww: Option<f64>,
    bridge_light: Option<f64>,
}

impl OffsetOverrides {
    fn apply(self, base: HueOffsets) -> HueOffsets {
        HueOffsets {
            rgb: self.rgb.unwrap_or(base.rgb),
            rgbw: self.rgbw.unwrap_or(base.rgbw),
            rgbww: self.rgbww.unwrap_or(base.rgbww),
            bridge_light: self.bridge_light.unwrap_or(base.bridge_light),
        }
    }
}

impl From<CalibrationOverrides> for HueCalibration {
    fn from(overrides: CalibrationOverrides) -> Self {
        let defaults = HueCalibration::default();
        Self {
            legacy: overrides.legacy.apply(defaults.legacy),
            v6: overrides.v6.apply(defaults.v6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.discovery.timeout, Duration::from_secs(3));
        assert_eq!(config.pacing.debounce, Duration::from_millis(300));
        assert_eq!(config.pacing.command_repeat, 3);
    }

    #[test]
    fn test_hue_offsets() {
        let calibration = HueCalibration::default();
        assert_eq!(calibration.offset(Generation::Legacy, ZoneType::Rgbw), 0.0);
        assert_eq!(calibration.offset(Generation::V6, ZoneType::Rgbw), 0.015);
        assert_eq!(calibration.offset(Generation::V6, ZoneType::BridgeLight), 0.115);
        assert_eq!(calibration.offset(Generation::V6, ZoneType::White), 0.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ManagerConfig::from_json(r#"{"hueCalibration": {"v6": {"rgbww": 0.05}}}"#).unwrap();
        assert_eq!(config.hue_calibration.v6.rgbww, 0.05);
        assert_eq!(config.hue_calibration.v6.rgbw, 0.015);
        assert_eq!(config.hue_calibration.v6.bridge_light, 0.115);
        assert_eq!(config.hue_calibration.legacy.rgbw, 0.0);
        assert_eq!(config.pacing.frame_gap, Duration::from_millis(50));
    }

    #[test]
    fn test_calibration_survives_serialization() {
        let mut config = ManagerConfig::default();
        config.hue_calibration.legacy.rgb = 0.2;
        let json = serde_json::to_string(&config).unwrap();
        let loaded = ManagerConfig::from_json(&json).unwrap();
        assert_eq!(loaded.hue_calibration.legacy.rgb, 0.2);
        assert_eq!(loaded.hue_calibration.v6.rgbww, 0.045);

        let empty = ManagerConfig::from_json(r#"{"hueCalibration": {}}"#).unwrap();
        assert_eq!(empty.hue_calibration.v6.rgbw, 0.015);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ManagerConfig::from_json("{\"pollIntervalMs\": \"soon\"}"),
            Err(Error::JsonLoad(_))
        ));
    }

    #[test]
    fn test_round_trip_discovery_kind() {
        let json = serde_json::to_value(ManagerConfig::default()).unwrap();
        assert_eq!(json["discovery"]["kind"], "all");
        assert_eq!(json["discovery"]["timeoutMs"], 3000);
    }
}
