//! Zone families and bridge protocol generations.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The bulb family a zone addresses.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use milight_rs::ZoneType;
///
/// assert_eq!(ZoneType::from_str("RGBWW").unwrap(), ZoneType::Rgbww);
/// assert_eq!(ZoneType::BridgeLight.to_string(), "BRIDGE");
/// assert!(ZoneType::Rgbw.supports_hue());
/// assert!(!ZoneType::White.supports_hue());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter, EnumString,
)]
pub enum ZoneType {
    #[strum(serialize = "RGB")]
    #[serde(rename = "RGB")]
    Rgb,
    #[strum(serialize = "RGBW")]
    #[serde(rename = "RGBW")]
    Rgbw,
    #[strum(serialize = "RGBWW")]
    #[serde(rename = "RGBWW")]
    Rgbww,
    #[strum(serialize = "WHITE")]
    #[serde(rename = "WHITE")]
    White,
    /// The indicator light built into v6 bridges.
    #[strum(serialize = "BRIDGE")]
    #[serde(rename = "BRIDGE")]
    BridgeLight,
}

impl ZoneType {
    pub fn supports_hue(self) -> bool {
        !matches!(self, ZoneType::White)
    }

    /// Families whose brightness frames carry an absolute level. The others
    /// only know brighten/dim steps.
    pub fn has_absolute_brightness(self) -> bool {
        matches!(
            self,
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::BridgeLight
        )
    }

    pub fn supports_temperature(self) -> bool {
        matches!(self, ZoneType::White | ZoneType::Rgbww)
    }

    pub fn supports_white_mode(self) -> bool {
        matches!(
            self,
            ZoneType::Rgbw | ZoneType::Rgbww | ZoneType::BridgeLight
        )
    }

    pub fn supports_night_mode(self) -> bool {
        !matches!(self, ZoneType::Rgb)
    }

    /// Scenes and scene speed exist on the RGBW family only.
    pub fn supports_scenes(self) -> bool {
        matches!(self, ZoneType::Rgbw | ZoneType::Rgbww)
    }
}

/// Bridge hardware generation, which fixes the wire format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Generation {
    /// v3-v5 bridges: connectionless 3-byte frames on port 8899.
    Legacy,
    /// iBox / v6 bridges: session-based frames on port 5987.
    V6,
}

impl Generation {
    /// Model strings reported by v6 bridges in their discovery reply.
    pub const V6_MODELS: &'static [&'static str] = &["HF-LPB100"];

    /// Infer the generation from the optional model field of a discovery reply.
    ///
    /// # Examples
    ///
    /// ```
    /// use milight_rs::Generation;
    ///
    /// assert_eq!(Generation::from_model(Some("HF-LPB100")), Generation::V6);
    /// assert_eq!(Generation::from_model(None), Generation::Legacy);
    /// assert_eq!(Generation::from_model(Some("")), Generation::Legacy);
    /// ```
    pub fn from_model(model: Option<&str>) -> Self {
        match model.map(str::trim) {
            Some(m) if Self::V6_MODELS.contains(&m) => Generation::V6,
            _ => Generation::Legacy,
        }
    }
}
