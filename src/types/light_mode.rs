//! Display mode of a zone.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// What the bulbs of a zone were last told to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LightMode {
    #[default]
    Color,
    Temperature,
    Disco,
    Night,
}
