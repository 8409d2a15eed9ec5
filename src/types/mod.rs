//! Value types shared by the discovery, zone and bridge layers.

mod light_mode;
mod mac;
mod scene;
mod zone_type;

pub use light_mode::LightMode;
pub use mac::MacAddress;
pub use scene::SceneId;
pub use zone_type::{Generation, ZoneType};
