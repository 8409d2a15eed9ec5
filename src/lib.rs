//! # milight_rs
//!
//! An async Rust library for controlling Milight / LimitlessLED bridges over UDP.
//!
//! This crate provides a **runtime-agnostic** async API to find bridges on your
//! local network, keep track of which ones are reachable, and command the bulb
//! zones behind them. Both bridge generations are supported: the legacy bridge
//! (3-byte frames on port 8899) and the v6 bridge (session-based frames on
//! port 5987).
//!
//! ## Quick Start
//!
//! ```ignore
//! use milight_rs::{BridgeManager, ManagerConfig, ZoneType};
//!
//! // Works with any async runtime!
//! async fn control_lights() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = BridgeManager::new(ManagerConfig::default());
//!     let bridge = manager.find_bridge("ACCF23A1B2C3".parse()?).await?;
//!
//!     // Set RGBW zone 1 to half brightness and wait for the frames to go out
//!     let zone = bridge.zone(ZoneType::Rgbw, 1)?;
//!     zone.set_brightness(0.5).await?.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Discovery**: Find bridges with [`BridgeManager::discover_bridges`]; concurrent
//!   callers share one broadcast pass
//! - **Liveness**: Bridges go [`Liveness::Offline`] after missing discovery and
//!   announce it through [`BridgeEvent`]s
//! - **Zones**: Hue, brightness, white temperature, night mode and scenes per
//!   [`Zone`], with a cached [`ZoneState`]
//! - **Pacing**: Commands are debounced per bridge and written with a minimum gap
//!   between frames; await the returned [`Delivery`] to learn the outcome
//!
//! ## Communication
//!
//! Discovery broadcasts on UDP port 48899. Legacy bridges take commands on port
//! 8899 and v6 bridges on port 5987, after a session handshake.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! milight-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! milight-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! milight-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod bridge;
mod config;
pub mod discovery;
mod dispatch;
mod errors;
mod events;
mod history;
mod manager;
pub mod protocol;
pub mod runtime;
pub mod transport;
mod types;
mod zone;

#[cfg(test)]
mod testing;

// Re-export public API
pub use bridge::{BRIDGE_LIGHT_SLOT, Bridge, Liveness};
pub use config::{
    DiscoveryConfig, HueCalibration, HueOffsets, ManagerConfig, PacingConfig, V6Config,
};
pub use discovery::{DiscoverOptions, DiscoveredBridge, DiscoveryKind, discover_bridges};
pub use dispatch::Delivery;
pub use errors::Error;
pub use events::{BridgeEvent, Listener, ListenerId};
pub use history::{BatchOutcome, FrameHistory, HistoryEntry, HistorySummary};
pub use manager::{BridgeCandidate, BridgeManager, BridgeQuery};
pub use types::{Generation, LightMode, MacAddress, SceneId, ZoneType};
pub use zone::{Zone, ZoneState};
