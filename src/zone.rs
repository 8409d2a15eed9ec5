//! Zones: groups of bulbs a bridge addresses together.
//!
//! A zone caches the last state it was told to show. The bulbs never report
//! back, so the cache is advisory; relative-only bulbs (RGB, white) still
//! depend on it to compute how many brighten/dim steps to send.

use std::iter;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::dispatch::{CommandQueue, Delivery};
use crate::errors::{Error, check_unit};
use crate::protocol::{Command, Frame, FrameEncoder, calibrate_hue, encoder_for};
use crate::types::{Generation, LightMode, MacAddress, SceneId, ZoneType};

type Result<T> = std::result::Result<T, Error>;

/// Below this level a brightness request turns the zone off.
const OFF_LEVEL: f64 = 0.01;
/// Above this level relative bulbs are driven to their maximum.
const FULL_LEVEL: f64 = 0.95;
/// Increments that take a relative bulb from any level to its maximum.
const FULL_STEPS: usize = 5;

/// Cached state of a zone.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub on: bool,
    pub brightness: f64,
    /// Hue after calibration.
    pub hue: f64,
    pub temperature: f64,
    pub mode: LightMode,
    pub scene: Option<SceneId>,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 1.0,
            hue: 1.0,
            temperature: 1.0,
            mode: LightMode::Color,
            scene: None,
        }
    }
}

/// One addressable zone of a bridge.
///
/// Number 0 is the group zone that addresses every zone of its type at once.
/// Operations return once their frames are queued on the bridge; await the
/// returned [`Delivery`] to learn whether the batch reached the socket.
pub struct Zone {
    bridge_mac: MacAddress,
    zone_type: ZoneType,
    number: u8,
    generation: Generation,
    hue_offset: f64,
    encoder: Box<dyn FrameEncoder>,
    state: Mutex<ZoneState>,
    queue: CommandQueue,
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id())
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

impl Zone {
    pub(crate) fn new(
        bridge_mac: MacAddress,
        zone_type: ZoneType,
        number: u8,
        generation: Generation,
        hue_offset: f64,
        queue: CommandQueue,
    ) -> Self {
        Self {
            bridge_mac,
            zone_type,
            number,
            generation,
            hue_offset,
            encoder: encoder_for(zone_type, number, generation),
            state: Mutex::new(ZoneState::default()),
            queue,
        }
    }

    /// Unique id: bridge MAC, zone number and type.
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.bridge_mac, self.number, self.zone_type)
    }

    pub fn name(&self) -> String {
        format!("Zone {} {}", self.number, self.zone_type)
    }

    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn is_group(&self) -> bool {
        self.number == 0
    }

    pub fn bridge_mac(&self) -> MacAddress {
        self.bridge_mac
    }

    /// Snapshot of the cached state.
    pub fn state(&self) -> ZoneState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ZoneState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require(&self, operation: &'static str, supported: bool) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(Error::not_supported(operation, self.zone_type))
        }
    }

    fn encode(&self, operation: &'static str, commands: &[Command]) -> Result<Vec<Frame>> {
        commands
            .iter()
            .map(|c| {
                self.encoder
                    .encode(*c)
                    .ok_or_else(|| Error::not_supported(operation, self.zone_type))
            })
            .collect()
    }

    /// Plan commands against a copy of the state, queue them, then commit the
    /// copy. The state lock is held throughout so concurrent calls on one zone
    /// queue in the order they observed the cache.
    fn submit<F>(&self, operation: &'static str, plan: F) -> Result<Delivery>
    where
        F: FnOnce(&mut ZoneState) -> Vec<Command>,
    {
        let mut state = self.lock_state();
        let mut next = state.clone();
        let commands = plan(&mut next);
        let frames = self.encode(operation, &commands)?;
        debug!("{} {operation}: {} frame(s)", self.id(), frames.len());
        let delivery = self.queue.enqueue(frames)?;
        *state = next;
        Ok(delivery)
    }

    pub async fn turn_on(&self) -> Result<Delivery> {
        self.submit("turn_on", |s| {
            s.on = true;
            vec![Command::On]
        })
    }

    pub async fn turn_off(&self) -> Result<Delivery> {
        self.submit("turn_off", |s| {
            s.on = false;
            vec![Command::Off]
        })
    }

    /// Set the hue, `0.0..=1.0`.
    ///
    /// The hue is shifted by the zone family's calibration offset before
    /// encoding; the cache keeps the shifted value. The cached temperature is
    /// reset and the zone switches to color mode.
    pub async fn set_hue(&self, hue: f64) -> Result<Delivery> {
        let hue = check_unit("hue", hue)?;
        self.require("set_hue", self.zone_type.supports_hue())?;
        let calibrated = calibrate_hue(hue, self.hue_offset);
        self.submit("set_hue", |s| {
            s.on = true;
            s.hue = calibrated;
            s.temperature = 0.0;
            s.mode = LightMode::Color;
            vec![Command::On, Command::Hue(calibrated)]
        })
    }

    /// Set the brightness, `0.0..=1.0`. Levels below 0.01 turn the zone off.
    ///
    /// Bulbs without absolute brightness are stepped from the cached level,
    /// one step per tenth; above 0.95 they receive five increments, which
    /// reaches the maximum from any level.
    pub async fn set_brightness(&self, brightness: f64) -> Result<Delivery> {
        let brightness = check_unit("brightness", brightness)?;
        let absolute = self.zone_type.has_absolute_brightness();
        self.submit("set_brightness", |s| {
            let commands = if brightness < OFF_LEVEL {
                vec![Command::Off]
            } else if absolute {
                vec![Command::On, Command::Brightness(brightness)]
            } else if brightness > FULL_LEVEL {
                steps(Command::BrightnessUp, FULL_STEPS)
            } else {
                let delta = ((brightness - s.brightness) * 10.0).round() as i32;
                let step = if delta > 0 {
                    Command::BrightnessUp
                } else {
                    Command::BrightnessDown
                };
                steps(step, delta.unsigned_abs() as usize)
            };
            s.brightness = brightness;
            s.on = brightness >= OFF_LEVEL;
            commands
        })
    }

    /// Set the white temperature, `0.0` (cold) to `1.0` (warm).
    ///
    /// White bulbs step warmer or cooler from the cached value; RGBWW bulbs
    /// take the value directly in a single frame.
    pub async fn set_temperature(&self, temperature: f64) -> Result<Delivery> {
        let temperature = check_unit("temperature", temperature)?;
        self.require("set_temperature", self.zone_type.supports_temperature())?;
        let zone_type = self.zone_type;
        self.submit("set_temperature", |s| {
            let commands = match zone_type {
                ZoneType::White => {
                    let delta = ((temperature - s.temperature) * 10.0).round() as i32;
                    let step = if delta > 0 {
                        Command::Warmer
                    } else {
                        Command::Cooler
                    };
                    steps(step, delta.unsigned_abs() as usize)
                }
                _ => vec![Command::Temperature(temperature)],
            };
            s.on = true;
            s.temperature = temperature;
            s.mode = LightMode::Temperature;
            commands
        })
    }

    /// Switch color bulbs to their white channel.
    ///
    /// RGBWW bulbs are set to `temperature`, or to the cached temperature when
    /// none is given. The other families have a single white setting and
    /// ignore it.
    pub async fn enable_white_mode(&self, temperature: Option<f64>) -> Result<Delivery> {
        let temperature = temperature
            .map(|t| check_unit("temperature", t))
            .transpose()?;
        self.require("enable_white_mode", self.zone_type.supports_white_mode())?;
        let zone_type = self.zone_type;
        self.submit("enable_white_mode", |s| {
            s.on = true;
            s.mode = LightMode::Temperature;
            if zone_type == ZoneType::Rgbww {
                let t = temperature.unwrap_or(s.temperature);
                s.temperature = t;
                vec![Command::Temperature(t)]
            } else {
                vec![Command::On, Command::WhiteMode]
            }
        })
    }

    /// Dim to night light. The bridge light has no night mode and switches to
    /// white instead.
    pub async fn enable_night_mode(&self) -> Result<Delivery> {
        self.require("enable_night_mode", self.zone_type.supports_night_mode())?;
        if self.zone_type == ZoneType::BridgeLight {
            return self.enable_white_mode(None).await;
        }
        self.submit("enable_night_mode", |s| {
            s.on = true;
            s.mode = LightMode::Night;
            vec![Command::On, Command::NightMode]
        })
    }

    /// Start a built-in scene.
    ///
    /// v6 bridges jump to `scene` (1-9), or to the scene after the current
    /// one when `None`. Legacy bridges cannot address scenes and always
    /// advance to the next one, whatever `scene` says.
    pub async fn toggle_scene(&self, scene: Option<u8>) -> Result<Delivery> {
        let requested = scene
            .map(|id| {
                SceneId::create(id)
                    .ok_or_else(|| Error::validation("scene", format!("must be within 1..=9, got {id}")))
            })
            .transpose()?;
        self.require("toggle_scene", self.zone_type.supports_scenes())?;
        let generation = self.generation;
        self.submit("toggle_scene", |s| {
            let advanced = s.scene.map_or(SceneId::first(), |current| current.next());
            s.on = true;
            s.mode = LightMode::Disco;
            match generation {
                Generation::Legacy => {
                    s.scene = Some(advanced);
                    vec![Command::On, Command::SceneNext]
                }
                Generation::V6 => {
                    let target = requested.unwrap_or(advanced);
                    s.scene = Some(target);
                    vec![Command::On, Command::Scene(target)]
                }
            }
        })
    }

    pub async fn set_scene_speed_up(&self) -> Result<Delivery> {
        self.require("set_scene_speed_up", self.zone_type.supports_scenes())?;
        self.submit("set_scene_speed_up", |_| vec![Command::SpeedUp])
    }

    pub async fn set_scene_speed_down(&self) -> Result<Delivery> {
        self.require("set_scene_speed_down", self.zone_type.supports_scenes())?;
        self.submit("set_scene_speed_down", |_| vec![Command::SpeedDown])
    }
}

/// `On` followed by `count` copies of a step command.
fn steps(step: Command, count: usize) -> Vec<Command> {
    iter::once(Command::On)
        .chain(iter::repeat_n(step, count))
        .collect()
}
