//! Command frames and their per-generation encodings.
//!
//! A [`Command`] is what a zone wants to happen; a [`Frame`] is the bytes that
//! make it happen on one bridge generation. Each zone resolves its
//! [`FrameEncoder`] once, from its type, number and the bridge's generation.

mod legacy;
pub(crate) mod v6;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Generation, SceneId, ZoneType};

/// Smallest hue step the bulbs distinguish.
pub const HUE_STEP: f64 = 1.0 / 255.0;

/// A single hardware action, independent of wire format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    On,
    Off,
    /// Calibrated hue in `0.0..=1.0`.
    Hue(f64),
    /// Absolute brightness in `0.0..=1.0`.
    Brightness(f64),
    BrightnessUp,
    BrightnessDown,
    /// Absolute white temperature in `0.0..=1.0`.
    Temperature(f64),
    Warmer,
    Cooler,
    WhiteMode,
    NightMode,
    SceneNext,
    Scene(SceneId),
    SpeedUp,
    SpeedDown,
}

impl Command {
    /// Relative commands move the bulb one step per frame, so repeating the
    /// frame would repeat the step.
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            Command::BrightnessUp
                | Command::BrightnessDown
                | Command::Warmer
                | Command::Cooler
                | Command::SceneNext
                | Command::SpeedUp
                | Command::SpeedDown
        )
    }
}

/// Encoded bytes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramePayload {
    /// `[opcode, parameter, 0x55]`.
    Legacy([u8; 3]),
    /// Command body and zone byte; the transport adds the session envelope.
    V6 { command: [u8; 9], zone: u8 },
}

/// One encoded command, ready for a bridge's send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub payload: FramePayload,
    /// Whether the frame may be written more than once for reliability.
    pub repeatable: bool,
}

impl Frame {
    pub fn legacy(bytes: [u8; 3]) -> Self {
        Frame {
            payload: FramePayload::Legacy(bytes),
            repeatable: true,
        }
    }

    pub fn v6(command: [u8; 9], zone: u8) -> Self {
        Frame {
            payload: FramePayload::V6 { command, zone },
            repeatable: true,
        }
    }

    pub(crate) fn step(mut self) -> Self {
        self.repeatable = false;
        self
    }

    /// The frame's bytes before any transport envelope.
    pub fn body(&self) -> Vec<u8> {
        match &self.payload {
            FramePayload::Legacy(bytes) => bytes.to_vec(),
            FramePayload::V6 { command, zone } => {
                let mut body = command.to_vec();
                body.push(*zone);
                body
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.body().iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{}", hex.join(" "))
    }
}

/// Translates commands into frames for one zone on one bridge generation.
pub trait FrameEncoder: Send + Sync + fmt::Debug {
    /// Returns `None` when the hardware has no frame for the command.
    fn encode(&self, command: Command) -> Option<Frame>;
}

/// Resolve the encoder for a zone slot.
pub fn encoder_for(
    zone_type: ZoneType,
    number: u8,
    generation: Generation,
) -> Box<dyn FrameEncoder> {
    match generation {
        Generation::Legacy => legacy::encoder(zone_type, number),
        Generation::V6 => v6::encoder(zone_type, number),
    }
}

/// Shift a hue by a calibration offset, wrapping into `0.0..1.0`.
///
/// A result of exactly zero is nudged to [`HUE_STEP`]; some bulbs ignore a
/// literal zero.
///
/// # Examples
///
/// ```
/// use milight_rs::protocol::{HUE_STEP, calibrate_hue};
///
/// assert_eq!(calibrate_hue(0.5, 0.0), 0.5);
/// assert!((calibrate_hue(0.99, 0.045) - 0.035).abs() < 1e-9);
/// assert_eq!(calibrate_hue(0.0, 0.0), HUE_STEP);
/// assert_eq!(calibrate_hue(1.0, 0.0), HUE_STEP);
/// ```
pub fn calibrate_hue(hue: f64, offset: f64) -> f64 {
    let shifted = (hue + offset).rem_euclid(1.0);
    if shifted == 0.0 { HUE_STEP } else { shifted }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_commands_are_not_repeatable() {
        let encoder = encoder_for(ZoneType::White, 1, Generation::Legacy);
        assert!(!encoder.encode(Command::BrightnessUp).unwrap().repeatable);
        assert!(!encoder.encode(Command::Warmer).unwrap().repeatable);
        assert!(encoder.encode(Command::On).unwrap().repeatable);
    }

    #[test]
    fn test_calibration_is_monotonic_before_wrap() {
        let offset = 0.045;
        let mut last = 0.0;
        for i in 1..=95 {
            let value = calibrate_hue(i as f64 / 100.0, offset);
            assert!(value > last, "hue {i} not increasing");
            last = value;
        }
    }

    #[test]
    fn test_calibration_is_deterministic() {
        for i in 0..=100 {
            let h = i as f64 / 100.0;
            for generation in [Generation::Legacy, Generation::V6] {
                let a = encoder_for(ZoneType::Rgbw, 1, generation);
                let b = encoder_for(ZoneType::Rgbw, 1, generation);
                let hue = calibrate_hue(h, 0.015);
                assert_eq!(a.encode(Command::Hue(hue)), b.encode(Command::Hue(hue)));
            }
        }
    }

    #[test]
    fn test_frame_display() {
        assert_eq!(Frame::legacy([0x42, 0x00, 0x55]).to_string(), "42 00 55");
    }
}
