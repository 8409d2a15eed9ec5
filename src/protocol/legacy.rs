//! Legacy (v3-v5) bridge frames: three bytes, terminated by `0x55`.
//!
//! Per-zone opcodes are indexed by zone number, where index 0 addresses every
//! zone of the family at once.

use super::{Command, Frame, FrameEncoder};
use crate::types::ZoneType;

const TERMINATOR: u8 = 0x55;

const RGBW_ON: [u8; 5] = [0x42, 0x45, 0x47, 0x49, 0x4B];
const RGBW_OFF: [u8; 5] = [0x41, 0x46, 0x48, 0x4A, 0x4C];
const RGBW_WHITE: [u8; 5] = [0xC2, 0xC5, 0xC7, 0xC9, 0xCB];
const RGBW_NIGHT: [u8; 5] = [0xC1, 0xC6, 0xC8, 0xCA, 0xCC];
const RGBW_BRIGHTNESS_LEVELS: [u8; 20] = [
    0x02, 0x03, 0x04, 0x05, 0x08, 0x09, 0x0A, 0x0B, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13,
    0x14, 0x15, 0x17, 0x18, 0x19,
];

const WHITE_ON: [u8; 5] = [0x35, 0x38, 0x3D, 0x37, 0x32];
const WHITE_OFF: [u8; 5] = [0x39, 0x3B, 0x33, 0x3A, 0x36];
const WHITE_NIGHT: [u8; 5] = [0xB9, 0xBB, 0xB3, 0xBA, 0xB6];

pub(super) fn encoder(zone_type: ZoneType, number: u8) -> Box<dyn FrameEncoder> {
    let slot = usize::from(number.min(4));
    match zone_type {
        ZoneType::Rgb => Box::new(Rgb),
        ZoneType::Rgbw => Box::new(Rgbw { slot }),
        ZoneType::White => Box::new(White { slot }),
        // Only v6 bridges have these; a legacy bridge never builds such a zone.
        ZoneType::Rgbww | ZoneType::BridgeLight => Box::new(Unsupported),
    }
}

fn frame(opcode: u8, parameter: u8) -> Frame {
    Frame::legacy([opcode, parameter, TERMINATOR])
}

/// Legacy hue wheel: 0xB0 is red and the wheel runs backwards.
pub(crate) fn hue_byte(hue: f64) -> u8 {
    let scaled = (hue.clamp(0.0, 1.0) * 255.0).floor() as i32;
    (256 + 176 - scaled).rem_euclid(256) as u8
}

fn brightness_level(brightness: f64) -> u8 {
    let index = ((brightness.clamp(0.0, 1.0) * 20.0).ceil() as usize).saturating_sub(1);
    RGBW_BRIGHTNESS_LEVELS[index.min(RGBW_BRIGHTNESS_LEVELS.len() - 1)]
}

#[derive(Debug)]
struct Rgb;

impl FrameEncoder for Rgb {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = match command {
            Command::Off => frame(0x21, 0x00),
            Command::On => frame(0x22, 0x00),
            Command::Hue(hue) => frame(0x20, hue_byte(hue)),
            Command::BrightnessUp => frame(0x23, 0x00).step(),
            Command::BrightnessDown => frame(0x24, 0x00).step(),
            _ => return None,
        };
        Some(frame)
    }
}

#[derive(Debug)]
struct Rgbw {
    slot: usize,
}

impl FrameEncoder for Rgbw {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = match command {
            Command::On => frame(RGBW_ON[self.slot], 0x00),
            Command::Off => frame(RGBW_OFF[self.slot], 0x00),
            Command::Hue(hue) => frame(0x40, hue_byte(hue)),
            Command::Brightness(level) if level < 0.01 => frame(RGBW_OFF[self.slot], 0x00),
            Command::Brightness(level) => frame(0x4E, brightness_level(level)),
            Command::WhiteMode => frame(RGBW_WHITE[self.slot], 0x00),
            Command::NightMode => frame(RGBW_NIGHT[self.slot], 0x00),
            Command::SceneNext => frame(0x4D, 0x00).step(),
            Command::SpeedUp => frame(0x44, 0x00).step(),
            Command::SpeedDown => frame(0x43, 0x00).step(),
            _ => return None,
        };
        Some(frame)
    }
}

#[derive(Debug)]
struct White {
    slot: usize,
}

impl FrameEncoder for White {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = match command {
            Command::On => frame(WHITE_ON[self.slot], 0x00),
            Command::Off => frame(WHITE_OFF[self.slot], 0x00),
            Command::BrightnessUp => frame(0x3C, 0x00).step(),
            Command::BrightnessDown => frame(0x34, 0x00).step(),
            Command::Warmer => frame(0x3E, 0x00).step(),
            Command::Cooler => frame(0x3F, 0x00).step(),
            Command::NightMode => frame(WHITE_NIGHT[self.slot], 0x00),
            _ => return None,
        };
        Some(frame)
    }
}

#[derive(Debug)]
struct Unsupported;

impl FrameEncoder for Unsupported {
    fn encode(&self, _command: Command) -> Option<Frame> {
        None
    }
}
