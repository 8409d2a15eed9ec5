//! v6 (iBox) bridge frames.
//!
//! Every command is a 9-byte body `31 00 00 <remote> <cmd> <p1..p4>` followed
//! by a zone byte. Before sending, the transport wraps it in a session
//! envelope obtained from a handshake; sessions do not survive a bridge power
//! cycle.

use super::{Command, Frame, FrameEncoder};
use crate::types::ZoneType;

/// Handshake request; the reply carries the session id at bytes 19 and 20.
pub(crate) const SESSION_REQUEST: [u8; 27] = [
    0x20, 0x00, 0x00, 0x00, 0x16, 0x02, 0x62, 0x3A, 0xD5, 0xED, 0xA3, 0x01, 0xAE, 0x08, 0x2D,
    0x46, 0x61, 0x41, 0xA7, 0xF6, 0xDC, 0xAF, 0xD3, 0xE6, 0x00, 0x00, 0x1E,
];

const SESSION_REPLY_HEADER: u8 = 0x28;
const COMMAND_HEADER: [u8; 5] = [0x80, 0x00, 0x00, 0x00, 0x11];

const REMOTE_BRIDGE: u8 = 0x00;
const REMOTE_WHITE: u8 = 0x01;
const REMOTE_RGB: u8 = 0x05;
const REMOTE_RGBW: u8 = 0x07;
const REMOTE_FULL_COLOR: u8 = 0x08;

/// The indicator light answers on zone byte 1 regardless of slot.
const BRIDGE_LIGHT_ZONE: u8 = 0x01;

/// Session id handed out by a v6 bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionId(pub u8, pub u8);

/// Extract the session id from a handshake reply.
pub(crate) fn parse_session_reply(reply: &[u8]) -> Option<SessionId> {
    if reply.len() < 21 || reply[0] != SESSION_REPLY_HEADER {
        return None;
    }
    Some(SessionId(reply[19], reply[20]))
}

/// Wrap a command body into the 22-byte session envelope.
pub(crate) fn envelope(session: SessionId, sequence: u8, command: &[u8; 9], zone: u8) -> [u8; 22] {
    let mut packet = [0u8; 22];
    packet[..5].copy_from_slice(&COMMAND_HEADER);
    packet[5] = session.0;
    packet[6] = session.1;
    packet[8] = sequence;
    packet[10..19].copy_from_slice(command);
    packet[19] = zone;
    packet[21] = checksum(command, zone);
    packet
}

fn checksum(command: &[u8; 9], zone: u8) -> u8 {
    command
        .iter()
        .chain(std::iter::once(&zone))
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
}

pub(super) fn encoder(zone_type: ZoneType, number: u8) -> Box<dyn FrameEncoder> {
    let zone = number.min(4);
    match zone_type {
        ZoneType::Rgb => Box::new(Rgb { zone }),
        ZoneType::Rgbw => Box::new(Rgbw { zone }),
        ZoneType::Rgbww => Box::new(FullColor { zone }),
        ZoneType::White => Box::new(White { zone }),
        ZoneType::BridgeLight => Box::new(BridgeLight),
    }
}

fn body(remote: u8, command: u8, parameter: u8) -> [u8; 9] {
    [0x31, 0x00, 0x00, remote, command, parameter, 0x00, 0x00, 0x00]
}

pub(crate) fn hue_byte(hue: f64) -> u8 {
    (hue.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn hue_body(remote: u8, hue: f64) -> [u8; 9] {
    let h = hue_byte(hue);
    [0x31, 0x00, 0x00, remote, 0x01, h, h, h, h]
}

fn percent(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[derive(Debug)]
struct Rgb {
    zone: u8,
}

impl FrameEncoder for Rgb {
    fn encode(&self, command: Command) -> Option<Frame> {
        let body = match command {
            Command::On => body(REMOTE_RGB, 0x02, 0x09),
            Command::Off => body(REMOTE_RGB, 0x02, 0x0A),
            Command::Hue(hue) => hue_body(REMOTE_RGB, hue),
            Command::BrightnessUp => return Some(Frame::v6(body(REMOTE_RGB, 0x02, 0x01), self.zone).step()),
            Command::BrightnessDown => return Some(Frame::v6(body(REMOTE_RGB, 0x02, 0x02), self.zone).step()),
            _ => return None,
        };
        Some(Frame::v6(body, self.zone))
    }
}

#[derive(Debug)]
struct Rgbw {
    zone: u8,
}

impl FrameEncoder for Rgbw {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = |body| Frame::v6(body, self.zone);
        Some(match command {
            Command::On => frame(body(REMOTE_RGBW, 0x03, 0x01)),
            Command::Off => frame(body(REMOTE_RGBW, 0x03, 0x02)),
            Command::SpeedUp => frame(body(REMOTE_RGBW, 0x03, 0x03)).step(),
            Command::SpeedDown => frame(body(REMOTE_RGBW, 0x03, 0x04)).step(),
            Command::WhiteMode => frame(body(REMOTE_RGBW, 0x03, 0x05)),
            Command::NightMode => frame(body(REMOTE_RGBW, 0x03, 0x06)),
            Command::Hue(hue) => frame(hue_body(REMOTE_RGBW, hue)),
            Command::Brightness(level) if level < 0.01 => frame(body(REMOTE_RGBW, 0x03, 0x02)),
            Command::Brightness(level) => frame(body(REMOTE_RGBW, 0x02, percent(level))),
            Command::Scene(scene) => frame(body(REMOTE_RGBW, 0x04, scene.value())),
            _ => return None,
        })
    }
}

#[derive(Debug)]
struct FullColor {
    zone: u8,
}

impl FrameEncoder for FullColor {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = |body| Frame::v6(body, self.zone);
        Some(match command {
            Command::On => frame(body(REMOTE_FULL_COLOR, 0x04, 0x01)),
            Command::Off => frame(body(REMOTE_FULL_COLOR, 0x04, 0x02)),
            Command::SpeedUp => frame(body(REMOTE_FULL_COLOR, 0x04, 0x03)).step(),
            Command::SpeedDown => frame(body(REMOTE_FULL_COLOR, 0x04, 0x04)).step(),
            Command::NightMode => frame(body(REMOTE_FULL_COLOR, 0x04, 0x05)),
            Command::Hue(hue) => frame(hue_body(REMOTE_FULL_COLOR, hue)),
            Command::Brightness(level) if level < 0.01 => {
                frame(body(REMOTE_FULL_COLOR, 0x04, 0x02))
            }
            Command::Brightness(level) => frame(body(REMOTE_FULL_COLOR, 0x03, percent(level))),
            // The bulb counts from cold (0) to warm (100).
            Command::Temperature(t) => frame(body(REMOTE_FULL_COLOR, 0x05, 100 - percent(t))),
            Command::Scene(scene) => frame(body(REMOTE_FULL_COLOR, 0x06, scene.value())),
            _ => return None,
        })
    }
}

#[derive(Debug)]
struct White {
    zone: u8,
}

impl FrameEncoder for White {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = |body| Frame::v6(body, self.zone);
        Some(match command {
            Command::BrightnessUp => frame(body(REMOTE_WHITE, 0x01, 0x01)).step(),
            Command::BrightnessDown => frame(body(REMOTE_WHITE, 0x01, 0x02)).step(),
            Command::Cooler => frame(body(REMOTE_WHITE, 0x01, 0x03)).step(),
            Command::Warmer => frame(body(REMOTE_WHITE, 0x01, 0x04)).step(),
            Command::NightMode => frame(body(REMOTE_WHITE, 0x01, 0x06)),
            Command::On => frame(body(REMOTE_WHITE, 0x01, 0x07)),
            Command::Off => frame(body(REMOTE_WHITE, 0x01, 0x08)),
            _ => return None,
        })
    }
}

#[derive(Debug)]
struct BridgeLight;

impl FrameEncoder for BridgeLight {
    fn encode(&self, command: Command) -> Option<Frame> {
        let frame = |body| Frame::v6(body, BRIDGE_LIGHT_ZONE);
        Some(match command {
            Command::On => frame(body(REMOTE_BRIDGE, 0x03, 0x03)),
            Command::Off => frame(body(REMOTE_BRIDGE, 0x03, 0x04)),
            Command::WhiteMode => frame(body(REMOTE_BRIDGE, 0x03, 0x05)),
            Command::Hue(hue) => frame(hue_body(REMOTE_BRIDGE, hue)),
            Command::Brightness(level) if level < 0.01 => frame(body(REMOTE_BRIDGE, 0x03, 0x04)),
            Command::Brightness(level) => frame(body(REMOTE_BRIDGE, 0x02, percent(level))),
            _ => return None,
        })
    }
}
