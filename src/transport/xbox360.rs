//! Wired Xbox 360 pads

use std::sync::Arc;

use rusb::Direction;
use tracing::{debug, info};

use super::reader::{Endpoints, UsbController};
use super::usb::UsbLink;
use super::{LinkState, Parsed, ReportParser, TransportError};
use crate::message::names::GamepadNames;
use crate::message::{ControllerMessage, MessageDescriptor};

const CLASS_VENDOR_SPEC: u8 = 0xff;
const SUBCLASS: u8 = 93;
const PROTOCOL: u8 = 1;

/// Decode the 20 byte `00 14` input report that wired and wireless pads share
pub(super) fn decode_report(data: &[u8], names: &GamepadNames, msg: &mut ControllerMessage) {
    let bit = |byte: usize, n: u8| data[byte] & (1 << n) != 0;
    let i16le = |at: usize| i16::from_le_bytes([data[at], data[at + 1]]) as i32;

    msg.set_key(names.dpad_up, bit(2, 0));
    msg.set_key(names.dpad_down, bit(2, 1));
    msg.set_key(names.dpad_left, bit(2, 2));
    msg.set_key(names.dpad_right, bit(2, 3));
    msg.set_key(names.start, bit(2, 4));
    msg.set_key(names.back, bit(2, 5));
    msg.set_key(names.thumb_l, bit(2, 6));
    msg.set_key(names.thumb_r, bit(2, 7));

    msg.set_key(names.lb, bit(3, 0));
    msg.set_key(names.rb, bit(3, 1));
    msg.set_key(names.guide, bit(3, 2));
    msg.set_key(names.a, bit(3, 4));
    msg.set_key(names.b, bit(3, 5));
    msg.set_key(names.x, bit(3, 6));
    msg.set_key(names.y, bit(3, 7));

    msg.set_abs(names.lt, data[4] as i32);
    msg.set_abs(names.rt, data[5] as i32);

    msg.set_abs(names.x1, i16le(6));
    msg.set_abs(names.y1, i16le(8));
    msg.set_abs(names.x2, i16le(10));
    msg.set_abs(names.y2, i16le(12));
}

pub struct Xbox360Parser {
    names: GamepadNames,
}

impl Xbox360Parser {
    pub fn new() -> Self {
        let mut desc = MessageDescriptor::new();
        Self {
            names: GamepadNames::register(&mut desc),
        }
    }
}

impl Default for Xbox360Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for Xbox360Parser {
    fn parse(&mut self, data: &[u8], msg: &mut ControllerMessage, _link: &LinkState) -> Parsed {
        match data {
            [] => Parsed::Nothing,
            [0x01, 0x03, status] => {
                debug!(status, "LED status");
                Parsed::Nothing
            }
            [0x03, 0x03, status] => {
                info!(status, "rumble status");
                Parsed::Nothing
            }
            [0x08, 0x03, peripheral] => {
                let kind = match peripheral {
                    0x00 => "none",
                    0x01 => "chatpad",
                    0x02 => "headset",
                    0x03 => "headset, chatpad",
                    _ => "unknown",
                };
                info!("peripheral: {}", kind);
                Parsed::Nothing
            }
            [0x00, 0x14, ..] if data.len() == 20 => {
                decode_report(data, &self.names, msg);
                Parsed::Message
            }
            _ => {
                debug!("unknown report: {}", hex::encode(data));
                Parsed::Nothing
            }
        }
    }

    fn rumble_packet(&self, left: u8, right: u8) -> Option<Vec<u8>> {
        Some(vec![0x00, 0x08, 0x00, left, right, 0x00, 0x00, 0x00])
    }

    fn led_packet(&self, status: u8) -> Option<Vec<u8>> {
        Some(vec![0x01, 0x03, status])
    }
}

/// Claim interface 0 and start reading
pub fn open(usb: Arc<UsbLink>, detach: bool) -> Result<UsbController<Xbox360Parser>, TransportError> {
    let endpoints = Endpoints {
        input: usb.find_endpoint(Direction::In, CLASS_VENDOR_SPEC, SUBCLASS, PROTOCOL)?,
        output: usb.find_endpoint(Direction::Out, CLASS_VENDOR_SPEC, SUBCLASS, PROTOCOL)?,
    };
    debug!(?endpoints, "xbox360 endpoints");
    usb.claim_interface(0, detach)?;
    UsbController::start(usb, endpoints, Xbox360Parser::new(), true)
}
