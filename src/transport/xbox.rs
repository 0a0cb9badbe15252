//! Original Xbox pads

use std::sync::Arc;

use rusb::Direction;
use tracing::debug;

use super::reader::{Endpoints, UsbController};
use super::usb::UsbLink;
use super::{LinkState, Parsed, ReportParser, TransportError};
use crate::message::names::GamepadNames;
use crate::message::{ControllerMessage, MessageDescriptor};

const CLASS: u8 = 88;
const SUBCLASS: u8 = 66;
const PROTOCOL: u8 = 0;

/// Decodes the 20 byte report; the face buttons are analog
pub struct XboxParser {
    names: GamepadNames,
}

impl XboxParser {
    pub fn new() -> Self {
        let mut desc = MessageDescriptor::new();
        Self {
            names: GamepadNames::register(&mut desc),
        }
    }

    fn decode(&self, data: &[u8], msg: &mut ControllerMessage) {
        let n = &self.names;
        let bit = |b: u8| data[2] & (1 << b) != 0;
        let i16le = |at: usize| i16::from_le_bytes([data[at], data[at + 1]]) as i32;

        msg.set_key(n.dpad_up, bit(0));
        msg.set_key(n.dpad_down, bit(1));
        msg.set_key(n.dpad_left, bit(2));
        msg.set_key(n.dpad_right, bit(3));
        msg.set_key(n.start, bit(4));
        msg.set_key(n.back, bit(5));
        msg.set_key(n.thumb_l, bit(6));
        msg.set_key(n.thumb_r, bit(7));

        let analog = [
            (n.abs_a, Some(n.a)),
            (n.abs_b, Some(n.b)),
            (n.abs_x, Some(n.x)),
            (n.abs_y, Some(n.y)),
            (n.abs_black, Some(n.black)),
            (n.abs_white, Some(n.white)),
            (n.lt, None),
            (n.rt, None),
        ];
        for (offset, (axis, key)) in analog.into_iter().enumerate() {
            let value = data[4 + offset];
            msg.set_abs(axis, value as i32);
            if let Some(key) = key {
                msg.set_key(key, value > 0);
            }
        }

        msg.set_abs(n.x1, i16le(12));
        msg.set_abs(n.y1, i16le(14));
        msg.set_abs(n.x2, i16le(16));
        msg.set_abs(n.y2, i16le(18));
    }
}

impl Default for XboxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for XboxParser {
    fn parse(&mut self, data: &[u8], msg: &mut ControllerMessage, _link: &LinkState) -> Parsed {
        if data.len() == 20 && data[0] == 0x00 && data[1] == 0x14 {
            self.decode(data, msg);
            Parsed::Message
        } else {
            if !data.is_empty() {
                debug!("unknown report: {}", hex::encode(data));
            }
            Parsed::Nothing
        }
    }

    fn rumble_packet(&self, left: u8, right: u8) -> Option<Vec<u8>> {
        Some(vec![0x00, 0x06, 0x00, left, 0x00, right])
    }

    fn led_packet(&self, _status: u8) -> Option<Vec<u8>> {
        None
    }
}

/// Claim interface 0 and start reading
pub fn open(usb: Arc<UsbLink>, detach: bool) -> Result<UsbController<XboxParser>, TransportError> {
    let endpoints = Endpoints {
        input: usb.find_endpoint(Direction::In, CLASS, SUBCLASS, PROTOCOL)?,
        output: usb.find_endpoint(Direction::Out, CLASS, SUBCLASS, PROTOCOL)?,
    };
    usb.claim_interface(0, detach)?;
    UsbController::start(usb, endpoints, XboxParser::new(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_decode_analog_buttons_and_sticks() {
        let (desc, names) = gamepad_descriptor();
        let mut msg = ControllerMessage::new(&desc);

        let mut report = [0u8; 20];
        report[0] = 0x00;
        report[1] = 0x14;
        report[2] = 0x11; // dpad_up, start
        report[4] = 200; // a
        report[9] = 1; // white
        report[10] = 255; // lt
        report[12..14].copy_from_slice(&(-20000i16).to_le_bytes());
        report[18..20].copy_from_slice(&(32767i16).to_le_bytes());

        let parsed = XboxParser::new().parse(&report, &mut msg, &LinkState::new(true));
        assert_eq!(parsed, Parsed::Message);
        assert!(msg.key(names.dpad_up));
        assert!(msg.key(names.start));
        assert!(msg.key(names.a));
        assert_eq!(msg.abs(names.abs_a), 200);
        assert!(!msg.key(names.b));
        assert!(msg.key(names.white));
        assert_eq!(msg.abs(names.lt), 255);
        assert_eq!(msg.abs(names.x1), -20000);
        assert_eq!(msg.abs(names.y2), 32767);
    }

    #[test]
    fn test_no_led_and_rumble_layout() {
        let parser = XboxParser::new();
        assert_eq!(parser.led_packet(3), None);
        assert_eq!(parser.rumble_packet(9, 7), Some(vec![0x00, 0x06, 0x00, 9, 0x00, 7]));
    }

    #[test]
    fn test_wrong_shape_is_dropped() {
        let (desc, _) = gamepad_descriptor();
        let mut msg = ControllerMessage::new(&desc);
        let link = LinkState::new(true);
        let mut parser = XboxParser::new();
        assert_eq!(parser.parse(&[0x00, 0x14, 0x00], &mut msg, &link), Parsed::Nothing);
        assert_eq!(parser.parse(&[], &mut msg, &link), Parsed::Nothing);
    }
}
