//! Xbox 360 wireless receiver
//!
//! One receiver carries four pads. Pad `n` talks on interface `2n` and
//! endpoint `2n + 1`. A pad starts inactive and becomes active when the
//! receiver reports it connected or it sends input.

use std::sync::Arc;

use tracing::{debug, info};

use super::reader::{Endpoints, UsbController};
use super::usb::UsbLink;
use super::xbox360::decode_report;
use super::{LinkState, Parsed, ReportParser, TransportError};
use crate::message::names::GamepadNames;
use crate::message::{ControllerMessage, MessageDescriptor};

pub const PADS_PER_RECEIVER: usize = 4;

const ENDPOINT_IN: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PadInfo {
    /// From the announce report
    pub serial: Option<String>,
    pub battery: Option<u8>,
}

pub struct Xbox360WirelessParser {
    names: GamepadNames,
    info: PadInfo,
}

impl Xbox360WirelessParser {
    pub fn new() -> Self {
        let mut desc = MessageDescriptor::new();
        Self {
            names: GamepadNames::register(&mut desc),
            info: PadInfo::default(),
        }
    }

    pub fn info(&self) -> &PadInfo {
        &self.info
    }

    fn connection_status(&mut self, status: u8, msg: &mut ControllerMessage, link: &LinkState) -> Parsed {
        match status {
            0x00 => {
                info!("connection status: nothing");
                msg.clear();
                link.set_active(false);
                Parsed::Message
            }
            0x80 => {
                info!("connection status: controller connected");
                link.set_active(true);
                Parsed::Connected
            }
            0x40 => {
                info!("connection status: headset connected");
                Parsed::Nothing
            }
            0xc0 => {
                info!("connection status: controller and headset connected");
                link.set_active(true);
                Parsed::Connected
            }
            _ => {
                info!(status, "connection status: unknown");
                Parsed::Nothing
            }
        }
    }
}

impl Default for Xbox360WirelessParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for Xbox360WirelessParser {
    fn parse(&mut self, data: &[u8], msg: &mut ControllerMessage, link: &LinkState) -> Parsed {
        match data {
            [] => Parsed::Nothing,
            [0x08, status] => self.connection_status(*status, msg, link),
            _ if data.len() == 29 => {
                link.set_active(true);
                match data {
                    [0x00, 0x0f, 0x00, 0xf0, ..] => {
                        let serial = data[7..14].iter().map(|b| format!("{:2x}", b)).collect::<Vec<_>>().join(":");
                        info!(%serial, battery = data[17], "wireless pad announced");
                        self.info.serial = Some(serial);
                        self.info.battery = Some(data[17]);
                        Parsed::Nothing
                    }
                    [0x00, 0x01, 0x00, 0xf0, 0x00, 0x13, ..] => {
                        decode_report(&data[4..24], &self.names, msg);
                        Parsed::Message
                    }
                    _ => {
                        debug!("unknown wireless report: {}", hex::encode(data));
                        Parsed::Nothing
                    }
                }
            }
            _ => {
                debug!("unknown wireless report: {}", hex::encode(data));
                Parsed::Nothing
            }
        }
    }

    fn rumble_packet(&self, left: u8, right: u8) -> Option<Vec<u8>> {
        Some(vec![0x00, 0x01, 0x0f, 0xc0, 0x00, left, right, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    fn led_packet(&self, status: u8) -> Option<Vec<u8>> {
        let mut packet = vec![0u8; 12];
        packet[2] = 0x08;
        packet[3] = 0x40 + status % 0x0e;
        Some(packet)
    }
}

/// Claim the interface of pad `pad` and start reading; the pad starts inactive
pub fn open(
    usb: Arc<UsbLink>,
    pad: usize,
    detach: bool,
) -> Result<UsbController<Xbox360WirelessParser>, TransportError> {
    let endpoint = (pad * 2 + 1) as u8;
    let interface = (pad * 2) as u8;
    usb.claim_interface(interface, detach)?;
    let endpoints = Endpoints {
        input: ENDPOINT_IN | endpoint,
        output: endpoint,
    };
    UsbController::start(usb, endpoints, Xbox360WirelessParser::new(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;
    use crate::transport::LinkNotice;
    use tokio::sync::mpsc;

    fn event_report() -> [u8; 29] {
        let mut report = [0u8; 29];
        report[..6].copy_from_slice(&[0x00, 0x01, 0x00, 0xf0, 0x00, 0x13]);
        report[6] = 0x08; // dpad_right
        report[7] = 0x20; // b
        report[8] = 0x7f; // lt
        report[14..16].copy_from_slice(&(-1200i16).to_le_bytes()); // x2
        report
    }

    #[test]
    fn test_event_report_uses_wired_layout_and_activates() {
        let (desc, names) = gamepad_descriptor();
        let mut msg = ControllerMessage::new(&desc);
        let link = LinkState::new(false);
        let mut parser = Xbox360WirelessParser::new();

        assert_eq!(parser.parse(&event_report(), &mut msg, &link), Parsed::Message);
        assert!(link.is_active());
        assert!(msg.key(names.dpad_right));
        assert!(msg.key(names.b));
        assert_eq!(msg.abs(names.lt), 0x7f);
        assert_eq!(msg.abs(names.x2), -1200);
    }

    #[test]
    fn test_connection_status() {
        let (desc, names) = gamepad_descriptor();
        let mut msg = ControllerMessage::new(&desc);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = LinkState::new(false);
        link.subscribe(3, tx);
        let mut parser = Xbox360WirelessParser::new();

        assert_eq!(parser.parse(&[0x08, 0x80], &mut msg, &link), Parsed::Connected);
        assert_eq!(rx.try_recv().ok(), Some(LinkNotice::Activation { id: 3, active: true }));

        parser.parse(&event_report(), &mut msg, &link);
        assert!(msg.key(names.b));

        assert_eq!(parser.parse(&[0x08, 0x00], &mut msg, &link), Parsed::Message);
        assert!(!msg.key(names.b));
        assert_eq!(msg.abs(names.x2), 0);
        assert_eq!(rx.try_recv().ok(), Some(LinkNotice::Activation { id: 3, active: false }));

        assert_eq!(parser.parse(&[0x08, 0x40], &mut msg, &link), Parsed::Nothing);
        assert!(!link.is_active());
    }

    #[test]
    fn test_announce_records_serial_and_battery() {
        let (desc, _) = gamepad_descriptor();
        let mut msg = ControllerMessage::new(&desc);
        let link = LinkState::new(false);
        let mut parser = Xbox360WirelessParser::new();

        let mut announce = [0u8; 29];
        announce[..4].copy_from_slice(&[0x00, 0x0f, 0x00, 0xf0]);
        announce[7..14].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x10, 0x20, 0x30]);
        announce[17] = 0xc0;

        assert_eq!(parser.parse(&announce, &mut msg, &link), Parsed::Nothing);
        assert_eq!(parser.info().serial.as_deref(), Some("de:ad:be:ef:10:20:30"));
        assert_eq!(parser.info().battery, Some(0xc0));
        assert!(link.is_active());
    }

    #[test]
    fn test_led_packet_wraps_status() {
        let parser = Xbox360WirelessParser::new();
        let packet = parser.led_packet(2).unwrap();
        assert_eq!(packet.len(), 12);
        assert_eq!(&packet[..4], &[0x00, 0x00, 0x08, 0x42]);
        assert_eq!(parser.led_packet(0x0f).unwrap()[3], 0x41);
        assert_eq!(&parser.rumble_packet(1, 2).unwrap()[5..7], &[1, 2]);
    }
}
