//! Supported USB devices

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerFamily {
    Xbox,
    Xbox360,
    Xbox360Wireless,
}

impl fmt::Display for ControllerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerFamily::Xbox => write!(f, "xbox"),
            ControllerFamily::Xbox360 => write!(f, "xbox360"),
            ControllerFamily::Xbox360Wireless => write!(f, "xbox360-wireless"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedDevice {
    pub family: ControllerFamily,
    pub vendor: u16,
    pub product: u16,
    pub name: &'static str,
}

const fn dev(family: ControllerFamily, vendor: u16, product: u16, name: &'static str) -> SupportedDevice {
    SupportedDevice {
        family,
        vendor,
        product,
        name,
    }
}

use ControllerFamily::{Xbox, Xbox360, Xbox360Wireless};

pub const SUPPORTED_DEVICES: &[SupportedDevice] = &[
    dev(Xbox, 0x0d2f, 0x0002, "Andamiro Pump It Up pad"),
    dev(Xbox, 0x045e, 0x0202, "Microsoft X-Box pad v1 (US)"),
    dev(Xbox, 0x045e, 0x0285, "Microsoft X-Box pad (Japan)"),
    dev(Xbox, 0x045e, 0x0287, "Microsoft Xbox Controller S"),
    dev(Xbox, 0x045e, 0x0289, "Microsoft X-Box pad v2 (US)"),
    dev(Xbox, 0x046d, 0xca84, "Logitech Xbox Cordless Controller"),
    dev(Xbox, 0x046d, 0xca88, "Logitech Compact Controller for Xbox"),
    dev(Xbox, 0x05fd, 0x1007, "Mad Catz Controller (unverified)"),
    dev(Xbox, 0x05fd, 0x107a, "InterAct 'PowerPad Pro' X-Box pad (Germany)"),
    dev(Xbox, 0x0738, 0x4516, "Mad Catz Control Pad"),
    dev(Xbox, 0x0738, 0x4522, "Mad Catz LumiCON"),
    dev(Xbox, 0x0738, 0x4526, "Mad Catz Control Pad Pro"),
    dev(Xbox, 0x0738, 0x4536, "Mad Catz MicroCON"),
    dev(Xbox, 0x0738, 0x4556, "Mad Catz Lynx Wireless Controller"),
    dev(Xbox, 0x0c12, 0x8802, "Zeroplus Xbox Controller"),
    dev(Xbox, 0x0c12, 0x8810, "Zeroplus Xbox Controller"),
    dev(Xbox, 0x0e4c, 0x1097, "Radica Gamester Controller"),
    dev(Xbox, 0x0e4c, 0x2390, "Radica Games Jtech Controller"),
    dev(Xbox, 0x0e6f, 0x0003, "Logic3 Freebird wireless Controller"),
    dev(Xbox, 0x0e6f, 0x0005, "Eclipse wireless Controller"),
    dev(Xbox, 0x0e6f, 0x0006, "Edge wireless Controller"),
    dev(Xbox, 0x0e8f, 0x0201, "SmartJoy Frag Xpad/PS2 adaptor"),
    dev(Xbox, 0x0f30, 0x0202, "Joytech Advanced Controller"),
    dev(Xbox, 0x0f30, 0x8888, "BigBen XBMiniPad Controller"),
    dev(Xbox, 0x102c, 0xff0c, "Joytech Wireless Advanced Controller"),
    dev(Xbox, 0x044f, 0x0f07, "Thrustmaster, Inc. Controller"),
    dev(Xbox, 0x0e8f, 0x3008, "Generic xbox control (dealextreme)"),
    dev(Xbox360, 0x045e, 0x028e, "Microsoft X-Box 360 pad"),
    dev(Xbox360, 0x0738, 0x4716, "Mad Catz Wired Xbox 360 Controller"),
    dev(Xbox360, 0x0738, 0x4726, "Mad Catz Xbox 360 Controller"),
    dev(Xbox360, 0x0738, 0x4728, "Mad Catz Street Fighter IV FightPad"),
    dev(Xbox360, 0x0738, 0x4718, "Mad Catz Street Fighter IV FightStick SE"),
    dev(Xbox360, 0x0738, 0x4738, "Mad Catz Wired Xbox 360 Controller (SFIV)"),
    dev(Xbox360, 0x0738, 0xbeef, "Mad Catz JOYTECH NEO SE Advanced GamePad"),
    dev(Xbox360, 0x0738, 0xcb02, "Saitek Cyborg Rumble Pad - PC/Xbox 360"),
    dev(Xbox360, 0x0738, 0xcb03, "Saitek P3200 Rumble Pad - PC/Xbox 360"),
    dev(Xbox360, 0x0e6f, 0x0113, "Afterglow AX.1 Gamepad for Xbox 360"),
    dev(Xbox360, 0x0e6f, 0x0201, "Pelican PL-3601 'TSZ' Wired Xbox 360 Controller"),
    dev(Xbox360, 0x0e6f, 0x0213, "Afterglow Gamepad for Xbox 360"),
    dev(Xbox360, 0x0e6f, 0x021f, "Rock Candy Gamepad for Xbox 360"),
    dev(Xbox360, 0x0f0d, 0x000a, "Hori Co. DOA4 FightStick"),
    dev(Xbox360, 0x0f0d, 0x000d, "Hori Fighting Stick EX2"),
    dev(Xbox360, 0x0f0d, 0x0016, "Hori Real Arcade Pro.EX"),
    dev(Xbox360, 0x044f, 0xb326, "Thrustmaster Gamepad GP XID"),
    dev(Xbox360, 0x046d, 0xc21d, "Logitech Gamepad F310"),
    dev(Xbox360, 0x046d, 0xc21e, "Logitech Gamepad F510"),
    dev(Xbox360, 0x046d, 0xc21f, "Logitech Gamepad F710"),
    dev(Xbox360, 0x046d, 0xc242, "Logitech Chillstream Controller"),
    dev(Xbox360, 0x146b, 0x0601, "BigBen Interactive XBOX 360 Controller"),
    dev(Xbox360, 0x1689, 0xfd00, "Razer Onza Tournament Edition"),
    dev(Xbox360, 0x1689, 0xfd01, "Razer Onza Classic Edition"),
    dev(Xbox360, 0x1532, 0x0037, "Razer Sabertooth"),
    dev(Xbox360, 0x15e4, 0x3f00, "Power A Mini Pro Elite"),
    dev(Xbox360, 0x15e4, 0x3f0a, "Xbox Airflo wired controller"),
    dev(Xbox360, 0x15e4, 0x3f10, "Batarang Xbox 360 controller"),
    dev(Xbox360, 0x1bad, 0xf016, "Mad Catz Xbox 360 Controller"),
    dev(Xbox360, 0x1bad, 0xf023, "MLG Pro Circuit Controller (Xbox)"),
    dev(Xbox360, 0x1bad, 0xf900, "Harmonix Xbox 360 Controller"),
    dev(Xbox360, 0x1bad, 0xf901, "Gamestop Xbox 360 Controller"),
    dev(Xbox360, 0x1bad, 0xfa01, "MadCatz GamePad"),
    dev(Xbox360, 0x24c6, 0x5300, "PowerA MINI PROEX Controller"),
    dev(Xbox360, 0x24c6, 0x5303, "Xbox Airflo wired controller"),
    dev(Xbox360, 0x24c6, 0x531a, "PowerA Pro Ex"),
    dev(Xbox360, 0x24c6, 0x5500, "Hori XBOX 360 EX 2 with Turbo"),
    dev(Xbox360, 0x24c6, 0x5501, "Hori Real Arcade Pro VX-SA"),
    dev(Xbox360, 0x24c6, 0x5b02, "Thrustmaster, Inc. GPX Controller"),
    dev(Xbox360Wireless, 0x045e, 0x0291, "Xbox 360 Wireless Receiver (XBOX)"),
    dev(Xbox360Wireless, 0x045e, 0x0719, "Xbox 360 Wireless Receiver"),
];

/// Find the table entry of a USB id
pub fn lookup(vendor: u16, product: u16) -> Option<&'static SupportedDevice> {
    SUPPORTED_DEVICES
        .iter()
        .find(|d| d.vendor == vendor && d.product == product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        let pad = lookup(0x045e, 0x028e).unwrap();
        assert_eq!(pad.family, ControllerFamily::Xbox360);
        assert_eq!(lookup(0x045e, 0x0719).map(|d| d.family), Some(ControllerFamily::Xbox360Wireless));
        assert_eq!(lookup(0x045e, 0x0289).map(|d| d.family), Some(ControllerFamily::Xbox));
        assert!(lookup(0xffff, 0xffff).is_none());
    }

    #[test]
    fn test_table_has_no_duplicate_ids() {
        let mut seen = HashSet::new();
        for d in SUPPORTED_DEVICES {
            assert!(seen.insert((d.vendor, d.product)), "{:04x}:{:04x} listed twice", d.vendor, d.product);
        }
    }
}
