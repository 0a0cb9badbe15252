//! Linux input event code names

use super::{EventKind, OutputError};

/// BUS_USB from linux/input.h
pub const BUS_USB: u16 = 0x03;

pub const BTN_LEFT: u16 = 0x110;
pub const BTN_TASK: u16 = 0x117;

const KEY_CODES: &[(&str, u16)] = &[
    ("KEY_RESERVED", 0),
    ("KEY_ESC", 1),
    ("KEY_1", 2),
    ("KEY_2", 3),
    ("KEY_3", 4),
    ("KEY_4", 5),
    ("KEY_5", 6),
    ("KEY_6", 7),
    ("KEY_7", 8),
    ("KEY_8", 9),
    ("KEY_9", 10),
    ("KEY_0", 11),
    ("KEY_MINUS", 12),
    ("KEY_EQUAL", 13),
    ("KEY_BACKSPACE", 14),
    ("KEY_TAB", 15),
    ("KEY_Q", 16),
    ("KEY_W", 17),
    ("KEY_E", 18),
    ("KEY_R", 19),
    ("KEY_T", 20),
    ("KEY_Y", 21),
    ("KEY_U", 22),
    ("KEY_I", 23),
    ("KEY_O", 24),
    ("KEY_P", 25),
    ("KEY_LEFTBRACE", 26),
    ("KEY_RIGHTBRACE", 27),
    ("KEY_ENTER", 28),
    ("KEY_LEFTCTRL", 29),
    ("KEY_A", 30),
    ("KEY_S", 31),
    ("KEY_D", 32),
    ("KEY_F", 33),
    ("KEY_G", 34),
    ("KEY_H", 35),
    ("KEY_J", 36),
    ("KEY_K", 37),
    ("KEY_L", 38),
    ("KEY_SEMICOLON", 39),
    ("KEY_APOSTROPHE", 40),
    ("KEY_GRAVE", 41),
    ("KEY_LEFTSHIFT", 42),
    ("KEY_BACKSLASH", 43),
    ("KEY_Z", 44),
    ("KEY_X", 45),
    ("KEY_C", 46),
    ("KEY_V", 47),
    ("KEY_B", 48),
    ("KEY_N", 49),
    ("KEY_M", 50),
    ("KEY_COMMA", 51),
    ("KEY_DOT", 52),
    ("KEY_SLASH", 53),
    ("KEY_RIGHTSHIFT", 54),
    ("KEY_KPASTERISK", 55),
    ("KEY_LEFTALT", 56),
    ("KEY_SPACE", 57),
    ("KEY_CAPSLOCK", 58),
    ("KEY_F1", 59),
    ("KEY_F2", 60),
    ("KEY_F3", 61),
    ("KEY_F4", 62),
    ("KEY_F5", 63),
    ("KEY_F6", 64),
    ("KEY_F7", 65),
    ("KEY_F8", 66),
    ("KEY_F9", 67),
    ("KEY_F10", 68),
    ("KEY_NUMLOCK", 69),
    ("KEY_SCROLLLOCK", 70),
    ("KEY_KP7", 71),
    ("KEY_KP8", 72),
    ("KEY_KP9", 73),
    ("KEY_KPMINUS", 74),
    ("KEY_KP4", 75),
    ("KEY_KP5", 76),
    ("KEY_KP6", 77),
    ("KEY_KPPLUS", 78),
    ("KEY_KP1", 79),
    ("KEY_KP2", 80),
    ("KEY_KP3", 81),
    ("KEY_KP0", 82),
    ("KEY_KPDOT", 83),
    ("KEY_F11", 87),
    ("KEY_F12", 88),
    ("KEY_KPENTER", 96),
    ("KEY_RIGHTCTRL", 97),
    ("KEY_KPSLASH", 98),
    ("KEY_SYSRQ", 99),
    ("KEY_RIGHTALT", 100),
    ("KEY_HOME", 102),
    ("KEY_UP", 103),
    ("KEY_PAGEUP", 104),
    ("KEY_LEFT", 105),
    ("KEY_RIGHT", 106),
    ("KEY_END", 107),
    ("KEY_DOWN", 108),
    ("KEY_PAGEDOWN", 109),
    ("KEY_INSERT", 110),
    ("KEY_DELETE", 111),
    ("KEY_MUTE", 113),
    ("KEY_VOLUMEDOWN", 114),
    ("KEY_VOLUMEUP", 115),
    ("KEY_POWER", 116),
    ("KEY_PAUSE", 119),
    ("KEY_LEFTMETA", 125),
    ("KEY_RIGHTMETA", 126),
    ("KEY_COMPOSE", 127),
    ("KEY_BACK", 158),
    ("KEY_FORWARD", 159),
    ("KEY_NEXTSONG", 163),
    ("KEY_PLAYPAUSE", 164),
    ("KEY_PREVIOUSSONG", 165),
    ("KEY_STOPCD", 166),
    ("KEY_HOMEPAGE", 172),
    ("KEY_F13", 183),
    ("KEY_F14", 184),
    ("KEY_F15", 185),
    ("KEY_F16", 186),
    ("KEY_F17", 187),
    ("KEY_F18", 188),
    ("KEY_F19", 189),
    ("KEY_F20", 190),
    ("KEY_F21", 191),
    ("KEY_F22", 192),
    ("KEY_F23", 193),
    ("KEY_F24", 194),
    ("BTN_0", 0x100),
    ("BTN_1", 0x101),
    ("BTN_2", 0x102),
    ("BTN_3", 0x103),
    ("BTN_4", 0x104),
    ("BTN_5", 0x105),
    ("BTN_6", 0x106),
    ("BTN_7", 0x107),
    ("BTN_8", 0x108),
    ("BTN_9", 0x109),
    ("BTN_LEFT", 0x110),
    ("BTN_RIGHT", 0x111),
    ("BTN_MIDDLE", 0x112),
    ("BTN_SIDE", 0x113),
    ("BTN_EXTRA", 0x114),
    ("BTN_FORWARD", 0x115),
    ("BTN_BACK", 0x116),
    ("BTN_TASK", 0x117),
    ("BTN_TRIGGER", 0x120),
    ("BTN_THUMB", 0x121),
    ("BTN_THUMB2", 0x122),
    ("BTN_TOP", 0x123),
    ("BTN_TOP2", 0x124),
    ("BTN_PINKIE", 0x125),
    ("BTN_BASE", 0x126),
    ("BTN_BASE2", 0x127),
    ("BTN_BASE3", 0x128),
    ("BTN_BASE4", 0x129),
    ("BTN_BASE5", 0x12a),
    ("BTN_BASE6", 0x12b),
    ("BTN_DEAD", 0x12f),
    ("BTN_A", 0x130),
    ("BTN_SOUTH", 0x130),
    ("BTN_B", 0x131),
    ("BTN_EAST", 0x131),
    ("BTN_C", 0x132),
    ("BTN_X", 0x133),
    ("BTN_NORTH", 0x133),
    ("BTN_Y", 0x134),
    ("BTN_WEST", 0x134),
    ("BTN_Z", 0x135),
    ("BTN_TL", 0x136),
    ("BTN_TR", 0x137),
    ("BTN_TL2", 0x138),
    ("BTN_TR2", 0x139),
    ("BTN_SELECT", 0x13a),
    ("BTN_START", 0x13b),
    ("BTN_MODE", 0x13c),
    ("BTN_THUMBL", 0x13d),
    ("BTN_THUMBR", 0x13e),
    ("BTN_DPAD_UP", 0x220),
    ("BTN_DPAD_DOWN", 0x221),
    ("BTN_DPAD_LEFT", 0x222),
    ("BTN_DPAD_RIGHT", 0x223),
];

/// First BTN_TRIGGER_HAPPY code; the range runs to BTN_TRIGGER_HAPPY40
const BTN_TRIGGER_HAPPY1: u16 = 0x2c0;

const ABS_CODES: &[(&str, u16)] = &[
    ("ABS_X", 0x00),
    ("ABS_Y", 0x01),
    ("ABS_Z", 0x02),
    ("ABS_RX", 0x03),
    ("ABS_RY", 0x04),
    ("ABS_RZ", 0x05),
    ("ABS_THROTTLE", 0x06),
    ("ABS_RUDDER", 0x07),
    ("ABS_WHEEL", 0x08),
    ("ABS_GAS", 0x09),
    ("ABS_BRAKE", 0x0a),
    ("ABS_HAT0X", 0x10),
    ("ABS_HAT0Y", 0x11),
    ("ABS_HAT1X", 0x12),
    ("ABS_HAT1Y", 0x13),
    ("ABS_HAT2X", 0x14),
    ("ABS_HAT2Y", 0x15),
    ("ABS_HAT3X", 0x16),
    ("ABS_HAT3Y", 0x17),
    ("ABS_PRESSURE", 0x18),
    ("ABS_DISTANCE", 0x19),
    ("ABS_TILT_X", 0x1a),
    ("ABS_TILT_Y", 0x1b),
    ("ABS_MISC", 0x28),
];

const REL_CODES: &[(&str, u16)] = &[
    ("REL_X", 0x00),
    ("REL_Y", 0x01),
    ("REL_Z", 0x02),
    ("REL_RX", 0x03),
    ("REL_RY", 0x04),
    ("REL_RZ", 0x05),
    ("REL_HWHEEL", 0x06),
    ("REL_DIAL", 0x07),
    ("REL_WHEEL", 0x08),
    ("REL_MISC", 0x09),
    ("REL_WHEEL_HI_RES", 0x0b),
    ("REL_HWHEEL_HI_RES", 0x0c),
];

fn lookup(table: &[(&str, u16)], name: &str) -> Option<u16> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

fn reverse(table: &[(&'static str, u16)], code: u16) -> Option<&'static str> {
    table.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
}

/// Parse the `#NUM` raw form, e.g. `KEY_#30`
fn raw_code(name: &str) -> Option<u16> {
    let (_, num) = name.split_once('#')?;
    num.parse().ok()
}

pub fn key_code(name: &str) -> Result<u16, OutputError> {
    if let Some(code) = raw_code(name) {
        return Ok(code);
    }
    if let Some(code) = lookup(KEY_CODES, name) {
        return Ok(code);
    }
    let upper = name.to_ascii_uppercase();
    if let Some(n) = upper.strip_prefix("BTN_TRIGGER_HAPPY") {
        if let Ok(n @ 1..=40) = n.parse::<u16>() {
            return Ok(BTN_TRIGGER_HAPPY1 + n - 1);
        }
    }
    Err(OutputError::UnknownEvent(name.to_string()))
}

pub fn abs_code(name: &str) -> Result<u16, OutputError> {
    raw_code(name)
        .or_else(|| lookup(ABS_CODES, name))
        .ok_or_else(|| OutputError::UnknownEvent(name.to_string()))
}

pub fn rel_code(name: &str) -> Result<u16, OutputError> {
    raw_code(name)
        .or_else(|| lookup(REL_CODES, name))
        .ok_or_else(|| OutputError::UnknownEvent(name.to_string()))
}

/// Event kind implied by a name's prefix (`KEY_`/`BTN_`, `ABS_`, `REL_`)
pub fn event_kind(name: &str) -> Option<EventKind> {
    let upper = name.to_ascii_uppercase();
    if upper.starts_with("KEY_") || upper.starts_with("BTN_") {
        Some(EventKind::Key)
    } else if upper.starts_with("ABS_") {
        Some(EventKind::Abs)
    } else if upper.starts_with("REL_") {
        Some(EventKind::Rel)
    } else {
        None
    }
}

/// Resolve any event name to its kind and code
pub fn parse_event_code(name: &str) -> Result<(EventKind, u16), OutputError> {
    match event_kind(name) {
        Some(EventKind::Key) => Ok((EventKind::Key, key_code(name)?)),
        Some(EventKind::Abs) => Ok((EventKind::Abs, abs_code(name)?)),
        Some(EventKind::Rel) => Ok((EventKind::Rel, rel_code(name)?)),
        None => Err(OutputError::UnknownEvent(name.to_string())),
    }
}

/// Canonical name of a code, or `KIND_#code` if it has none
pub fn code_name(kind: EventKind, code: u16) -> String {
    let name = match kind {
        EventKind::Key => reverse(KEY_CODES, code),
        EventKind::Abs => reverse(ABS_CODES, code),
        EventKind::Rel => reverse(REL_CODES, code),
    };
    match (name, kind) {
        (Some(name), _) => name.to_string(),
        (None, EventKind::Key) if (BTN_TRIGGER_HAPPY1..BTN_TRIGGER_HAPPY1 + 40).contains(&code) => {
            format!("BTN_TRIGGER_HAPPY{}", code - BTN_TRIGGER_HAPPY1 + 1)
        }
        (None, EventKind::Key) => format!("KEY_#{}", code),
        (None, EventKind::Abs) => format!("ABS_#{}", code),
        (None, EventKind::Rel) => format!("REL_#{}", code),
    }
}

/// Mouse buttons live on the mouse device when extra devices are enabled
pub fn is_mouse_button(code: u16) -> bool {
    (BTN_LEFT..=BTN_TASK).contains(&code)
}

/// Keyboard keys (as opposed to BTN_ codes) are below the BTN_ range
pub fn is_keyboard_key(code: u16) -> bool {
    code < 0x100 || (0x160..0x200).contains(&code)
}

/// Vendor, product, version and bus of a virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputIdSpec {
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub bustype: u16,
}

impl Default for InputIdSpec {
    fn default() -> Self {
        // Microsoft X-Box 360 pad
        Self {
            vendor: 0x045e,
            product: 0x028e,
            version: 0,
            bustype: BUS_USB,
        }
    }
}

/// Parse `VENDOR:PRODUCT[:VERSION[:BUS]]`, all in hex
pub fn parse_input_id(s: &str) -> Result<InputIdSpec, OutputError> {
    let invalid = || OutputError::InvalidInputId(s.to_string());
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    if !(2..=4).contains(&parts.len()) {
        return Err(invalid());
    }
    let hex = |part: &str| {
        let part = part.trim_start_matches("0x");
        u16::from_str_radix(part, 16).map_err(|_| invalid())
    };
    Ok(InputIdSpec {
        vendor: hex(parts[0])?,
        product: hex(parts[1])?,
        version: parts.get(2).map(|p| hex(p)).transpose()?.unwrap_or(0),
        bustype: parts.get(3).map(|p| hex(p)).transpose()?.unwrap_or(BUS_USB),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_codes() {
        assert_eq!(parse_event_code("BTN_A").unwrap(), (EventKind::Key, 0x130));
        assert_eq!(parse_event_code("btn_south").unwrap(), (EventKind::Key, 0x130));
        assert_eq!(parse_event_code("KEY_#30").unwrap(), (EventKind::Key, 30));
        assert_eq!(parse_event_code("ABS_HAT0Y").unwrap(), (EventKind::Abs, 0x11));
        assert_eq!(parse_event_code("REL_WHEEL").unwrap(), (EventKind::Rel, 0x08));
        assert_eq!(parse_event_code("BTN_TRIGGER_HAPPY3").unwrap(), (EventKind::Key, 0x2c2));
        assert!(parse_event_code("KEY_NOPE").is_err());
        assert!(parse_event_code("JS_0").is_err());
    }

    #[test]
    fn test_code_name_round_trip() {
        assert_eq!(code_name(EventKind::Key, 0x13b), "BTN_START");
        assert_eq!(code_name(EventKind::Key, 0x2c1), "BTN_TRIGGER_HAPPY2");
        assert_eq!(code_name(EventKind::Abs, 0x3f), "ABS_#63");
    }

    #[test]
    fn test_device_classes() {
        assert!(is_mouse_button(key_code("BTN_RIGHT").unwrap()));
        assert!(!is_mouse_button(key_code("BTN_A").unwrap()));
        assert!(is_keyboard_key(key_code("KEY_ENTER").unwrap()));
        assert!(!is_keyboard_key(key_code("BTN_LEFT").unwrap()));
    }

    #[test]
    fn test_parse_input_id() {
        let id = parse_input_id("045e:028e").unwrap();
        assert_eq!(id.vendor, 0x045e);
        assert_eq!(id.product, 0x028e);
        assert_eq!(id.version, 0);
        assert_eq!(id.bustype, BUS_USB);

        let id = parse_input_id("dead:beef:0110:5").unwrap();
        assert_eq!(id.version, 0x0110);
        assert_eq!(id.bustype, 5);

        assert!(parse_input_id("045e").is_err());
        assert!(parse_input_id("045e:zzzz").is_err());
    }
}
