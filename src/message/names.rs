//! Standard gamepad field names
//!
//! All supported controller families report through this one set of names,
//! so a config compiled against it works for any device bound to the slot.

use super::descriptor::{AbsId, KeyId, MessageDescriptor};

/// Ids of the standard gamepad fields in one descriptor
#[derive(Debug, Clone, Copy)]
pub struct GamepadNames {
    pub a: KeyId,
    pub b: KeyId,
    pub x: KeyId,
    pub y: KeyId,
    pub lb: KeyId,
    pub rb: KeyId,
    pub start: KeyId,
    pub back: KeyId,
    pub guide: KeyId,
    pub thumb_l: KeyId,
    pub thumb_r: KeyId,
    pub dpad_up: KeyId,
    pub dpad_down: KeyId,
    pub dpad_left: KeyId,
    pub dpad_right: KeyId,
    pub black: KeyId,
    pub white: KeyId,

    pub x1: AbsId,
    pub y1: AbsId,
    pub x2: AbsId,
    pub y2: AbsId,
    pub lt: AbsId,
    pub rt: AbsId,

    /// Pressure of the analog face buttons (original Xbox only)
    pub abs_a: AbsId,
    pub abs_b: AbsId,
    pub abs_x: AbsId,
    pub abs_y: AbsId,
    pub abs_black: AbsId,
    pub abs_white: AbsId,
}

impl GamepadNames {
    /// Register (or resolve) every standard name in `desc`
    pub fn register(desc: &mut MessageDescriptor) -> Self {
        let names = Self {
            a: desc.key.put("a"),
            b: desc.key.put("b"),
            x: desc.key.put("x"),
            y: desc.key.put("y"),
            lb: desc.key.put("lb"),
            rb: desc.key.put("rb"),
            start: desc.key.put("start"),
            back: desc.key.put("back"),
            guide: desc.key.put("guide"),
            thumb_l: desc.key.put("thumb_l"),
            thumb_r: desc.key.put("thumb_r"),
            dpad_up: desc.key.put("dpad_up"),
            dpad_down: desc.key.put("dpad_down"),
            dpad_left: desc.key.put("dpad_left"),
            dpad_right: desc.key.put("dpad_right"),
            black: desc.key.put("black"),
            white: desc.key.put("white"),

            x1: desc.abs.put_range("x1", -32768, 32767),
            y1: desc.abs.put_range("y1", -32768, 32767),
            x2: desc.abs.put_range("x2", -32768, 32767),
            y2: desc.abs.put_range("y2", -32768, 32767),
            lt: desc.abs.put_range("lt", 0, 255),
            rt: desc.abs.put_range("rt", 0, 255),

            abs_a: desc.abs.put_range("a", 0, 255),
            abs_b: desc.abs.put_range("b", 0, 255),
            abs_x: desc.abs.put_range("x", 0, 255),
            abs_y: desc.abs.put_range("y", 0, 255),
            abs_black: desc.abs.put_range("black", 0, 255),
            abs_white: desc.abs.put_range("white", 0, 255),
        };

        desc.key.alias("du", names.dpad_up);
        desc.key.alias("dd", names.dpad_down);
        desc.key.alias("dl", names.dpad_left);
        desc.key.alias("dr", names.dpad_right);
        desc.key.alias("select", names.back);
        desc.key.alias("mode", names.guide);
        desc.key.alias("tl", names.thumb_l);
        desc.key.alias("tr", names.thumb_r);

        // motion and IR channels, reported by devices that have them
        desc.abs.put_range("acc_x", -512, 511);
        desc.abs.put_range("acc_y", -512, 511);
        desc.abs.put_range("acc_z", -512, 511);
        desc.abs.put_range("ir1_x", 0, 1023);
        desc.abs.put_range("ir1_y", 0, 1023);
        desc.abs.put_range("ir1_size", -1, 15);

        names
    }

    /// The four stick axes
    pub fn sticks(&self) -> [AbsId; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Dpad keys in up, down, left, right order
    pub fn dpad(&self) -> [KeyId; 4] {
        [self.dpad_up, self.dpad_down, self.dpad_left, self.dpad_right]
    }
}

/// Descriptor holding exactly the standard gamepad names
pub fn gamepad_descriptor() -> (MessageDescriptor, GamepadNames) {
    let mut desc = MessageDescriptor::new();
    let names = GamepadNames::register(&mut desc);
    (desc, names)
}
