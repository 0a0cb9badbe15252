//! Dpad modifiers

use std::fmt;
use std::str::FromStr;

use crate::message::{ControllerMessage, KeyId, MessageDescriptor};

use super::{Modifier, ModifierError};

/// The four dpad keys in up, down, left, right order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpad {
    pub up: KeyId,
    pub down: KeyId,
    pub left: KeyId,
    pub right: KeyId,
}

impl Dpad {
    pub fn resolve(desc: &MessageDescriptor) -> Result<Self, ModifierError> {
        Ok(Self {
            up: desc.key.get("dpad_up")?,
            down: desc.key.get("dpad_down")?,
            left: desc.key.get("dpad_left")?,
            right: desc.key.get("dpad_right")?,
        })
    }

    /// Current direction: 0 is up, then clockwise in 45 degree steps
    fn direction(&self, msg: &ControllerMessage) -> Option<u8> {
        let state = (
            msg.key(self.up),
            msg.key(self.down),
            msg.key(self.left),
            msg.key(self.right),
        );
        match state {
            (true, false, false, false) => Some(0),
            (true, false, false, true) => Some(1),
            (false, false, false, true) => Some(2),
            (false, true, false, true) => Some(3),
            (false, true, false, false) => Some(4),
            (false, true, true, false) => Some(5),
            (false, false, true, false) => Some(6),
            (true, false, true, false) => Some(7),
            _ => None,
        }
    }

    fn set_direction(&self, msg: &mut ControllerMessage, direction: u8) {
        let (up, down, left, right) = match direction % 8 {
            0 => (true, false, false, false),
            1 => (true, false, false, true),
            2 => (false, false, false, true),
            3 => (false, true, false, true),
            4 => (false, true, false, false),
            5 => (false, true, true, false),
            6 => (false, false, true, false),
            _ => (true, false, true, false),
        };
        msg.set_key(self.up, up);
        msg.set_key(self.down, down);
        msg.set_key(self.left, left);
        msg.set_key(self.right, right);
    }
}

/// Convert degrees into 45 degree steps, modulo 8
pub fn rotation_steps(degrees: i32) -> u8 {
    ((degrees / 45).rem_euclid(8)) as u8
}

#[derive(Debug, Clone)]
pub struct DpadRotationModifier {
    dpad: Dpad,
    steps: u8,
}

impl DpadRotationModifier {
    pub fn new(dpad: Dpad, steps: u8) -> Self {
        Self { dpad, steps: steps % 8 }
    }
}

impl Modifier for DpadRotationModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        if let Some(direction) = self.dpad.direction(msg) {
            self.dpad.set_direction(msg, direction + self.steps);
        }
    }

    fn describe(&self, _desc: &MessageDescriptor) -> String {
        format!("dpad-rotation:{}", self.steps as u32 * 45)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictMode {
    FourWay,
    XAxis,
    YAxis,
}

impl FromStr for RestrictMode {
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xy" | "fourway" | "four-way" => Ok(RestrictMode::FourWay),
            "x" | "x-axis" | "xaxis" | "horz" | "horizontal" => Ok(RestrictMode::XAxis),
            "y" | "y-axis" | "yaxis" | "vert" | "vertical" => Ok(RestrictMode::YAxis),
            _ => Err(ModifierError::InvalidArgument {
                modifier: "dpad-restrictor".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RestrictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictMode::FourWay => write!(f, "four-way"),
            RestrictMode::XAxis => write!(f, "x-axis"),
            RestrictMode::YAxis => write!(f, "y-axis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DpadAxis {
    Horizontal,
    Vertical,
}

/// Restrict the dpad to one axis, or to four directions.
///
/// In four-way mode a diagonal keeps the axis that was pressed first.
#[derive(Debug, Clone)]
pub struct DpadRestrictorModifier {
    dpad: Dpad,
    mode: RestrictMode,
    last_unpressed: Option<DpadAxis>,
}

impl DpadRestrictorModifier {
    pub fn new(dpad: Dpad, mode: RestrictMode) -> Self {
        Self {
            dpad,
            mode,
            last_unpressed: None,
        }
    }

    fn clear(&self, msg: &mut ControllerMessage, axis: DpadAxis) {
        match axis {
            DpadAxis::Horizontal => {
                msg.set_key(self.dpad.left, false);
                msg.set_key(self.dpad.right, false);
            }
            DpadAxis::Vertical => {
                msg.set_key(self.dpad.up, false);
                msg.set_key(self.dpad.down, false);
            }
        }
    }
}

impl Modifier for DpadRestrictorModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        match self.mode {
            RestrictMode::XAxis => self.clear(msg, DpadAxis::Vertical),
            RestrictMode::YAxis => self.clear(msg, DpadAxis::Horizontal),
            RestrictMode::FourWay => {
                let horizontal = msg.key(self.dpad.left) || msg.key(self.dpad.right);
                let vertical = msg.key(self.dpad.up) || msg.key(self.dpad.down);
                match (horizontal, vertical) {
                    (true, true) => {
                        let axis = self.last_unpressed.unwrap_or(DpadAxis::Horizontal);
                        self.clear(msg, axis);
                    }
                    (true, false) => self.last_unpressed = Some(DpadAxis::Vertical),
                    (false, true) => self.last_unpressed = Some(DpadAxis::Horizontal),
                    (false, false) => {}
                }
            }
        }
    }

    fn describe(&self, _desc: &MessageDescriptor) -> String {
        format!("dpad-restrictor:{}", self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_rotation_steps() {
        assert_eq!(rotation_steps(90), 2);
        assert_eq!(rotation_steps(-90), 6);
        assert_eq!(rotation_steps(360), 0);
        assert_eq!(rotation_steps(44), 0);
    }

    #[test]
    fn test_dpad_rotation_by_90_degrees() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = DpadRotationModifier::new(Dpad::resolve(&desc).unwrap(), rotation_steps(90));

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.dpad_up, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.dpad_right));
        assert!(!msg.key(names.dpad_up));

        // up-left becomes up-right
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.dpad_up, true);
        msg.set_key(names.dpad_left, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.dpad_up));
        assert!(msg.key(names.dpad_right));
        assert!(!msg.key(names.dpad_left));
    }

    #[test]
    fn test_dpad_rotation_ignores_impossible_combinations() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = DpadRotationModifier::new(Dpad::resolve(&desc).unwrap(), 2);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.dpad_up, true);
        msg.set_key(names.dpad_down, true);
        let before = msg.clone();
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg, before);
    }

    #[test]
    fn test_restrictor_four_way_keeps_first_axis() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = DpadRestrictorModifier::new(Dpad::resolve(&desc).unwrap(), RestrictMode::FourWay);

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.dpad_left, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.dpad_left));

        msg.set_key(names.dpad_up, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.dpad_left));
        assert!(!msg.key(names.dpad_up));
    }

    #[test]
    fn test_restrictor_axis_modes() {
        let (desc, names) = gamepad_descriptor();
        let dpad = Dpad::resolve(&desc).unwrap();
        let mut x_only = DpadRestrictorModifier::new(dpad, "horz".parse().unwrap());
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.dpad_down, true);
        msg.set_key(names.dpad_right, true);
        x_only.update(10, &mut msg, &desc);
        assert!(!msg.key(names.dpad_down));
        assert!(msg.key(names.dpad_right));
        assert!("diagonal".parse::<RestrictMode>().is_err());
    }
}
