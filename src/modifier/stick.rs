//! Stick geometry modifiers

use std::f32::consts::PI;

use crate::message::{AbsId, ControllerMessage, KeyId, MessageDescriptor};

use super::Modifier;

/// Threshold below which a relative axis keeps its integrated state
const RELATIVE_AXIS_THRESHOLD: i32 = 4000;

/// Stick length above which sector2button presses a button
const SECTOR_THRESHOLD: f32 = 0.75;

/// Input and output axes of a two-axis stick modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickAxes {
    pub x_in: AbsId,
    pub y_in: AbsId,
    pub x_out: AbsId,
    pub y_out: AbsId,
}

impl StickAxes {
    pub fn same(x: AbsId, y: AbsId) -> Self {
        Self {
            x_in: x,
            y_in: y,
            x_out: x,
            y_out: y,
        }
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "{}:{}:{}:{}",
            desc.abs.name(self.x_in),
            desc.abs.name(self.y_in),
            desc.abs.name(self.x_out),
            desc.abs.name(self.y_out)
        )
    }
}

// ============================================================================
// Square
// ============================================================================

/// Stretch a circular stick range onto a square
pub fn squarify(x: f32, y: f32) -> (f32, f32) {
    if x == 0.0 && y == 0.0 {
        return (0.0, 0.0);
    }
    let len = (x * x + y * y).sqrt();
    let scale = len / x.abs().max(y.abs());
    ((x * scale).clamp(-1.0, 1.0), (y * scale).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone)]
pub struct SquareAxisModifier {
    axes: StickAxes,
}

impl SquareAxisModifier {
    pub fn new(axes: StickAxes) -> Self {
        Self { axes }
    }
}

impl Modifier for SquareAxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let (x, y) = squarify(msg.abs_float(self.axes.x_in), msg.abs_float(self.axes.y_in));
        msg.set_abs_float(self.axes.x_out, x);
        msg.set_abs_float(self.axes.y_out, y);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!("square:{}", self.axes.describe(desc))
    }
}

// ============================================================================
// Four-way restrictor
// ============================================================================

/// Keep only the dominant axis of a stick
#[derive(Debug, Clone)]
pub struct FourWayModifier {
    axes: StickAxes,
}

impl FourWayModifier {
    pub fn new(axes: StickAxes) -> Self {
        Self { axes }
    }
}

impl Modifier for FourWayModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let x = msg.abs_float(self.axes.x_in);
        let y = msg.abs_float(self.axes.y_in);
        if x.abs() > y.abs() {
            msg.set_abs_float(self.axes.x_out, x);
            msg.set_abs_float(self.axes.y_out, 0.0);
        } else {
            msg.set_abs_float(self.axes.x_out, 0.0);
            msg.set_abs_float(self.axes.y_out, y);
        }
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!("four-way:{}", self.axes.describe(desc))
    }
}

// ============================================================================
// Rotate
// ============================================================================

#[derive(Debug, Clone)]
pub struct RotateAxisModifier {
    x: AbsId,
    y: AbsId,
    degrees: f32,
    mirror: bool,
}

impl RotateAxisModifier {
    pub fn new(x: AbsId, y: AbsId, degrees: f32, mirror: bool) -> Self {
        Self { x, y, degrees, mirror }
    }
}

impl Modifier for RotateAxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let mut x = msg.abs_float(self.x);
        let y = msg.abs_float(self.y);
        if self.mirror {
            x = -x;
        }
        let len = (x * x + y * y).sqrt();
        let angle = y.atan2(x) + self.degrees.to_radians();
        msg.set_abs_float(self.x, angle.cos() * len);
        msg.set_abs_float(self.y, angle.sin() * len);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "rotate:{}:{}:{}:{}",
            desc.abs.name(self.x),
            desc.abs.name(self.y),
            self.degrees,
            u8::from(self.mirror)
        )
    }
}

// ============================================================================
// Split / join
// ============================================================================

/// Split one full axis into two half axes resting at their minimum
#[derive(Debug, Clone)]
pub struct SplitAxisModifier {
    axis: AbsId,
    out_lhs: AbsId,
    out_rhs: AbsId,
}

impl SplitAxisModifier {
    pub fn new(axis: AbsId, out_lhs: AbsId, out_rhs: AbsId) -> Self {
        Self { axis, out_lhs, out_rhs }
    }
}

impl Modifier for SplitAxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let value = msg.abs_float(self.axis);
        let (lhs, rhs) = if value < 0.0 {
            (-value * 2.0 - 1.0, -1.0)
        } else if value > 0.0 {
            (-1.0, value * 2.0 - 1.0)
        } else {
            (-1.0, -1.0)
        };
        msg.set_abs_float(self.out_lhs, lhs);
        msg.set_abs_float(self.out_rhs, rhs);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "split-axis:{}:{}:{}",
            desc.abs.name(self.axis),
            desc.abs.name(self.out_lhs),
            desc.abs.name(self.out_rhs)
        )
    }
}

/// Join two half axes (e.g. triggers) into one full axis
#[derive(Debug, Clone)]
pub struct JoinAxisModifier {
    lhs: AbsId,
    rhs: AbsId,
    out: AbsId,
}

impl JoinAxisModifier {
    pub fn new(lhs: AbsId, rhs: AbsId, out: AbsId) -> Self {
        Self { lhs, rhs, out }
    }
}

impl Modifier for JoinAxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let value = (msg.abs_float(self.rhs) - msg.abs_float(self.lhs)) / 2.0;
        msg.set_abs_float(self.out, value);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "join-axis:{}:{}:{}",
            desc.abs.name(self.lhs),
            desc.abs.name(self.rhs),
            desc.abs.name(self.out)
        )
    }
}

// ============================================================================
// Stick to buttons
// ============================================================================

/// Press one of N buttons depending on which sector the stick points into.
///
/// Sector 0 is centered on "up" and the sectors go clockwise.
#[derive(Debug, Clone)]
pub struct Sector2ButtonModifier {
    x: AbsId,
    y: AbsId,
    buttons: Vec<KeyId>,
}

impl Sector2ButtonModifier {
    pub fn new(x: AbsId, y: AbsId, buttons: Vec<KeyId>) -> Self {
        Self { x, y, buttons }
    }
}

impl Modifier for Sector2ButtonModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let x = msg.abs_float(self.x);
        let y = msg.abs_float(self.y);
        if (x == 0.0 && y == 0.0) || self.buttons.is_empty() {
            return;
        }

        let sector_size = 2.0 * PI / self.buttons.len() as f32;
        let len = (x * x + y * y).sqrt();
        let angle = (y.atan2(x) + PI / 2.0 + sector_size / 2.0 + 4.0 * PI).rem_euclid(2.0 * PI);
        if len > SECTOR_THRESHOLD {
            let sector = ((angle / sector_size) as usize).min(self.buttons.len() - 1);
            msg.set_key(self.buttons[sector], true);
        }
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        let buttons: Vec<&str> = self.buttons.iter().map(|b| desc.key.name(*b)).collect();
        format!(
            "sector2button:{}:{}:{}",
            desc.abs.name(self.x),
            desc.abs.name(self.y),
            buttons.join(":")
        )
    }
}

/// Press a button while the stick deflection lies within `[start, end]`
#[derive(Debug, Clone)]
pub struct StickZoneModifier {
    x: AbsId,
    y: AbsId,
    button: KeyId,
    start: f32,
    end: f32,
}

impl StickZoneModifier {
    pub fn new(x: AbsId, y: AbsId, button: KeyId, start: f32, end: f32) -> Self {
        Self {
            x,
            y,
            button,
            start,
            end,
        }
    }
}

impl Modifier for StickZoneModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let x = msg.abs_float(self.x);
        let y = msg.abs_float(self.y);
        let r = (x * x + y * y).sqrt().min(1.0);
        msg.set_key(self.button, self.start <= r && r <= self.end);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "stick-zone:{}:{}:{}:{}:{}",
            desc.abs.name(self.x),
            desc.abs.name(self.y),
            desc.key.name(self.button),
            self.start,
            self.end
        )
    }
}

// ============================================================================
// Relative axis
// ============================================================================

/// Integrate stick deflection into an absolute position
#[derive(Debug, Clone)]
pub struct RelativeAxisModifier {
    axes: Vec<(AbsId, i32, i32)>,
}

impl RelativeAxisModifier {
    pub fn new() -> Self {
        Self { axes: Vec::new() }
    }

    pub fn add(&mut self, axis: AbsId, speed: i32) {
        self.axes.push((axis, speed, 0));
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

impl Default for RelativeAxisModifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Modifier for RelativeAxisModifier {
    fn update(&mut self, dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        for (axis, speed, state) in &mut self.axes {
            let value = msg.abs(*axis) as i64;
            if value.abs() > RELATIVE_AXIS_THRESHOLD as i64 {
                let delta = (*speed as i64 * value) / 32768 * dt_ms as i64 / 1000;
                *state = (*state as i64 + delta).clamp(-32768, 32767) as i32;
            }
            msg.set_abs(*axis, *state);
        }
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        let entries: Vec<String> = self
            .axes
            .iter()
            .map(|(axis, speed, _)| format!("{}={}", desc.abs.name(*axis), speed))
            .collect();
        format!("relative-axis:{}", entries.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_squarify_diagonal_reaches_corner() {
        let d = std::f32::consts::FRAC_1_SQRT_2;
        let (x, y) = squarify(d, d);
        assert!((x - 1.0).abs() < 1e-4);
        assert!((y - 1.0).abs() < 1e-4);
        assert_eq!(squarify(0.0, 0.0), (0.0, 0.0));
        assert_eq!(squarify(0.5, 0.0), (0.5, 0.0));
    }

    #[test]
    fn test_four_way_keeps_dominant_axis() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = FourWayModifier::new(StickAxes::same(names.x1, names.y1));
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 20000);
        msg.set_abs(names.y1, -10000);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 20000);
        assert_eq!(msg.abs(names.y1), 0);

        msg.set_abs(names.x1, 5000);
        msg.set_abs(names.y1, -10000);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 0);
        assert_eq!(msg.abs(names.y1), -10000);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = RotateAxisModifier::new(names.x1, names.y1, 90.0, false);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs_float(names.x1, 1.0);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.abs(names.x1).abs() <= 2);
        assert_eq!(msg.abs(names.y1), 32767);
    }

    #[test]
    fn test_split_axis() {
        let (mut desc, names) = gamepad_descriptor();
        let lhs = desc.abs.put("x1_neg");
        let rhs = desc.abs.put("x1_pos");
        let mut modifier = SplitAxisModifier::new(names.x1, lhs, rhs);
        let mut msg = ControllerMessage::new(&desc);

        msg.set_abs_float(names.x1, -1.0);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(lhs), 32767);
        assert_eq!(msg.abs(rhs), -32768);

        msg.set_abs(names.x1, 0);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(lhs), -32768);
        assert_eq!(msg.abs(rhs), -32768);
    }

    #[test]
    fn test_join_axis_triggers() {
        let (mut desc, names) = gamepad_descriptor();
        let out = desc.abs.put("trigger");
        let mut modifier = JoinAxisModifier::new(names.lt, names.rt, out);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.lt, 0);
        msg.set_abs(names.rt, 255);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(out), 32767);

        msg.set_abs(names.lt, 255);
        msg.set_abs(names.rt, 0);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(out), -32768);
    }

    #[test]
    fn test_sector2button_up_and_right() {
        let (mut desc, names) = gamepad_descriptor();
        let buttons: Vec<KeyId> = (0..8).map(|i| desc.key.put(&format!("sector{}", i))).collect();
        let mut modifier = Sector2ButtonModifier::new(names.x1, names.y1, buttons.clone());

        // y axis points down in stick space, so -1 is "up"
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs_float(names.y1, -1.0);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(buttons[0]));

        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs_float(names.x1, 1.0);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(buttons[2]));

        // below threshold nothing is pressed
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs_float(names.x1, 0.5);
        modifier.update(10, &mut msg, &desc);
        assert!(buttons.iter().all(|b| !msg.key(*b)));
    }

    #[test]
    fn test_stick_zone() {
        let (mut desc, names) = gamepad_descriptor();
        let btn = desc.key.put("zone");
        let mut modifier = StickZoneModifier::new(names.x1, names.y1, btn, 0.5, 1.0);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs_float(names.x1, 0.25);
        modifier.update(10, &mut msg, &desc);
        assert!(!msg.key(btn));
        msg.set_abs_float(names.x1, 0.75);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(btn));
    }

    #[test]
    fn test_relative_axis_integrates_and_holds() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = RelativeAxisModifier::new();
        modifier.add(names.x1, 32768);
        let mut msg = ControllerMessage::new(&desc);

        msg.set_abs(names.x1, 32767);
        modifier.update(500, &mut msg, &desc);
        // 32768 * 32767 / 32768 * 500 / 1000
        assert_eq!(msg.abs(names.x1), 16383);

        // inside the threshold the state is held
        msg.set_abs(names.x1, 1000);
        modifier.update(500, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 16383);

        msg.set_abs(names.x1, 32767);
        modifier.update(2000, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 32767);
        assert_eq!(modifier.describe(&desc), "relative-axis:x1=32768");
    }
}
