//! Motion, button-to-axis, copy, latency and logging modifiers

use std::collections::VecDeque;
use std::f32::consts::PI;

use tracing::info;

use crate::message::{AbsId, ControllerMessage, KeyId, MessageDescriptor, MessageLine};

use super::Modifier;

/// Accelerometer tilt to two axes
#[derive(Debug, Clone)]
pub struct Acc2AxisModifier {
    acc: [AbsId; 3],
    out_x: AbsId,
    out_y: AbsId,
}

impl Acc2AxisModifier {
    pub fn new(acc: [AbsId; 3], out_x: AbsId, out_y: AbsId) -> Self {
        Self { acc, out_x, out_y }
    }
}

impl Modifier for Acc2AxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let ax = msg.abs_float(self.acc[0]);
        let ay = msg.abs_float(self.acc[1]);
        let az = msg.abs_float(self.acc[2]);

        let mut rx = -(az.atan2(ax) - PI / 2.0);
        let mut ry = -(az.atan2(ay) - PI / 2.0);
        if rx > PI {
            rx -= 2.0 * PI;
        }
        if ry > PI {
            ry -= 2.0 * PI;
        }
        ry = -ry;

        // beyond a quarter turn the reading is too noisy to use
        msg.set_abs_float(self.out_x, (rx / (PI / 2.0)).clamp(-1.0, 1.0));
        msg.set_abs_float(self.out_y, (ry / (PI / 2.0)).clamp(-1.0, 1.0));
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "acc2axis:{}:{}:{}:{}:{}",
            desc.abs.name(self.acc[0]),
            desc.abs.name(self.acc[1]),
            desc.abs.name(self.acc[2]),
            desc.abs.name(self.out_x),
            desc.abs.name(self.out_y)
        )
    }
}

/// IR blob position to two axes, held while the blob is lost
#[derive(Debug, Clone)]
pub struct Ir2AxisModifier {
    x: AbsId,
    y: AbsId,
    size: AbsId,
    out_x: AbsId,
    out_y: AbsId,
}

impl Ir2AxisModifier {
    pub fn new(x: AbsId, y: AbsId, size: AbsId, out_x: AbsId, out_y: AbsId) -> Self {
        Self {
            x,
            y,
            size,
            out_x,
            out_y,
        }
    }
}

impl Modifier for Ir2AxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        if msg.abs(self.size) >= 0 {
            let x = msg.abs_float(self.x);
            let y = msg.abs_float(self.y);
            msg.set_abs_float(self.out_x, x);
            msg.set_abs_float(self.out_y, y);
        }
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "ir2axis:{}:{}:{}:{}:{}",
            desc.abs.name(self.x),
            desc.abs.name(self.y),
            desc.abs.name(self.size),
            desc.abs.name(self.out_x),
            desc.abs.name(self.out_y)
        )
    }
}

/// Two buttons driving one axis: LHS gives min, RHS gives max
#[derive(Debug, Clone)]
pub struct Btn2AxisModifier {
    lhs: KeyId,
    rhs: KeyId,
    axis: AbsId,
}

impl Btn2AxisModifier {
    pub fn new(lhs: KeyId, rhs: KeyId, axis: AbsId) -> Self {
        Self { lhs, rhs, axis }
    }
}

impl Modifier for Btn2AxisModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let (min, max) = msg.abs_range(self.axis);
        let value = match (msg.key(self.lhs), msg.key(self.rhs)) {
            (true, false) => min,
            (false, true) => max,
            _ => 0,
        };
        msg.set_abs(self.axis, value);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!(
            "btn2axis:{}:{}:{}",
            desc.key.name(self.lhs),
            desc.key.name(self.rhs),
            desc.abs.name(self.axis)
        )
    }
}

#[derive(Debug, Clone)]
pub struct KeyCopyModifier {
    from: KeyId,
    to: KeyId,
}

impl KeyCopyModifier {
    pub fn new(from: KeyId, to: KeyId) -> Self {
        Self { from, to }
    }
}

impl Modifier for KeyCopyModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        let value = msg.key(self.from) || msg.key(self.to);
        msg.set_key(self.to, value);
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        format!("key-copy:{}:{}", desc.key.name(self.from), desc.key.name(self.to))
    }
}

/// Delay whole messages by a fixed number of milliseconds
#[derive(Debug, Clone)]
pub struct LatencyModifier {
    latency: u32,
    time: u64,
    queue: VecDeque<(u64, ControllerMessage)>,
    current: Option<ControllerMessage>,
}

impl LatencyModifier {
    pub fn new(latency: u32) -> Self {
        Self {
            latency,
            time: 0,
            queue: VecDeque::new(),
            current: None,
        }
    }
}

impl Modifier for LatencyModifier {
    fn update(&mut self, dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        self.time += dt_ms as u64;
        self.queue.push_back((self.time + self.latency as u64, msg.clone()));

        while self.queue.front().is_some_and(|(due, _)| *due <= self.time) {
            self.current = self.queue.pop_front().map(|(_, m)| m);
        }

        // nothing due yet: hold the oldest queued message
        if let Some(current) = self.current.as_ref().or_else(|| self.queue.front().map(|(_, m)| m)) {
            *msg = current.clone();
        }
    }

    fn describe(&self, _desc: &MessageDescriptor) -> String {
        format!("latency:{}", self.latency)
    }
}

/// Trace the message line at info level
#[derive(Debug, Clone)]
pub struct LogModifier {
    prefix: String,
}

impl LogModifier {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Modifier for LogModifier {
    fn update(&mut self, _dt_ms: u32, msg: &mut ControllerMessage, desc: &MessageDescriptor) {
        info!(prefix = %self.prefix, "{}", MessageLine::new(msg, desc));
    }

    fn describe(&self, _desc: &MessageDescriptor) -> String {
        format!("log:{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_btn2axis() {
        let (mut desc, names) = gamepad_descriptor();
        let axis = desc.abs.put("throttle");
        let mut modifier = Btn2AxisModifier::new(names.lb, names.rb, axis);
        let mut msg = ControllerMessage::new(&desc);

        msg.set_key(names.lb, true);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(axis), -32768);

        msg.set_key(names.rb, true);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(axis), 0);

        msg.set_key(names.lb, false);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(axis), 32767);
    }

    #[test]
    fn test_key_copy_ors_into_target() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = KeyCopyModifier::new(names.a, names.b);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.a, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.a));
        assert!(msg.key(names.b));

        msg.set_key(names.a, false);
        msg.set_key(names.b, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.b));
    }

    #[test]
    fn test_ir2axis_holds_when_blob_lost() {
        let (desc, names) = gamepad_descriptor();
        let ir_x = desc.abs.get("ir1_x").unwrap();
        let ir_y = desc.abs.get("ir1_y").unwrap();
        let size = desc.abs.get("ir1_size").unwrap();
        let mut modifier = Ir2AxisModifier::new(ir_x, ir_y, size, names.x2, names.y2);
        let mut msg = ControllerMessage::new(&desc);

        msg.set_abs(ir_x, 1023);
        msg.set_abs(size, 3);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x2), 32767);

        msg.set_abs(ir_x, 0);
        msg.set_abs(size, -1);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x2), 32767);
    }

    #[test]
    fn test_acc2axis_level_is_centered() {
        let (desc, names) = gamepad_descriptor();
        let acc = [
            desc.abs.get("acc_x").unwrap(),
            desc.abs.get("acc_y").unwrap(),
            desc.abs.get("acc_z").unwrap(),
        ];
        let mut modifier = Acc2AxisModifier::new(acc, names.x1, names.y1);
        let mut msg = ControllerMessage::new(&desc);
        // gravity straight along z
        msg.set_abs(acc[0], 0);
        msg.set_abs(acc[1], 0);
        msg.set_abs(acc[2], 511);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.abs(names.x1).abs() <= 1);
        assert!(msg.abs(names.y1).abs() <= 1);
    }

    #[test]
    fn test_latency_delays_messages() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = LatencyModifier::new(30);
        let mut pressed = ControllerMessage::new(&desc);
        pressed.set_key(names.a, true);
        let released = ControllerMessage::new(&desc);

        let mut msg = released.clone();
        modifier.update(10, &mut msg, &desc);
        assert!(!msg.key(names.a));

        for _ in 0..2 {
            let mut msg = pressed.clone();
            modifier.update(10, &mut msg, &desc);
            assert!(!msg.key(names.a));
        }

        // the press was queued at t=20, due at t=50
        let mut msg = pressed.clone();
        modifier.update(10, &mut msg, &desc);
        assert!(!msg.key(names.a));
        let mut msg = pressed.clone();
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.a));
    }

    #[test]
    fn test_latency_zero_is_passthrough() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = LatencyModifier::new(0);
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.a, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.a));
    }
}
