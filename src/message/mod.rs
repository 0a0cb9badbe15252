//! Symbolic controller message
//!
//! A [`ControllerMessage`] is the state of one controller at one point in
//! time, indexed by the ids of a [`MessageDescriptor`]. Decoders fill it in,
//! modifiers transform it and the output wiring turns it into events.

pub mod descriptor;
pub mod names;

use std::fmt;

pub use descriptor::{AbsId, DescriptorError, KeyId, MessageDescriptor, RelId, SymbolId};
pub use names::GamepadNames;

/// Absolute value together with its declared range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AbsSlot {
    value: i32,
    min: i32,
    max: i32,
}

/// State of one controller, keyed by descriptor ids
#[derive(Debug, Clone, Default)]
pub struct ControllerMessage {
    keys: Vec<bool>,
    abs: Vec<AbsSlot>,
    rel: Vec<i32>,
}

impl ControllerMessage {
    /// Create a zeroed message sized and ranged after `desc`
    pub fn new(desc: &MessageDescriptor) -> Self {
        Self {
            keys: vec![false; desc.key.len()],
            abs: desc
                .abs
                .ids()
                .map(|id| {
                    let (min, max) = desc.abs.range(id);
                    AbsSlot { value: 0, min, max }
                })
                .collect(),
            rel: vec![0; desc.rel.len()],
        }
    }

    /// Zero all values, keeping the declared ranges
    pub fn clear(&mut self) {
        self.keys.iter_mut().for_each(|k| *k = false);
        self.abs.iter_mut().for_each(|a| a.value = 0);
        self.rel.iter_mut().for_each(|r| *r = 0);
    }

    /// Take every value of `other`, keeping this message's ranges
    ///
    /// Ids that `other` does not carry are zeroed.
    pub fn assign_values(&mut self, other: &ControllerMessage) {
        self.clear();
        for (index, pressed) in other.keys.iter().enumerate() {
            self.set_key(KeyId::from_index(index), *pressed);
        }
        for (index, slot) in other.abs.iter().enumerate() {
            self.abs_slot_mut(AbsId::from_index(index)).value = slot.value;
        }
        for (index, value) in other.rel.iter().enumerate() {
            self.set_rel(RelId::from_index(index), *value);
        }
    }

    pub fn key(&self, id: KeyId) -> bool {
        self.keys.get(id.index()).copied().unwrap_or(false)
    }

    pub fn set_key(&mut self, id: KeyId, value: bool) {
        let index = id.index();
        if index >= self.keys.len() {
            self.keys.resize(index + 1, false);
        }
        self.keys[index] = value;
    }

    pub fn abs(&self, id: AbsId) -> i32 {
        self.abs.get(id.index()).map(|a| a.value).unwrap_or(0)
    }

    /// Set an absolute value in the axis' declared range
    pub fn set_abs(&mut self, id: AbsId, value: i32) {
        self.abs_slot_mut(id).value = value;
    }

    pub fn abs_range(&self, id: AbsId) -> (i32, i32) {
        self.abs
            .get(id.index())
            .map(|a| (a.min, a.max))
            .unwrap_or(AbsId::DEFAULT_RANGE)
    }

    /// Absolute value mapped onto `[-1, 1]`
    pub fn abs_float(&self, id: AbsId) -> f32 {
        let (min, max) = self.abs_range(id);
        to_float(self.abs(id), min, max)
    }

    /// Set an absolute value from `[-1, 1]`
    pub fn set_abs_float(&mut self, id: AbsId, value: f32) {
        let slot = self.abs_slot_mut(id);
        slot.value = from_float(value, slot.min, slot.max);
    }

    pub fn rel(&self, id: RelId) -> i32 {
        self.rel.get(id.index()).copied().unwrap_or(0)
    }

    pub fn set_rel(&mut self, id: RelId, value: i32) {
        let index = id.index();
        if index >= self.rel.len() {
            self.rel.resize(index + 1, 0);
        }
        self.rel[index] = value;
    }

    fn abs_slot_mut(&mut self, id: AbsId) -> &mut AbsSlot {
        let index = id.index();
        if index >= self.abs.len() {
            let (min, max) = AbsId::DEFAULT_RANGE;
            self.abs.resize(index + 1, AbsSlot { value: 0, min, max });
        }
        &mut self.abs[index]
    }
}

impl PartialEq for ControllerMessage {
    fn eq(&self, other: &Self) -> bool {
        fn padded<T: Copy + PartialEq>(a: &[T], b: &[T], zero: T) -> bool {
            let len = a.len().max(b.len());
            (0..len).all(|i| a.get(i).copied().unwrap_or(zero) == b.get(i).copied().unwrap_or(zero))
        }

        let abs_a: Vec<i32> = self.abs.iter().map(|a| a.value).collect();
        let abs_b: Vec<i32> = other.abs.iter().map(|a| a.value).collect();

        padded(&self.keys, &other.keys, false)
            && padded(&abs_a, &abs_b, 0)
            && padded(&self.rel, &other.rel, 0)
    }
}

/// Human-readable one-line dump of a message (`name:value ...`)
pub struct MessageLine<'a> {
    pub msg: &'a ControllerMessage,
    pub desc: &'a MessageDescriptor,
}

impl<'a> MessageLine<'a> {
    pub fn new(msg: &'a ControllerMessage, desc: &'a MessageDescriptor) -> Self {
        Self { msg, desc }
    }
}

impl fmt::Display for MessageLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            Ok(())
        };

        for id in self.desc.key.ids() {
            sep(f)?;
            write!(f, "{}:{}", self.desc.key.name(id), u8::from(self.msg.key(id)))?;
        }
        for id in self.desc.abs.ids() {
            sep(f)?;
            write!(f, "{}:{}", self.desc.abs.name(id), self.msg.abs(id))?;
        }
        for id in self.desc.rel.ids() {
            let value = self.msg.rel(id);
            if value != 0 {
                sep(f)?;
                write!(f, "{}:{}", self.desc.rel.name(id), value)?;
            }
        }
        Ok(())
    }
}

/// Map `value` from `[min, max]` onto `[-1, 1]` without clamping.
///
/// The center is `(max + min + 1) / 2` so that `[-32768, 32767]` has its
/// center at 0.
pub fn to_float_no_range_check(value: i32, min: i32, max: i32) -> f32 {
    let (value, min, max) = (value as i64, min as i64, max as i64);
    let center = (max + min + 1) / 2;
    if value < center {
        if center == min {
            return 0.0;
        }
        (value - center) as f32 / (center - min) as f32
    } else {
        if max == center {
            return 0.0;
        }
        (value - center) as f32 / (max - center) as f32
    }
}

/// Map `value` from `[min, max]` onto `[-1, 1]`
pub fn to_float(value: i32, min: i32, max: i32) -> f32 {
    to_float_no_range_check(value, min, max).clamp(-1.0, 1.0)
}

/// Map `value` from `[-1, 1]` onto `[min, max]`
pub fn from_float(value: f32, min: i32, max: i32) -> i32 {
    let span = (max as i64 - min as i64) as f64;
    let scaled = ((value as f64 + 1.0) / 2.0 * span).round() as i64 + min as i64;
    scaled.clamp(min as i64, max as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> (MessageDescriptor, KeyId, AbsId, AbsId, RelId) {
        let mut desc = MessageDescriptor::new();
        let a = desc.key.put("a");
        let x1 = desc.abs.put("x1");
        let lt = desc.abs.put_range("lt", 0, 255);
        let wheel = desc.rel.put("wheel");
        (desc, a, x1, lt, wheel)
    }

    #[test]
    fn test_float_conversion_endpoints() {
        assert_eq!(to_float(-32768, -32768, 32767), -1.0);
        assert_eq!(to_float(32767, -32768, 32767), 1.0);
        assert_eq!(to_float(0, -32768, 32767), 0.0);
        assert_eq!(from_float(-1.0, 0, 255), 0);
        assert_eq!(from_float(1.0, 0, 255), 255);
        assert_eq!(from_float(1.0, -32768, 32767), 32767);
        assert_eq!(from_float(0.0, -32768, 32767), 0);
    }

    #[test]
    fn test_message_uses_declared_range() {
        let (desc, _, x1, lt, _) = desc();
        let mut msg = ControllerMessage::new(&desc);
        assert_eq!(msg.abs_range(lt), (0, 255));
        msg.set_abs_float(lt, 1.0);
        assert_eq!(msg.abs(lt), 255);
        msg.set_abs_float(x1, -1.0);
        assert_eq!(msg.abs(x1), -32768);
    }

    #[test]
    fn test_assign_values_keeps_ranges_and_zeroes_extras() {
        let (desc, a, _, lt, _) = desc();
        let mut wide = desc.clone();
        let extra = wide.abs.put_range("extra", 0, 10);

        let mut raw = ControllerMessage::new(&desc);
        raw.set_key(a, true);
        raw.set_abs(lt, 200);

        let mut work = ControllerMessage::new(&wide);
        work.set_abs(extra, 7);
        work.assign_values(&raw);
        assert!(work.key(a));
        assert_eq!(work.abs(lt), 200);
        assert_eq!(work.abs(extra), 0);
        assert_eq!(work.abs_range(extra), (0, 10));
    }

    #[test]
    fn test_equality_compares_values() {
        let (desc, a, x1, _, wheel) = desc();
        let mut lhs = ControllerMessage::new(&desc);
        let mut rhs = ControllerMessage::new(&desc);
        assert_eq!(lhs, rhs);

        lhs.set_key(a, true);
        assert_ne!(lhs, rhs);
        rhs.set_key(a, true);
        assert_eq!(lhs, rhs);

        lhs.set_abs(x1, 100);
        assert_ne!(lhs, rhs);
        rhs.set_abs(x1, 100);
        lhs.set_rel(wheel, 1);
        assert_ne!(lhs, rhs);
    }

    #[test]
    fn test_unsized_ids_grow_storage() {
        let mut desc = MessageDescriptor::new();
        let msg_before = ControllerMessage::new(&desc);
        let late = desc.key.put("late");
        let mut msg = msg_before.clone();
        assert!(!msg.key(late));
        msg.set_key(late, true);
        assert!(msg.key(late));
        assert_ne!(msg, msg_before);
    }

    #[test]
    fn test_message_line() {
        let (desc, a, x1, _, wheel) = desc();
        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(a, true);
        msg.set_abs(x1, -5);
        assert_eq!(MessageLine::new(&msg, &desc).to_string(), "a:1 x1:-5 lt:0");
        msg.set_rel(wheel, 2);
        assert_eq!(MessageLine::new(&msg, &desc).to_string(), "a:1 x1:-5 lt:0 wheel:2");
    }
}
