//! Per-field event collectors
//!
//! Every virtual-device field has exactly one collector. Emitters write into
//! it; the collector decides what the field's aggregate value is and whether
//! the next sync has to send anything.

use tracing::warn;

use super::{DeviceId, EventKind};

/// Handle of one emitter, returned by [`super::UInput::create_emitter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub(crate) usize);

#[derive(Debug, Clone)]
enum Combine {
    /// Press reference count; each emitter holds at most one reference
    Key { count: u32, sent: bool },
    /// Sum of all deltas since the last sync
    Rel { sum: i64 },
    /// Most recent write wins
    Abs { value: i32, sent: i32 },
}

#[derive(Debug, Clone)]
pub struct Collector {
    pub device: DeviceId,
    pub kind: EventKind,
    pub code: u16,
    combine: Combine,
    dirty: bool,
}

impl Collector {
    pub fn new(device: DeviceId, kind: EventKind, code: u16) -> Self {
        let combine = match kind {
            EventKind::Key => Combine::Key { count: 0, sent: false },
            EventKind::Rel => Combine::Rel { sum: 0 },
            EventKind::Abs => Combine::Abs { value: 0, sent: 0 },
        };
        Self {
            device,
            kind,
            code,
            combine,
            dirty: false,
        }
    }

    /// Apply one emitter write.
    ///
    /// `previous` is the value this emitter wrote last time, which lets key
    /// fields keep one reference per emitter.
    pub fn send(&mut self, previous: i32, value: i32) {
        match &mut self.combine {
            Combine::Key { count, .. } => {
                let was = previous != 0;
                let now = value != 0;
                match (was, now) {
                    (false, true) => {
                        *count += 1;
                        self.dirty = true;
                    }
                    (true, false) => {
                        if *count == 0 {
                            warn!(device = %self.device, code = self.code, "key released more often than pressed");
                        } else {
                            *count -= 1;
                        }
                        self.dirty = true;
                    }
                    (true, true) => {
                        warn!(device = %self.device, code = self.code, "key pressed twice by one emitter");
                    }
                    (false, false) => {}
                }
            }
            Combine::Rel { sum } => {
                if value != 0 {
                    *sum += value as i64;
                    self.dirty = true;
                }
            }
            Combine::Abs { value: current, .. } => {
                *current = value;
                self.dirty = true;
            }
        }
    }

    /// Value to send on this sync, if the aggregate changed
    pub fn take_change(&mut self) -> Option<i32> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;

        match &mut self.combine {
            Combine::Key { count, sent } => {
                let pressed = *count > 0;
                if pressed == *sent {
                    None
                } else {
                    *sent = pressed;
                    Some(i32::from(pressed))
                }
            }
            Combine::Rel { sum } => {
                let value = (*sum).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                *sum = 0;
                (value != 0).then_some(value)
            }
            Combine::Abs { value, sent } => {
                if *value == *sent {
                    None
                } else {
                    *sent = *value;
                    Some(*value)
                }
            }
        }
    }

    /// Whether the field currently holds a non-neutral value
    pub fn is_active(&self) -> bool {
        match &self.combine {
            Combine::Key { count, .. } => *count > 0,
            Combine::Rel { sum } => *sum != 0,
            Combine::Abs { value, .. } => *value != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Collector {
        Collector::new(DeviceId::joystick(0), EventKind::Key, 0x130)
    }

    #[test]
    fn test_key_reference_count() {
        let mut c = key();
        // emitter 1 presses
        c.send(0, 1);
        assert_eq!(c.take_change(), Some(1));
        // emitter 2 presses, no change on the wire
        c.send(0, 1);
        assert_eq!(c.take_change(), None);
        // emitter 1 releases, still held by emitter 2
        c.send(1, 0);
        assert_eq!(c.take_change(), None);
        assert!(c.is_active());
        // emitter 2 releases
        c.send(1, 0);
        assert_eq!(c.take_change(), Some(0));
        assert!(!c.is_active());
    }

    #[test]
    fn test_key_over_release_stays_released() {
        let mut c = key();
        c.send(1, 0);
        assert_eq!(c.take_change(), None);
        c.send(0, 1);
        assert_eq!(c.take_change(), Some(1));
    }

    #[test]
    fn test_rel_sums_since_last_sync() {
        let mut c = Collector::new(DeviceId::joystick(0), EventKind::Rel, 0);
        c.send(0, 3);
        c.send(0, -1);
        assert_eq!(c.take_change(), Some(2));
        assert_eq!(c.take_change(), None);
        c.send(0, 2);
        c.send(0, -2);
        assert_eq!(c.take_change(), None);
    }

    #[test]
    fn test_abs_last_write_wins() {
        let mut c = Collector::new(DeviceId::joystick(0), EventKind::Abs, 0);
        c.send(0, 100);
        c.send(100, -50);
        assert_eq!(c.take_change(), Some(-50));
        c.send(-50, -50);
        assert_eq!(c.take_change(), None);
    }
}
