//! UInput: collectors, emitters and the kernel contract

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};

use super::codes::{self, InputIdSpec};
use super::collector::{Collector, EmitterId};
use super::{DeviceId, DeviceKind, EventKind, OutputError};

pub const DEFAULT_DEVICE_NAME: &str = "Xbox Gamepad (userspace driver)";

/// Range of an absolute field as announced to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsRange {
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

impl AbsRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            min,
            max,
            fuzz: 0,
            flat: 0,
        }
    }
}

/// One field registered on a virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: EventKind,
    pub code: u16,
    /// Only set for absolute fields
    pub range: Option<AbsRange>,
}

impl FieldSpec {
    pub fn key(code: u16) -> Self {
        Self {
            kind: EventKind::Key,
            code,
            range: None,
        }
    }

    pub fn rel(code: u16) -> Self {
        Self {
            kind: EventKind::Rel,
            code,
            range: None,
        }
    }

    pub fn abs(code: u16, range: AbsRange) -> Self {
        Self {
            kind: EventKind::Abs,
            code,
            range: Some(range),
        }
    }
}

/// A force feedback request coming back from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceFeedbackEvent {
    /// Play (or stop, with zero magnitudes) a rumble
    Rumble { strong: u16, weak: u16 },
}

/// Names and ids of every virtual device
#[derive(Debug, Clone, Default)]
pub struct DeviceIdentities {
    base_names: BTreeMap<usize, String>,
    input_ids: BTreeMap<usize, InputIdSpec>,
}

impl DeviceIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the base name and id for a slot's devices
    pub fn set_slot(&mut self, slot: usize, name: Option<String>, input_id: Option<InputIdSpec>) {
        if let Some(name) = name {
            self.base_names.insert(slot, name);
        }
        if let Some(input_id) = input_id {
            self.input_ids.insert(slot, input_id);
        }
    }

    pub fn name(&self, device: DeviceId) -> String {
        let base = self
            .base_names
            .get(&device.slot)
            .map(String::as_str)
            .unwrap_or(DEFAULT_DEVICE_NAME);
        let mut name = match device.kind {
            DeviceKind::Joystick => base.to_string(),
            DeviceKind::Mouse => format!("{} - Mouse Emulation", base),
            DeviceKind::Keyboard => format!("{} - Keyboard Emulation", base),
        };
        if device.slot > 0 {
            name.push_str(&format!(" #{}", device.slot));
        }
        name
    }

    pub fn input_id(&self, device: DeviceId) -> InputIdSpec {
        let id = self.input_ids.get(&device.slot).copied().unwrap_or_default();
        match device.kind {
            DeviceKind::Joystick => id,
            // keep the emulation devices apart from the pad in udev rules
            DeviceKind::Mouse => InputIdSpec { product: id.product.wrapping_add(1), ..id },
            DeviceKind::Keyboard => InputIdSpec { product: id.product.wrapping_add(2), ..id },
        }
    }
}

/// The kernel side of the output: uinput or a recorder
pub trait VirtualInput: Send {
    /// Declare a field before the device is created
    fn register(&mut self, device: DeviceId, field: &FieldSpec) -> Result<(), OutputError>;

    /// Create every registered device
    fn finish(&mut self, identities: &DeviceIdentities) -> Result<(), OutputError>;

    /// Queue one event for a device
    fn emit(&mut self, device: DeviceId, kind: EventKind, code: u16, value: i32) -> Result<(), OutputError>;

    /// Flush queued events followed by a single SYN_REPORT
    fn commit(&mut self, device: DeviceId) -> Result<(), OutputError>;

    /// Drain pending force feedback requests
    fn poll_force_feedback(&mut self) -> Vec<(DeviceId, ForceFeedbackEvent)>;
}

#[derive(Debug, Clone, Copy)]
struct Emitter {
    collector: usize,
    value: i32,
}

/// Owner of all collectors and the kernel backend
pub struct UInput {
    backend: Box<dyn VirtualInput>,
    identities: DeviceIdentities,
    extra_devices: bool,
    collectors: Vec<Collector>,
    index: HashMap<(DeviceId, EventKind, u16), usize>,
    emitters: Vec<Emitter>,
    finished: bool,
}

impl UInput {
    pub fn new(backend: Box<dyn VirtualInput>, identities: DeviceIdentities, extra_devices: bool) -> Self {
        Self {
            backend,
            identities,
            extra_devices,
            collectors: Vec::new(),
            index: HashMap::new(),
            emitters: Vec::new(),
            finished: false,
        }
    }

    /// Pick the device for a field when the event didn't name one
    pub fn resolve_device(&self, slot: usize, explicit: Option<DeviceKind>, kind: EventKind, code: u16) -> DeviceId {
        if let Some(kind) = explicit {
            return DeviceId::new(slot, kind);
        }
        if !self.extra_devices {
            return DeviceId::joystick(slot);
        }
        let kind = match kind {
            EventKind::Rel => DeviceKind::Mouse,
            EventKind::Key if codes::is_mouse_button(code) => DeviceKind::Mouse,
            EventKind::Key if codes::is_keyboard_key(code) => DeviceKind::Keyboard,
            _ => DeviceKind::Joystick,
        };
        DeviceId::new(slot, kind)
    }

    /// Find or create the collector for `field` and attach a new emitter to it
    pub fn create_emitter(&mut self, device: DeviceId, field: FieldSpec) -> Result<EmitterId, OutputError> {
        let key = (device, field.kind, field.code);
        let collector = match self.index.get(&key) {
            Some(&collector) => collector,
            None => {
                if self.finished {
                    return Err(OutputError::AlreadyFinished(device));
                }
                self.backend.register(device, &field)?;
                self.collectors.push(Collector::new(device, field.kind, field.code));
                let collector = self.collectors.len() - 1;
                self.index.insert(key, collector);
                collector
            }
        };

        self.emitters.push(Emitter { collector, value: 0 });
        Ok(EmitterId(self.emitters.len() - 1))
    }

    /// Names and ids the devices get once finished
    pub fn identities_mut(&mut self) -> &mut DeviceIdentities {
        &mut self.identities
    }

    /// Create all devices; no fields can be added afterwards
    pub fn finish(&mut self) -> Result<(), OutputError> {
        if self.finished {
            return Ok(());
        }
        self.backend.finish(&self.identities)?;
        self.finished = true;
        debug!(collectors = self.collectors.len(), emitters = self.emitters.len(), "virtual devices created");
        Ok(())
    }

    pub fn send(&mut self, emitter: EmitterId, value: i32) {
        let Some(state) = self.emitters.get_mut(emitter.0) else {
            return;
        };
        let previous = state.value;
        state.value = value;
        if let Some(collector) = self.collectors.get_mut(state.collector) {
            collector.send(previous, value);
        }
    }

    /// Send every changed field, then one SYN_REPORT per touched device
    pub fn sync(&mut self) -> Result<(), OutputError> {
        let mut touched = BTreeSet::new();
        for collector in &mut self.collectors {
            if let Some(value) = collector.take_change() {
                trace!(device = %collector.device, kind = %collector.kind, code = collector.code, value, "emit");
                self.backend.emit(collector.device, collector.kind, collector.code, value)?;
                touched.insert(collector.device);
            }
        }
        for device in touched {
            self.backend.commit(device)?;
        }
        Ok(())
    }

    pub fn poll_force_feedback(&mut self) -> Vec<(DeviceId, ForceFeedbackEvent)> {
        self.backend.poll_force_feedback()
    }

    /// Devices that have at least one field
    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.collectors.iter().map(|c| c.device).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::memory::MemoryInput;

    fn uinput(extra_devices: bool) -> (UInput, crate::output::MemoryLog) {
        let (backend, log) = MemoryInput::new();
        (UInput::new(Box::new(backend), DeviceIdentities::new(), extra_devices), log)
    }

    #[test]
    fn test_device_names() {
        let mut ids = DeviceIdentities::new();
        assert_eq!(ids.name(DeviceId::joystick(0)), DEFAULT_DEVICE_NAME);
        assert_eq!(
            ids.name(DeviceId::new(1, DeviceKind::Mouse)),
            "Xbox Gamepad (userspace driver) - Mouse Emulation #1"
        );
        ids.set_slot(2, Some("Pad".into()), None);
        assert_eq!(ids.name(DeviceId::new(2, DeviceKind::Keyboard)), "Pad - Keyboard Emulation #2");
    }

    #[test]
    fn test_automatic_device_assignment() {
        let (with_extra, _) = uinput(true);
        let key_a = codes::key_code("KEY_A").unwrap();
        let btn_left = codes::key_code("BTN_LEFT").unwrap();
        let btn_a = codes::key_code("BTN_A").unwrap();
        assert_eq!(with_extra.resolve_device(0, None, EventKind::Key, key_a).kind, DeviceKind::Keyboard);
        assert_eq!(with_extra.resolve_device(0, None, EventKind::Key, btn_left).kind, DeviceKind::Mouse);
        assert_eq!(with_extra.resolve_device(0, None, EventKind::Rel, 0).kind, DeviceKind::Mouse);
        assert_eq!(with_extra.resolve_device(0, None, EventKind::Key, btn_a).kind, DeviceKind::Joystick);
        assert_eq!(
            with_extra.resolve_device(0, Some(DeviceKind::Joystick), EventKind::Key, key_a).kind,
            DeviceKind::Joystick
        );

        let (plain, _) = uinput(false);
        assert_eq!(plain.resolve_device(3, None, EventKind::Key, key_a), DeviceId::joystick(3));
    }

    #[test]
    fn test_fan_in_key_reference_count() {
        let (mut uinput, log) = uinput(false);
        let device = DeviceId::joystick(0);
        let first = uinput.create_emitter(device, FieldSpec::key(0x130)).unwrap();
        let second = uinput.create_emitter(device, FieldSpec::key(0x130)).unwrap();
        uinput.finish().unwrap();

        uinput.send(first, 1);
        uinput.send(second, 1);
        uinput.sync().unwrap();
        assert_eq!(log.take_values(), vec![(device, EventKind::Key, 0x130, 1)]);

        uinput.send(first, 0);
        uinput.sync().unwrap();
        assert!(log.take_values().is_empty());

        uinput.send(second, 0);
        uinput.sync().unwrap();
        assert_eq!(log.take_values(), vec![(device, EventKind::Key, 0x130, 0)]);
    }

    #[test]
    fn test_one_commit_per_touched_device() {
        let (mut uinput, log) = uinput(true);
        let pad = DeviceId::joystick(0);
        let mouse = DeviceId::new(0, DeviceKind::Mouse);
        let x = uinput
            .create_emitter(pad, FieldSpec::abs(0, AbsRange::new(-32768, 32767)))
            .unwrap();
        let y = uinput
            .create_emitter(pad, FieldSpec::abs(1, AbsRange::new(-32768, 32767)))
            .unwrap();
        let wheel = uinput.create_emitter(mouse, FieldSpec::rel(8)).unwrap();
        uinput.finish().unwrap();

        uinput.send(x, 10);
        uinput.send(y, 20);
        uinput.sync().unwrap();
        assert_eq!(log.commits(), vec![pad]);

        uinput.send(wheel, 1);
        uinput.sync().unwrap();
        assert_eq!(log.commits(), vec![pad, mouse]);
    }

    #[test]
    fn test_fields_are_fixed_after_finish() {
        let (mut uinput, _) = uinput(false);
        let device = DeviceId::joystick(0);
        uinput.create_emitter(device, FieldSpec::key(0x130)).unwrap();
        uinput.finish().unwrap();
        // existing field: still fine
        assert!(uinput.create_emitter(device, FieldSpec::key(0x130)).is_ok());
        assert!(matches!(
            uinput.create_emitter(device, FieldSpec::key(0x131)),
            Err(OutputError::AlreadyFinished(_))
        ));
    }
}
