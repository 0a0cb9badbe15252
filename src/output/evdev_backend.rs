//! Virtual input backed by the kernel's uinput, through the `evdev` crate

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::os::fd::AsRawFd;

use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventSummary, EventType, FFEffectCode, FFEffectData,
    FFEffectKind, InputEvent, InputId, KeyCode, RelativeAxisCode, UInputCode, UinputAbsSetup,
};
use tracing::{debug, info, warn};

use super::uinput::{DeviceIdentities, FieldSpec, ForceFeedbackEvent, VirtualInput};
use super::{DeviceId, DeviceKind, EventKind, OutputError};

const MAX_FF_EFFECTS: u32 = 16;

#[derive(Default)]
struct PendingDevice {
    keys: AttributeSet<KeyCode>,
    rels: AttributeSet<RelativeAxisCode>,
    abs: Vec<UinputAbsSetup>,
}

struct LiveDevice {
    device: VirtualDevice,
    queue: Vec<InputEvent>,
    effects: HashMap<i16, FFEffectData>,
    gain: u16,
}

/// uinput devices created through `/dev/uinput`
pub struct EvdevInput {
    pending: BTreeMap<DeviceId, PendingDevice>,
    live: BTreeMap<DeviceId, LiveDevice>,
    force_feedback: bool,
}

impl EvdevInput {
    /// `force_feedback` enables rumble support on joystick devices
    pub fn new(force_feedback: bool) -> Self {
        Self {
            pending: BTreeMap::new(),
            live: BTreeMap::new(),
            force_feedback,
        }
    }

    fn build(&self, device: DeviceId, pending: &PendingDevice, identities: &DeviceIdentities) -> io::Result<VirtualDevice> {
        let id = identities.input_id(device);
        let name = identities.name(device);

        let mut builder = VirtualDevice::builder()?
            .name(&name)
            .input_id(InputId::new(BusType(id.bustype), id.vendor, id.product, id.version));

        if pending.keys.iter().next().is_some() {
            builder = builder.with_keys(&pending.keys)?;
        }
        if pending.rels.iter().next().is_some() {
            builder = builder.with_relative_axes(&pending.rels)?;
        }
        for setup in &pending.abs {
            builder = builder.with_absolute_axis(setup)?;
        }
        if self.force_feedback && device.kind == DeviceKind::Joystick {
            let mut ff = AttributeSet::new();
            ff.insert(FFEffectCode::FF_RUMBLE);
            ff.insert(FFEffectCode::FF_PERIODIC);
            ff.insert(FFEffectCode::FF_SQUARE);
            ff.insert(FFEffectCode::FF_TRIANGLE);
            ff.insert(FFEffectCode::FF_SINE);
            ff.insert(FFEffectCode::FF_GAIN);
            builder = builder.with_ff(&ff)?.with_ff_effects_max(MAX_FF_EFFECTS);
        }

        let device = builder.build()?;
        set_nonblocking(&device)?;
        info!(
            name = %name,
            vendor = %format!("{:04x}", id.vendor),
            product = %format!("{:04x}", id.product),
            "created uinput device"
        );
        Ok(device)
    }
}

fn set_nonblocking(device: &VirtualDevice) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: fd is owned by `device` and stays open for this call
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn event_type(kind: EventKind) -> EventType {
    match kind {
        EventKind::Key => EventType::KEY,
        EventKind::Rel => EventType::RELATIVE,
        EventKind::Abs => EventType::ABSOLUTE,
    }
}

fn scale(magnitude: u16, gain: u16) -> u16 {
    (magnitude as u32 * gain as u32 / 0xffff) as u16
}

impl VirtualInput for EvdevInput {
    fn register(&mut self, device: DeviceId, field: &FieldSpec) -> Result<(), OutputError> {
        if self.live.contains_key(&device) {
            return Err(OutputError::AlreadyFinished(device));
        }
        let pending = self.pending.entry(device).or_default();
        match field.kind {
            EventKind::Key => pending.keys.insert(KeyCode(field.code)),
            EventKind::Rel => pending.rels.insert(RelativeAxisCode(field.code)),
            EventKind::Abs => {
                let range = field.range.unwrap_or(super::AbsRange::new(-32768, 32767));
                let info = AbsInfo::new(0, range.min, range.max, range.fuzz, range.flat, 0);
                pending.abs.push(UinputAbsSetup::new(AbsoluteAxisCode(field.code), info));
            }
        }
        Ok(())
    }

    fn finish(&mut self, identities: &DeviceIdentities) -> Result<(), OutputError> {
        let pending = std::mem::take(&mut self.pending);
        for (device, fields) in pending {
            let vd = self.build(device, &fields, identities)?;
            self.live.insert(
                device,
                LiveDevice {
                    device: vd,
                    queue: Vec::new(),
                    effects: HashMap::new(),
                    gain: 0xffff,
                },
            );
        }
        Ok(())
    }

    fn emit(&mut self, device: DeviceId, kind: EventKind, code: u16, value: i32) -> Result<(), OutputError> {
        let live = self.live.get_mut(&device).ok_or(OutputError::NotCreated(device))?;
        live.queue.push(InputEvent::new(event_type(kind).0, code, value));
        Ok(())
    }

    fn commit(&mut self, device: DeviceId) -> Result<(), OutputError> {
        let live = self.live.get_mut(&device).ok_or(OutputError::NotCreated(device))?;
        if !live.queue.is_empty() {
            // emit() appends the SYN_REPORT
            live.device.emit(&live.queue)?;
            live.queue.clear();
        }
        Ok(())
    }

    fn poll_force_feedback(&mut self) -> Vec<(DeviceId, ForceFeedbackEvent)> {
        let mut out = Vec::new();
        for (device, live) in self.live.iter_mut() {
            if device.kind != DeviceKind::Joystick || !self.force_feedback {
                continue;
            }

            let events: Vec<InputEvent> = match live.device.fetch_events() {
                Ok(events) => events.collect(),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => {
                    warn!(device = %device, error = %err, "failed to read force feedback events");
                    continue;
                }
            };

            for event in events {
                match event.destructure() {
                    EventSummary::UInput(ev, UInputCode::UI_FF_UPLOAD, ..) => {
                        match live.device.process_ff_upload(ev) {
                            Ok(mut upload) => {
                                let id = upload.effect_id();
                                debug!(device = %device, id, "ff upload");
                                live.effects.insert(id, upload.effect());
                                upload.set_retval(0);
                            }
                            Err(err) => warn!(device = %device, error = %err, "ff upload failed"),
                        }
                    }
                    EventSummary::UInput(ev, UInputCode::UI_FF_ERASE, ..) => match live.device.process_ff_erase(ev) {
                        Ok(erase) => {
                            live.effects.remove(&(erase.effect_id() as i16));
                        }
                        Err(err) => warn!(device = %device, error = %err, "ff erase failed"),
                    },
                    EventSummary::ForceFeedback(_, FFEffectCode::FF_GAIN, value) => {
                        live.gain = value.clamp(0, 0xffff) as u16;
                    }
                    EventSummary::ForceFeedback(_, code, value) => {
                        let id = code.0 as i16;
                        let rumble = match live.effects.get(&id).map(|e| &e.kind) {
                            Some(FFEffectKind::Rumble {
                                strong_magnitude,
                                weak_magnitude,
                            }) if value > 0 => ForceFeedbackEvent::Rumble {
                                strong: scale(*strong_magnitude, live.gain),
                                weak: scale(*weak_magnitude, live.gain),
                            },
                            Some(FFEffectKind::Periodic { magnitude, .. }) if value > 0 => {
                                let magnitude = scale(magnitude.unsigned_abs(), live.gain);
                                ForceFeedbackEvent::Rumble {
                                    strong: magnitude,
                                    weak: magnitude,
                                }
                            }
                            _ => ForceFeedbackEvent::Rumble { strong: 0, weak: 0 },
                        };
                        out.push((*device, rumble));
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scaling() {
        assert_eq!(scale(0xffff, 0xffff), 0xffff);
        assert_eq!(scale(0xffff, 0x8000), 0x8000);
        assert_eq!(scale(1000, 0), 0);
    }

    #[test]
    fn test_register_before_finish() {
        let mut input = EvdevInput::new(false);
        let device = DeviceId::joystick(0);
        input.register(device, &FieldSpec::key(0x130)).unwrap();
        input
            .register(device, &FieldSpec::abs(0, super::super::AbsRange::new(-32768, 32767)))
            .unwrap();
        assert_eq!(input.pending.get(&device).map(|p| p.abs.len()), Some(1));
        // no device exists yet, so emitting is an error
        assert!(matches!(
            input.emit(device, EventKind::Key, 0x130, 1),
            Err(OutputError::NotCreated(_))
        ));
    }
}
