//! Output wiring: which virtual-device events a message produces
//!
//! A `ui_buttonmap` entry binds a button name (optionally with button
//! filters, `a^toggle`) to a [`ButtonEvent`]; a `ui_axismap` entry binds an
//! axis name to an [`AxisEvent`]. [`OutputMap::build`] resolves the names,
//! creates one emitter per binding and afterwards turns messages into
//! [`EmitterWrite`] frames.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::actor::EmitterWrite;
use super::codes::{self, code_name};
use super::collector::EmitterId;
use super::uinput::{AbsRange, FieldSpec, UInput};
use super::{DeviceId, DeviceKind, EventKind, OutputError};
use crate::filter::{AxisFilter, ButtonFilter, FilterError};
use crate::message::{to_float, AbsId, ControllerMessage, KeyId, MessageDescriptor};

/// Default threshold of key events bound to an axis, as a fraction of full deflection
pub const DEFAULT_KEY_THRESHOLD: f32 = 0.25;

// ============================================================================
// Event names
// ============================================================================

/// An event code with an optional explicit device, `BTN_A@mouse`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTarget {
    pub device: Option<DeviceKind>,
    pub kind: EventKind,
    pub code: u16,
}

impl EventTarget {
    fn parse(s: &str, expected: Option<EventKind>) -> Result<Self, OutputError> {
        let (name, device) = match s.split_once('@') {
            Some((name, device)) => (name, Some(device.parse()?)),
            None => (s, None),
        };
        let (kind, code) = codes::parse_event_code(name.trim())?;
        if let Some(expected) = expected {
            if kind != expected {
                return Err(OutputError::InvalidEvent {
                    spec: s.to_string(),
                    reason: format!("expected a {} event", expected),
                });
            }
        }
        Ok(Self { device, kind, code })
    }

    fn resolve(&self, uinput: &UInput, slot: usize) -> DeviceId {
        uinput.resolve_device(slot, self.device, self.kind, self.code)
    }
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", code_name(self.kind, self.code))?;
        if let Some(device) = self.device {
            write!(f, "@{}", device)?;
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(spec: &str, value: &str) -> Result<T, OutputError> {
    value.trim().parse().map_err(|_| OutputError::InvalidEvent {
        spec: spec.to_string(),
        reason: format!("not a number: {}", value),
    })
}

fn too_many(spec: &str) -> OutputError {
    OutputError::InvalidEvent {
        spec: spec.to_string(),
        reason: "too many arguments".to_string(),
    }
}

// ============================================================================
// Button events
// ============================================================================

/// What a button does on the virtual device
#[derive(Debug, Clone, PartialEq)]
pub enum ButtonEvent {
    /// `KEY_x` / `BTN_x`: held while the button is held
    Key { target: EventTarget },
    /// `REL_x[:value[:repeat_ms]]`: a pulse on press, repeated while held
    /// (`repeat_ms` 0 sends a single pulse)
    Rel {
        target: EventTarget,
        value: i32,
        repeat_ms: u32,
    },
    /// `ABS_x:value`: the axis takes `value` while held
    Abs { target: EventTarget, value: i32 },
}

impl FromStr for ButtonEvent {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        let target = EventTarget::parse(name, None)?;

        match target.kind {
            EventKind::Key => {
                if !args.is_empty() {
                    return Err(too_many(s));
                }
                Ok(ButtonEvent::Key { target })
            }
            EventKind::Rel => {
                if args.len() > 2 {
                    return Err(too_many(s));
                }
                Ok(ButtonEvent::Rel {
                    target,
                    value: args.first().map(|v| parse_number(s, v)).transpose()?.unwrap_or(3),
                    repeat_ms: args.get(1).map(|v| parse_number(s, v)).transpose()?.unwrap_or(100),
                })
            }
            EventKind::Abs => match args.as_slice() {
                [value] => Ok(ButtonEvent::Abs {
                    target,
                    value: parse_number(s, value)?,
                }),
                [] => Err(OutputError::InvalidEvent {
                    spec: s.to_string(),
                    reason: "ABS button events need a value".to_string(),
                }),
                _ => Err(too_many(s)),
            },
        }
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonEvent::Key { target } => write!(f, "{}", target),
            ButtonEvent::Rel {
                target,
                value,
                repeat_ms,
            } => write!(f, "{}:{}:{}", target, value, repeat_ms),
            ButtonEvent::Abs { target, value } => write!(f, "{}:{}", target, value),
        }
    }
}

// ============================================================================
// Axis events
// ============================================================================

/// What an axis does on the virtual device
#[derive(Debug, Clone, PartialEq)]
pub enum AxisEvent {
    /// `ABS_x[:min:max[:fuzz:flat]]`, rescaled from the source axis' range.
    /// Without a range the source range is used.
    Abs {
        target: EventTarget,
        range: Option<AbsRange>,
    },
    /// `REL_x[:scale[:repeat_ms]]`: `scale` units per `repeat_ms` at full
    /// deflection, with the fractional remainder carried between ticks
    Rel {
        target: EventTarget,
        scale: f32,
        repeat_ms: u32,
    },
    /// `rel-repeat:REL_x:value:repeat_ms`: fixed `value` pulses whose rate
    /// follows the deflection
    RelRepeat {
        target: EventTarget,
        value: i32,
        repeat_ms: f32,
    },
    /// `KEY_neg:KEY_pos[:threshold]` or `KEY_pos[:threshold]`
    Key {
        neg: Option<EventTarget>,
        pos: EventTarget,
        threshold: f32,
    },
}

impl FromStr for AxisEvent {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();

        if parts[0].eq_ignore_ascii_case("rel-repeat") {
            return match &parts[1..] {
                [name, value, repeat] => Ok(AxisEvent::RelRepeat {
                    target: EventTarget::parse(name, Some(EventKind::Rel))?,
                    value: parse_number(s, value)?,
                    repeat_ms: parse_number(s, repeat)?,
                }),
                _ => Err(OutputError::InvalidEvent {
                    spec: s.to_string(),
                    reason: "rel-repeat needs REL_x:value:repeat".to_string(),
                }),
            };
        }

        let target = EventTarget::parse(parts[0], None)?;
        let args = &parts[1..];
        match target.kind {
            EventKind::Abs => {
                let range = match args {
                    [] => None,
                    [min, max] => Some(AbsRange::new(parse_number(s, min)?, parse_number(s, max)?)),
                    [min, max, fuzz, flat] => Some(AbsRange {
                        min: parse_number(s, min)?,
                        max: parse_number(s, max)?,
                        fuzz: parse_number(s, fuzz)?,
                        flat: parse_number(s, flat)?,
                    }),
                    _ => {
                        return Err(OutputError::InvalidEvent {
                            spec: s.to_string(),
                            reason: "expected ABS_x[:min:max[:fuzz:flat]]".to_string(),
                        })
                    }
                };
                if let Some(range) = range {
                    if range.min >= range.max {
                        return Err(OutputError::InvalidEvent {
                            spec: s.to_string(),
                            reason: "min must be below max".to_string(),
                        });
                    }
                }
                Ok(AxisEvent::Abs { target, range })
            }
            EventKind::Rel => {
                if args.len() > 2 {
                    return Err(too_many(s));
                }
                let repeat_ms: u32 = args.get(1).map(|v| parse_number(s, v)).transpose()?.unwrap_or(10);
                if repeat_ms == 0 {
                    return Err(OutputError::InvalidEvent {
                        spec: s.to_string(),
                        reason: "repeat must be positive".to_string(),
                    });
                }
                Ok(AxisEvent::Rel {
                    target,
                    scale: args.first().map(|v| parse_number(s, v)).transpose()?.unwrap_or(5.0),
                    repeat_ms,
                })
            }
            EventKind::Key => {
                let (neg, threshold) = match args {
                    [] => (None, None),
                    [arg] if codes::event_kind(arg).is_some() => (Some(target), None),
                    [arg] => (None, Some(*arg)),
                    [_, threshold] => (Some(target), Some(*threshold)),
                    _ => return Err(too_many(s)),
                };
                let pos = match neg {
                    Some(_) => EventTarget::parse(args[0], Some(EventKind::Key))?,
                    None => target,
                };
                let threshold = threshold
                    .map(|t| parse_number(s, t))
                    .transpose()?
                    .unwrap_or(DEFAULT_KEY_THRESHOLD);
                Ok(AxisEvent::Key { neg, pos, threshold })
            }
        }
    }
}

impl fmt::Display for AxisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisEvent::Abs { target, range: None } => write!(f, "{}", target),
            AxisEvent::Abs {
                target,
                range: Some(r),
            } => write!(f, "{}:{}:{}:{}:{}", target, r.min, r.max, r.fuzz, r.flat),
            AxisEvent::Rel {
                target,
                scale,
                repeat_ms,
            } => write!(f, "{}:{}:{}", target, scale, repeat_ms),
            AxisEvent::RelRepeat {
                target,
                value,
                repeat_ms,
            } => write!(f, "rel-repeat:{}:{}:{}", target, value, repeat_ms),
            AxisEvent::Key {
                neg: Some(neg),
                pos,
                threshold,
            } => write!(f, "{}:{}:{}", neg, pos, threshold),
            AxisEvent::Key {
                neg: None,
                pos,
                threshold,
            } => write!(f, "{}:{}", pos, threshold),
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Built-in output layouts that `ui_buttonmap`/`ui_axismap` entries extend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputProfile {
    /// Gamepad layout with the dpad on the hat axes
    #[default]
    Default,
    /// Same events and ranges as the kernel's xpad driver
    Xpad,
    /// Left stick moves the pointer, face buttons click
    Mouse,
    /// Nothing but the explicit entries
    None,
}

impl OutputProfile {
    /// `(source, event)` button entries
    pub fn buttons(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            OutputProfile::Default => &[
                ("start", "BTN_START"),
                ("guide", "BTN_MODE"),
                ("back", "BTN_SELECT"),
                ("a", "BTN_A"),
                ("b", "BTN_B"),
                ("x", "BTN_X"),
                ("y", "BTN_Y"),
                ("lb", "BTN_TL"),
                ("rb", "BTN_TR"),
                ("white", "BTN_TL"),
                ("black", "BTN_TR"),
                ("thumb_l", "BTN_THUMBL"),
                ("thumb_r", "BTN_THUMBR"),
                ("dpad_up", "ABS_HAT0Y:-1"),
                ("dpad_down", "ABS_HAT0Y:1"),
                ("dpad_left", "ABS_HAT0X:-1"),
                ("dpad_right", "ABS_HAT0X:1"),
            ],
            OutputProfile::Xpad => &[
                ("start", "BTN_START@joystick"),
                ("guide", "BTN_MODE@joystick"),
                ("back", "BTN_SELECT@joystick"),
                ("a", "BTN_A@joystick"),
                ("b", "BTN_B@joystick"),
                ("x", "BTN_X@joystick"),
                ("y", "BTN_Y@joystick"),
                ("lb", "BTN_TL@joystick"),
                ("rb", "BTN_TR@joystick"),
                ("thumb_l", "BTN_THUMBL@joystick"),
                ("thumb_r", "BTN_THUMBR@joystick"),
                ("dpad_up", "ABS_HAT0Y@joystick:-1"),
                ("dpad_down", "ABS_HAT0Y@joystick:1"),
                ("dpad_left", "ABS_HAT0X@joystick:-1"),
                ("dpad_right", "ABS_HAT0X@joystick:1"),
            ],
            OutputProfile::Mouse => &[
                ("a", "BTN_LEFT"),
                ("b", "BTN_RIGHT"),
                ("x", "BTN_MIDDLE"),
                ("y", "KEY_ENTER"),
                ("rb", "KEY_PAGEDOWN"),
                ("lb", "KEY_PAGEUP"),
                ("dpad_left", "KEY_LEFT"),
                ("dpad_right", "KEY_RIGHT"),
                ("dpad_up", "KEY_UP"),
                ("dpad_down", "KEY_DOWN"),
                ("start", "KEY_FORWARD"),
                ("back", "KEY_BACK"),
                ("guide", "KEY_ESC"),
            ],
            OutputProfile::None => &[],
        }
    }

    /// `(source, event)` axis entries
    pub fn axes(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            OutputProfile::Default => &[
                ("x1", "ABS_X:-32768:32767"),
                ("y1", "ABS_Y:-32768:32767"),
                ("x2", "ABS_RX:-32768:32767"),
                ("y2", "ABS_RY:-32768:32767"),
                ("lt", "ABS_BRAKE:0:255"),
                ("rt", "ABS_GAS:0:255"),
            ],
            OutputProfile::Xpad => &[
                ("x1", "ABS_X@joystick:-32768:32767:16:128"),
                ("y1", "ABS_Y@joystick:-32768:32767:16:128"),
                ("x2", "ABS_RX@joystick:-32768:32767:16:128"),
                ("y2", "ABS_RY@joystick:-32768:32767:16:128"),
                ("lt", "ABS_Z@joystick:0:255"),
                ("rt", "ABS_RZ@joystick:0:255"),
            ],
            OutputProfile::Mouse => &[
                ("x1^dead:4000", "REL_X:15:20"),
                ("y1^dead:4000", "REL_Y:15:20"),
                ("y2^invert^dead:6000", "REL_WHEEL:5:100"),
                ("x2^dead:6000", "REL_HWHEEL:5:100"),
            ],
            OutputProfile::None => &[],
        }
    }

    /// Device name the profile implies, if any
    pub fn device_name(&self) -> Option<&'static str> {
        match self {
            OutputProfile::Xpad => Some("Microsoft X-Box 360 pad"),
            _ => None,
        }
    }
}

impl FromStr for OutputProfile {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(OutputProfile::Default),
            "xpad" | "mimic-xpad" => Ok(OutputProfile::Xpad),
            "mouse" => Ok(OutputProfile::Mouse),
            "none" => Ok(OutputProfile::None),
            _ => Err(OutputError::InvalidEvent {
                spec: s.to_string(),
                reason: "unknown output profile (default, xpad, mouse, none)".to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputProfile::Default => write!(f, "default"),
            OutputProfile::Xpad => write!(f, "xpad"),
            OutputProfile::Mouse => write!(f, "mouse"),
            OutputProfile::None => write!(f, "none"),
        }
    }
}

// ============================================================================
// Runtime bindings
// ============================================================================

/// Split `name^filter^filter` into the name and parsed filters
fn parse_source<F: FromStr<Err = FilterError>>(lhs: &str) -> Result<(&str, Vec<F>), FilterError> {
    let mut parts = lhs.split('^');
    let name = parts.next().unwrap_or_default().trim();
    let filters = parts.map(|p| p.parse::<F>()).collect::<Result<Vec<F>, _>>()?;
    Ok((name, filters))
}

#[derive(Debug)]
enum ButtonAction {
    Key {
        emitter: EmitterId,
    },
    Rel {
        emitter: EmitterId,
        value: i32,
        repeat_ms: u32,
        held_ms: u32,
    },
    /// Contributes `value` to a shared absolute field while held
    Abs {
        group: usize,
        value: i32,
    },
}

#[derive(Debug)]
struct ButtonBinding {
    label: String,
    source: KeyId,
    filters: Vec<ButtonFilter>,
    action: ButtonAction,
    pressed: bool,
}

/// Absolute field driven by several buttons; its value is the sum of the held ones
#[derive(Debug)]
struct AbsGroup {
    emitter: EmitterId,
    sent: i32,
}

#[derive(Debug)]
enum AxisAction {
    Abs {
        emitter: EmitterId,
        range: AbsRange,
        sent: Option<i32>,
    },
    Rel {
        emitter: EmitterId,
        scale: f32,
        repeat_ms: u32,
        remainder: f32,
    },
    RelRepeat {
        emitter: EmitterId,
        value: i32,
        repeat_ms: f32,
        timer: f32,
    },
    Key {
        neg: Option<EmitterId>,
        pos: EmitterId,
        threshold: f32,
        zone: i8,
    },
}

#[derive(Debug)]
struct AxisBinding {
    label: String,
    source: AbsId,
    filters: Vec<AxisFilter>,
    action: AxisAction,
    /// Last filtered deflection in `[-1, 1]`
    position: f32,
}

/// Entries of one config's output wiring, profile entries first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputEntries {
    pub buttons: Vec<(String, ButtonEvent)>,
    pub axes: Vec<(String, AxisEvent)>,
}

impl OutputEntries {
    /// Profile entries, replaced or extended by the explicit maps
    pub fn resolve(
        profile: OutputProfile,
        ui_buttonmap: &BTreeMap<String, String>,
        ui_axismap: &BTreeMap<String, String>,
    ) -> Result<Self, OutputError> {
        fn merge<E: FromStr<Err = OutputError>>(
            profile: &[(&str, &str)],
            explicit: &BTreeMap<String, String>,
        ) -> Result<Vec<(String, E)>, OutputError> {
            let mut entries: Vec<(String, E)> = Vec::new();
            let profile = profile.iter().map(|(l, r)| (l.to_string(), *r));
            let explicit = explicit.iter().map(|(l, r)| (l.clone(), r.as_str()));
            for (lhs, rhs) in profile.chain(explicit) {
                let event: E = rhs.parse()?;
                // an explicit entry replaces the profile entry for the same source
                let source = lhs.split('^').next().unwrap_or_default().to_ascii_lowercase();
                entries.retain(|(l, _)| l.split('^').next().unwrap_or_default().to_ascii_lowercase() != source);
                entries.push((lhs, event));
            }
            Ok(entries)
        }

        Ok(Self {
            buttons: merge(profile.buttons(), ui_buttonmap)?,
            axes: merge(profile.axes(), ui_axismap)?,
        })
    }
}

/// Runtime output wiring of one config
#[derive(Debug, Default)]
pub struct OutputMap {
    buttons: Vec<ButtonBinding>,
    axes: Vec<AxisBinding>,
    groups: Vec<AbsGroup>,
}

impl OutputMap {
    /// Resolve `entries` against `desc` and create the emitters on `uinput`
    ///
    /// Must run before [`UInput::finish`] for any field that is new.
    pub fn build(
        entries: &OutputEntries,
        slot: usize,
        desc: &MessageDescriptor,
        uinput: &mut UInput,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut map = OutputMap::default();

        // buttons bound to the same absolute field share one emitter
        let mut group_index: HashMap<DeviceId, HashMap<u16, usize>> = HashMap::new();
        let mut group_ranges: Vec<(DeviceId, u16, AbsRange)> = Vec::new();
        for (_, event) in &entries.buttons {
            if let ButtonEvent::Abs { target, value } = event {
                let device = target.resolve(uinput, slot);
                let codes = group_index.entry(device).or_default();
                let index = *codes.entry(target.code).or_insert_with(|| {
                    group_ranges.push((device, target.code, AbsRange::new(0, 0)));
                    group_ranges.len() - 1
                });
                let range = &mut group_ranges[index].2;
                range.min = range.min.min(*value).min(-value.abs());
                range.max = range.max.max(*value).max(value.abs());
            }
        }
        for (device, code, range) in &group_ranges {
            let emitter = uinput.create_emitter(*device, FieldSpec::abs(*code, *range))?;
            map.groups.push(AbsGroup { emitter, sent: 0 });
        }

        for (lhs, event) in &entries.buttons {
            let (name, filters) =
                parse_source::<ButtonFilter>(lhs).with_context(|| format!("ui_buttonmap entry '{}'", lhs))?;
            let source = desc
                .key
                .get(name)
                .with_context(|| format!("ui_buttonmap entry '{}'", lhs))?;

            let action = match event {
                ButtonEvent::Key { target } => ButtonAction::Key {
                    emitter: uinput.create_emitter(target.resolve(uinput, slot), FieldSpec::key(target.code))?,
                },
                ButtonEvent::Rel {
                    target,
                    value,
                    repeat_ms,
                } => ButtonAction::Rel {
                    emitter: uinput.create_emitter(target.resolve(uinput, slot), FieldSpec::rel(target.code))?,
                    value: *value,
                    repeat_ms: *repeat_ms,
                    held_ms: 0,
                },
                ButtonEvent::Abs { target, value } => {
                    let device = target.resolve(uinput, slot);
                    let group = group_index
                        .get(&device)
                        .and_then(|codes| codes.get(&target.code))
                        .copied()
                        .context("absolute button group missing")?;
                    ButtonAction::Abs { group, value: *value }
                }
            };

            map.buttons.push(ButtonBinding {
                label: format!("{}={}", lhs, event),
                source,
                filters,
                action,
                pressed: false,
            });
        }

        for (lhs, event) in &entries.axes {
            let (name, filters) =
                parse_source::<AxisFilter>(lhs).with_context(|| format!("ui_axismap entry '{}'", lhs))?;
            let source = desc.abs.get(name).with_context(|| format!("ui_axismap entry '{}'", lhs))?;

            let action = match event {
                AxisEvent::Abs { target, range } => {
                    let range = range.unwrap_or_else(|| {
                        let (min, max) = desc.abs.range(source);
                        AbsRange::new(min, max)
                    });
                    AxisAction::Abs {
                        emitter: uinput.create_emitter(target.resolve(uinput, slot), FieldSpec::abs(target.code, range))?,
                        range,
                        sent: None,
                    }
                }
                AxisEvent::Rel {
                    target,
                    scale,
                    repeat_ms,
                } => AxisAction::Rel {
                    emitter: uinput.create_emitter(target.resolve(uinput, slot), FieldSpec::rel(target.code))?,
                    scale: *scale,
                    repeat_ms: *repeat_ms,
                    remainder: 0.0,
                },
                AxisEvent::RelRepeat {
                    target,
                    value,
                    repeat_ms,
                } => AxisAction::RelRepeat {
                    emitter: uinput.create_emitter(target.resolve(uinput, slot), FieldSpec::rel(target.code))?,
                    value: *value,
                    repeat_ms: *repeat_ms,
                    timer: 0.0,
                },
                AxisEvent::Key { neg, pos, threshold } => {
                    let neg = match neg {
                        Some(t) => {
                            let device = t.resolve(uinput, slot);
                            Some(uinput.create_emitter(device, FieldSpec::key(t.code))?)
                        }
                        None => None,
                    };
                    let device = pos.resolve(uinput, slot);
                    AxisAction::Key {
                        neg,
                        pos: uinput.create_emitter(device, FieldSpec::key(pos.code))?,
                        threshold: *threshold,
                        zone: 0,
                    }
                }
            };

            map.axes.push(AxisBinding {
                label: format!("{}={}", lhs, event),
                source,
                filters,
                action,
                position: 0.0,
            });
        }

        debug!(slot, buttons = map.buttons.len(), axes = map.axes.len(), "output map built");
        Ok(map)
    }

    /// Writes for the state in `msg`; only changed fields produce writes
    pub fn send(&mut self, msg: &ControllerMessage) -> Vec<EmitterWrite> {
        let mut writes = Vec::new();

        let mut group_sums = vec![0i32; self.groups.len()];
        for binding in &mut self.buttons {
            let mut pressed = msg.key(binding.source);
            for filter in &mut binding.filters {
                pressed = filter.filter(pressed);
            }

            let changed = pressed != binding.pressed;
            binding.pressed = pressed;
            match &mut binding.action {
                ButtonAction::Key { emitter } => {
                    if changed {
                        writes.push(EmitterWrite::new(*emitter, i32::from(pressed)));
                    }
                }
                ButtonAction::Rel {
                    emitter,
                    value,
                    held_ms,
                    ..
                } => {
                    if changed && pressed {
                        *held_ms = 0;
                        writes.push(EmitterWrite::new(*emitter, *value));
                    }
                }
                ButtonAction::Abs { group, value } => {
                    if pressed {
                        group_sums[*group] += *value;
                    }
                }
            }
        }
        for (group, sum) in self.groups.iter_mut().zip(group_sums) {
            if group.sent != sum {
                group.sent = sum;
                writes.push(EmitterWrite::new(group.emitter, sum));
            }
        }

        for binding in &mut self.axes {
            let (min, max) = msg.abs_range(binding.source);
            let mut value = msg.abs(binding.source);
            for filter in &mut binding.filters {
                value = filter.filter(value, min, max);
            }
            binding.position = to_float(value, min, max);

            match &mut binding.action {
                AxisAction::Abs { emitter, range, sent } => {
                    let out = if (range.min, range.max) == (min, max) {
                        value
                    } else {
                        crate::message::from_float(binding.position, range.min, range.max)
                    };
                    if *sent != Some(out) {
                        *sent = Some(out);
                        writes.push(EmitterWrite::new(*emitter, out));
                    }
                }
                AxisAction::RelRepeat { timer, .. } => {
                    if value == 0 {
                        *timer = 0.0;
                    }
                }
                AxisAction::Rel { .. } => {}
                AxisAction::Key {
                    neg,
                    pos,
                    threshold,
                    zone,
                } => {
                    let new_zone = if binding.position >= *threshold {
                        1
                    } else if binding.position <= -*threshold {
                        -1
                    } else {
                        0
                    };
                    if new_zone != *zone {
                        match (*zone, *neg) {
                            (1, _) => writes.push(EmitterWrite::new(*pos, 0)),
                            (-1, Some(neg)) => writes.push(EmitterWrite::new(neg, 0)),
                            _ => {}
                        }
                        match (new_zone, *neg) {
                            (1, _) => writes.push(EmitterWrite::new(*pos, 1)),
                            (-1, Some(neg)) => writes.push(EmitterWrite::new(neg, 1)),
                            _ => {}
                        }
                        *zone = new_zone;
                    }
                }
            }
        }

        writes
    }

    /// Advance time-driven outputs (relative motion, repeats) by `dt_ms`
    pub fn update(&mut self, dt_ms: u32) -> Vec<EmitterWrite> {
        let mut writes = Vec::new();

        for binding in &mut self.buttons {
            binding.filters.iter_mut().for_each(|f| f.update(dt_ms));
            if let ButtonAction::Rel {
                emitter,
                value,
                repeat_ms,
                held_ms,
            } = &mut binding.action
            {
                if binding.pressed && *repeat_ms > 0 {
                    *held_ms += dt_ms;
                    let mut total = 0;
                    while *held_ms >= *repeat_ms {
                        total += *value;
                        *held_ms -= *repeat_ms;
                    }
                    if total != 0 {
                        writes.push(EmitterWrite::new(*emitter, total));
                    }
                }
            }
        }

        for binding in &mut self.axes {
            binding.filters.iter_mut().for_each(|f| f.update(dt_ms));
            match &mut binding.action {
                AxisAction::Rel {
                    emitter,
                    scale,
                    repeat_ms,
                    remainder,
                } => {
                    if binding.position == 0.0 {
                        *remainder = 0.0;
                        continue;
                    }
                    let motion = binding.position * *scale * dt_ms as f32 / *repeat_ms as f32 + *remainder;
                    let whole = motion.trunc();
                    *remainder = motion - whole;
                    if whole != 0.0 {
                        writes.push(EmitterWrite::new(*emitter, whole as i32));
                    }
                }
                AxisAction::RelRepeat {
                    emitter,
                    value,
                    repeat_ms,
                    timer,
                } => {
                    if *repeat_ms <= 0.0 {
                        continue;
                    }
                    *timer += dt_ms as f32 * binding.position.abs();
                    let mut total = 0;
                    while *timer > *repeat_ms {
                        total += if binding.position < 0.0 { -*value } else { *value };
                        *timer -= *repeat_ms;
                    }
                    if total != 0 {
                        writes.push(EmitterWrite::new(*emitter, total));
                    }
                }
                AxisAction::Abs { .. } | AxisAction::Key { .. } => {}
            }
        }

        writes
    }

    /// Writes that release every key and zero every axis this map drives
    pub fn reset(&mut self) -> Vec<EmitterWrite> {
        let mut writes = Vec::new();

        for binding in &mut self.buttons {
            if let ButtonAction::Key { emitter } = binding.action {
                if binding.pressed {
                    writes.push(EmitterWrite::new(emitter, 0));
                }
            }
            if let ButtonAction::Rel { held_ms, .. } = &mut binding.action {
                *held_ms = 0;
            }
            binding.pressed = false;
        }
        for group in &mut self.groups {
            if group.sent != 0 {
                group.sent = 0;
                writes.push(EmitterWrite::new(group.emitter, 0));
            }
        }

        for binding in &mut self.axes {
            binding.position = 0.0;
            match &mut binding.action {
                AxisAction::Abs { emitter, sent, .. } => {
                    if sent.is_some_and(|v| v != 0) {
                        writes.push(EmitterWrite::new(*emitter, 0));
                    }
                    *sent = None;
                }
                AxisAction::Rel { remainder, .. } => *remainder = 0.0,
                AxisAction::RelRepeat { timer, .. } => *timer = 0.0,
                AxisAction::Key { neg, pos, zone, .. } => {
                    match (*zone, *neg) {
                        (1, _) => writes.push(EmitterWrite::new(*pos, 0)),
                        (-1, Some(neg)) => writes.push(EmitterWrite::new(neg, 0)),
                        _ => {}
                    }
                    *zone = 0;
                }
            }
        }

        writes
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && self.axes.is_empty()
    }

    /// One `source=event` line per binding
    pub fn describe(&self) -> Vec<String> {
        self.buttons
            .iter()
            .map(|b| b.label.clone())
            .chain(self.axes.iter().map(|a| a.label.clone()))
            .collect()
    }
}
