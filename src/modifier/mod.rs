//! Message-level transforms
//!
//! A modifier rewrites the whole [`ControllerMessage`] once per tick. The
//! free-form modifier list of a config is written as `NAME:ARG:ARG...`,
//! parsed into a [`ModifierSpec`] and compiled against the slot's
//! descriptor into a boxed [`Modifier`].

pub mod dpad;
pub mod mapping;
pub mod misc;
pub mod stick;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::filter::{ButtonFilter, FilterError};
use crate::message::{AbsId, ControllerMessage, DescriptorError, KeyId, MessageDescriptor};

pub use dpad::{Dpad, DpadRestrictorModifier, DpadRotationModifier, RestrictMode};
pub use mapping::{
    parse_mapping_list, AxisMapping, AxisMappingSpec, AxismapModifier, ButtonMapping, ButtonMappingSpec,
    ButtonmapModifier, Mapping, MappingSpec,
};
pub use misc::{Acc2AxisModifier, Btn2AxisModifier, Ir2AxisModifier, KeyCopyModifier, LatencyModifier, LogModifier};
pub use stick::{
    FourWayModifier, JoinAxisModifier, RelativeAxisModifier, RotateAxisModifier, Sector2ButtonModifier,
    SplitAxisModifier, SquareAxisModifier, StickAxes, StickZoneModifier,
};

/// A stateful transform applied to the whole message each tick
pub trait Modifier: Send {
    fn update(&mut self, dt_ms: u32, msg: &mut ControllerMessage, desc: &MessageDescriptor);

    /// Human-readable form, e.g. `dpad-rotation:90`
    fn describe(&self, desc: &MessageDescriptor) -> String;
}

#[derive(Debug, Error, PartialEq)]
pub enum ModifierError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("unknown modifier '{0}'")]
    Unknown(String),

    #[error("{modifier}: expected {expected} arguments, got {got}")]
    Arity {
        modifier: String,
        expected: &'static str,
        got: usize,
    },

    #[error("{modifier}: invalid argument '{value}'")]
    InvalidArgument { modifier: String, value: String },

    #[error("couldn't convert '{0}' to a mapping")]
    InvalidMapping(String),
}

/// Names of a stick modifier: `X:Y` or `X_IN:Y_IN:X_OUT:Y_OUT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickNames {
    pub x_in: String,
    pub y_in: String,
    pub x_out: String,
    pub y_out: String,
}

impl StickNames {
    fn from_args(modifier: &str, args: &[&str]) -> Result<Self, ModifierError> {
        match args {
            [x, y] => Ok(Self {
                x_in: x.to_string(),
                y_in: y.to_string(),
                x_out: x.to_string(),
                y_out: y.to_string(),
            }),
            [x_in, y_in, x_out, y_out] => Ok(Self {
                x_in: x_in.to_string(),
                y_in: y_in.to_string(),
                x_out: x_out.to_string(),
                y_out: y_out.to_string(),
            }),
            _ => Err(arity(modifier, "2 or 4", args.len())),
        }
    }

    fn resolve(&self, desc: &MessageDescriptor) -> Result<StickAxes, ModifierError> {
        Ok(StickAxes {
            x_in: desc.abs.get(&self.x_in)?,
            y_in: desc.abs.get(&self.y_in)?,
            x_out: desc.abs.get(&self.x_out)?,
            y_out: desc.abs.get(&self.y_out)?,
        })
    }
}

impl fmt::Display for StickNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.x_in, self.y_in, self.x_out, self.y_out)
    }
}

/// A parsed, validated modifier whose names are not yet resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ModifierSpec {
    Axismap(Vec<AxisMappingSpec>),
    Buttonmap(Vec<ButtonMappingSpec>),
    DpadRotation { degrees: i32 },
    DpadRestrictor(RestrictMode),
    FourWay(StickNames),
    Square(StickNames),
    Rotate { x: String, y: String, degrees: f32, mirror: bool },
    SplitAxis { axis: String, out_lhs: String, out_rhs: String },
    JoinAxis { lhs: String, rhs: String, out: String },
    Sector2Button { x: String, y: String, buttons: Vec<String> },
    StickZone { x: String, y: String, button: String, start: f32, end: f32 },
    Acc2Axis { acc: [String; 3], out_x: String, out_y: String },
    Ir2Axis { x: String, y: String, size: String, out_x: String, out_y: String },
    Btn2Axis { lhs: String, rhs: String, axis: String },
    KeyCopy { from: String, to: String },
    Latency { msec: u32 },
    RelativeAxis { axis: String, speed: i32 },
    Autofire { button: String, rate: u32, delay: u32 },
    Log { prefix: String },
}

fn arity(modifier: &str, expected: &'static str, got: usize) -> ModifierError {
    ModifierError::Arity {
        modifier: modifier.to_string(),
        expected,
        got,
    }
}

fn parse_value<T: FromStr>(modifier: &str, value: &str) -> Result<T, ModifierError> {
    value.trim().parse().map_err(|_| ModifierError::InvalidArgument {
        modifier: modifier.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(modifier: &str, value: &str) -> Result<bool, ModifierError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ModifierError::InvalidArgument {
            modifier: modifier.to_string(),
            value: value.to_string(),
        }),
    }
}

impl FromStr for ModifierSpec {
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, rest) = match s.split_once(':') {
            Some((name, rest)) => (name, rest),
            None => (s, ""),
        };
        let lname = name.to_ascii_lowercase();

        // mapping lists carry their own ':' inside filter arguments
        match lname.as_str() {
            "axismap" => return Ok(ModifierSpec::Axismap(parse_mapping_list(rest)?)),
            "buttonmap" => return Ok(ModifierSpec::Buttonmap(parse_mapping_list(rest)?)),
            "log" => {
                return Ok(ModifierSpec::Log {
                    prefix: rest.to_string(),
                })
            }
            _ => {}
        }

        let args: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(':').map(str::trim).collect()
        };

        let spec = match lname.as_str() {
            "dpad-rotation" | "dpad-rotate" => match args.as_slice() {
                [degrees] => ModifierSpec::DpadRotation {
                    degrees: parse_value(name, degrees)?,
                },
                _ => return Err(arity(name, "1", args.len())),
            },
            "dpad-restrictor" => match args.as_slice() {
                [mode] => ModifierSpec::DpadRestrictor(mode.parse()?),
                _ => return Err(arity(name, "1", args.len())),
            },
            "four-way" | "4wayrest" | "four-way-restrictor" | "4way" => {
                ModifierSpec::FourWay(StickNames::from_args(name, &args)?)
            }
            "square" | "square-axis" => ModifierSpec::Square(StickNames::from_args(name, &args)?),
            "rotate" => match args.as_slice() {
                [x, y, degrees] | [x, y, degrees, _] => ModifierSpec::Rotate {
                    x: x.to_string(),
                    y: y.to_string(),
                    degrees: parse_value(name, degrees)?,
                    mirror: match args.get(3) {
                        Some(flag) => parse_flag(name, flag)?,
                        None => false,
                    },
                },
                _ => return Err(arity(name, "3 or 4", args.len())),
            },
            "split-axis" => match args.as_slice() {
                [axis, out_lhs, out_rhs] => ModifierSpec::SplitAxis {
                    axis: axis.to_string(),
                    out_lhs: out_lhs.to_string(),
                    out_rhs: out_rhs.to_string(),
                },
                _ => return Err(arity(name, "3", args.len())),
            },
            "join-axis" => match args.as_slice() {
                [lhs, rhs, out] => ModifierSpec::JoinAxis {
                    lhs: lhs.to_string(),
                    rhs: rhs.to_string(),
                    out: out.to_string(),
                },
                _ => return Err(arity(name, "3", args.len())),
            },
            "sector2button" => match args.as_slice() {
                [x, y, buttons @ ..] if !buttons.is_empty() => ModifierSpec::Sector2Button {
                    x: x.to_string(),
                    y: y.to_string(),
                    buttons: buttons.iter().map(|b| b.to_string()).collect(),
                },
                _ => return Err(arity(name, "at least 3", args.len())),
            },
            "stick-zone" | "stickzone" => match args.as_slice() {
                [x, y, button, start, end] => ModifierSpec::StickZone {
                    x: x.to_string(),
                    y: y.to_string(),
                    button: button.to_string(),
                    start: parse_value(name, start)?,
                    end: parse_value(name, end)?,
                },
                _ => return Err(arity(name, "5", args.len())),
            },
            "acc2axis" => match args.as_slice() {
                [ax, ay, az, out_x, out_y] => ModifierSpec::Acc2Axis {
                    acc: [ax.to_string(), ay.to_string(), az.to_string()],
                    out_x: out_x.to_string(),
                    out_y: out_y.to_string(),
                },
                _ => return Err(arity(name, "5", args.len())),
            },
            "ir2axis" => match args.as_slice() {
                [x, y, size, out_x, out_y] => ModifierSpec::Ir2Axis {
                    x: x.to_string(),
                    y: y.to_string(),
                    size: size.to_string(),
                    out_x: out_x.to_string(),
                    out_y: out_y.to_string(),
                },
                _ => return Err(arity(name, "5", args.len())),
            },
            "btn2axis" => match args.as_slice() {
                [lhs, rhs, axis] => ModifierSpec::Btn2Axis {
                    lhs: lhs.to_string(),
                    rhs: rhs.to_string(),
                    axis: axis.to_string(),
                },
                _ => return Err(arity(name, "3", args.len())),
            },
            "key-copy" => match args.as_slice() {
                [from, to] => ModifierSpec::KeyCopy {
                    from: from.to_string(),
                    to: to.to_string(),
                },
                _ => return Err(arity(name, "2", args.len())),
            },
            "latency" => match args.as_slice() {
                [msec] => ModifierSpec::Latency {
                    msec: parse_value(name, msec)?,
                },
                _ => return Err(arity(name, "1", args.len())),
            },
            "relative-axis" | "relaxis" => match args.as_slice() {
                [axis, speed] => ModifierSpec::RelativeAxis {
                    axis: axis.to_string(),
                    speed: parse_value(name, speed)?,
                },
                _ => return Err(arity(name, "2", args.len())),
            },
            "autofire" => match args.as_slice() {
                [button] | [button, _] | [button, _, _] => ModifierSpec::Autofire {
                    button: button.to_string(),
                    rate: match args.get(1) {
                        Some(rate) => parse_value(name, rate)?,
                        None => crate::filter::button::DEFAULT_AUTOFIRE_RATE,
                    },
                    delay: match args.get(2) {
                        Some(delay) => parse_value(name, delay)?,
                        None => crate::filter::button::DEFAULT_AUTOFIRE_DELAY,
                    },
                },
                _ => return Err(arity(name, "1 to 3", args.len())),
            },
            _ => return Err(ModifierError::Unknown(name.to_string())),
        };
        Ok(spec)
    }
}

impl ModifierSpec {
    /// Resolve names against `desc`, registering any outputs this modifier creates
    pub fn compile(&self, desc: &mut MessageDescriptor) -> Result<Box<dyn Modifier>, ModifierError> {
        let modifier: Box<dyn Modifier> = match self {
            ModifierSpec::Axismap(specs) => Box::new(AxismapModifier::from_specs(specs, desc)?),
            ModifierSpec::Buttonmap(specs) => Box::new(ButtonmapModifier::from_specs(specs, desc)?),
            ModifierSpec::DpadRotation { degrees } => Box::new(DpadRotationModifier::new(
                Dpad::resolve(desc)?,
                dpad::rotation_steps(*degrees),
            )),
            ModifierSpec::DpadRestrictor(mode) => Box::new(DpadRestrictorModifier::new(Dpad::resolve(desc)?, *mode)),
            ModifierSpec::FourWay(names) => Box::new(FourWayModifier::new(names.resolve(desc)?)),
            ModifierSpec::Square(names) => Box::new(SquareAxisModifier::new(names.resolve(desc)?)),
            ModifierSpec::Rotate { x, y, degrees, mirror } => Box::new(RotateAxisModifier::new(
                desc.abs.get(x)?,
                desc.abs.get(y)?,
                *degrees,
                *mirror,
            )),
            ModifierSpec::SplitAxis { axis, out_lhs, out_rhs } => Box::new(SplitAxisModifier::new(
                desc.abs.get(axis)?,
                desc.abs.put(out_lhs),
                desc.abs.put(out_rhs),
            )),
            ModifierSpec::JoinAxis { lhs, rhs, out } => Box::new(JoinAxisModifier::new(
                desc.abs.get(lhs)?,
                desc.abs.get(rhs)?,
                desc.abs.put(out),
            )),
            ModifierSpec::Sector2Button { x, y, buttons } => {
                let buttons: Vec<KeyId> = buttons.iter().map(|b| desc.key.put(b)).collect();
                Box::new(Sector2ButtonModifier::new(desc.abs.get(x)?, desc.abs.get(y)?, buttons))
            }
            ModifierSpec::StickZone {
                x,
                y,
                button,
                start,
                end,
            } => Box::new(StickZoneModifier::new(
                desc.abs.get(x)?,
                desc.abs.get(y)?,
                desc.key.put(button),
                *start,
                *end,
            )),
            ModifierSpec::Acc2Axis { acc, out_x, out_y } => {
                let acc: [AbsId; 3] = [desc.abs.get(&acc[0])?, desc.abs.get(&acc[1])?, desc.abs.get(&acc[2])?];
                Box::new(Acc2AxisModifier::new(acc, desc.abs.put(out_x), desc.abs.put(out_y)))
            }
            ModifierSpec::Ir2Axis {
                x,
                y,
                size,
                out_x,
                out_y,
            } => Box::new(Ir2AxisModifier::new(
                desc.abs.get(x)?,
                desc.abs.get(y)?,
                desc.abs.get(size)?,
                desc.abs.put(out_x),
                desc.abs.put(out_y),
            )),
            ModifierSpec::Btn2Axis { lhs, rhs, axis } => Box::new(Btn2AxisModifier::new(
                desc.key.get(lhs)?,
                desc.key.get(rhs)?,
                desc.abs.put(axis),
            )),
            ModifierSpec::KeyCopy { from, to } => {
                Box::new(KeyCopyModifier::new(desc.key.get(from)?, desc.key.put(to)))
            }
            ModifierSpec::Latency { msec } => Box::new(LatencyModifier::new(*msec)),
            ModifierSpec::RelativeAxis { axis, speed } => {
                let mut modifier = RelativeAxisModifier::new();
                modifier.add(desc.abs.get(axis)?, *speed);
                Box::new(modifier)
            }
            ModifierSpec::Autofire { button, rate, delay } => {
                let mut modifier = ButtonmapModifier::new();
                modifier.add_filter(desc.key.get(button)?, ButtonFilter::autofire(*rate, *delay));
                Box::new(modifier)
            }
            ModifierSpec::Log { prefix } => Box::new(LogModifier::new(prefix.clone())),
        };
        Ok(modifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_parse_known_modifiers() {
        assert_eq!(
            "dpad-rotation:90".parse::<ModifierSpec>(),
            Ok(ModifierSpec::DpadRotation { degrees: 90 })
        );
        assert_eq!(
            "4wayrest:x1:y1".parse::<ModifierSpec>(),
            Ok(ModifierSpec::FourWay(StickNames {
                x_in: "x1".into(),
                y_in: "y1".into(),
                x_out: "x1".into(),
                y_out: "y1".into(),
            }))
        );
        assert_eq!(
            "rotate:x2:y2:45:1".parse::<ModifierSpec>(),
            Ok(ModifierSpec::Rotate {
                x: "x2".into(),
                y: "y2".into(),
                degrees: 45.0,
                mirror: true,
            })
        );
        assert!(matches!(
            "buttonmap:a^toggle=b,b=a".parse::<ModifierSpec>(),
            Ok(ModifierSpec::Buttonmap(list)) if list.len() == 2
        ));
        assert_eq!(
            "log:pad".parse::<ModifierSpec>(),
            Ok(ModifierSpec::Log { prefix: "pad".into() })
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            "wobble:1".parse::<ModifierSpec>(),
            Err(ModifierError::Unknown("wobble".into()))
        );
        assert!(matches!(
            "square:x1".parse::<ModifierSpec>(),
            Err(ModifierError::Arity { got: 1, .. })
        ));
        assert!(matches!(
            "latency:soon".parse::<ModifierSpec>(),
            Err(ModifierError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "dpad-restrictor:diagonal".parse::<ModifierSpec>(),
            Err(ModifierError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_compile_resolves_inputs_and_registers_outputs() {
        let (mut desc, _) = gamepad_descriptor();
        let abs_before = desc.abs.len();

        let spec: ModifierSpec = "join-axis:lt:rt:trigger".parse().unwrap();
        let modifier = spec.compile(&mut desc).unwrap();
        assert_eq!(desc.abs.len(), abs_before + 1);
        assert_eq!(modifier.describe(&desc), "join-axis:lt:rt:trigger");

        let spec: ModifierSpec = "four-way:x1:nosuchaxis".parse().unwrap();
        assert!(matches!(spec.compile(&mut desc), Err(ModifierError::Descriptor(_))));
    }

    #[test]
    fn test_compiled_autofire_pulses() {
        let (mut desc, names) = gamepad_descriptor();
        let spec: ModifierSpec = "autofire:a:20".parse().unwrap();
        let mut modifier = spec.compile(&mut desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.a, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.a));

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.a, true);
        modifier.update(10, &mut msg, &desc);
        assert!(!msg.key(names.a));
        assert_eq!(modifier.describe(&desc), "buttonmap:a^autofire:20:0=a");
    }
}
