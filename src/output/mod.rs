//! Output multiplexer
//!
//! Virtual-device fields are owned by collectors that combine the writes of
//! any number of emitters. One [`uinput::UInput`] per process owns every
//! collector; it lives inside the [`actor::OutputActor`] task and controller
//! threads hand it whole frames.

pub mod actor;
pub mod codes;
pub mod collector;
pub mod evdev_backend;
pub mod events;
pub mod memory;
pub mod uinput;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use actor::{EmitterWrite, ForceFeedbackCallback, OutputActor, OutputCommand, OutputHandle};
pub use collector::EmitterId;
pub use events::{AxisEvent, ButtonEvent, OutputMap, OutputProfile};
pub use memory::{MemoryInput, MemoryLog};
pub use uinput::{AbsRange, DeviceIdentities, FieldSpec, ForceFeedbackEvent, UInput, VirtualInput};

/// Which virtual device of a slot a field lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Joystick,
    Mouse,
    Keyboard,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Joystick => write!(f, "joystick"),
            DeviceKind::Mouse => write!(f, "mouse"),
            DeviceKind::Keyboard => write!(f, "keyboard"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "joystick" | "js" => Ok(DeviceKind::Joystick),
            "mouse" => Ok(DeviceKind::Mouse),
            "keyboard" | "kbd" => Ok(DeviceKind::Keyboard),
            _ => Err(OutputError::UnknownDevice(s.to_string())),
        }
    }
}

/// One virtual input device: a slot plus a device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub slot: usize,
    pub kind: DeviceKind,
}

impl DeviceId {
    pub fn new(slot: usize, kind: DeviceKind) -> Self {
        Self { slot, kind }
    }

    pub fn joystick(slot: usize) -> Self {
        Self::new(slot, DeviceKind::Joystick)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.slot)
    }
}

/// Kernel event type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Key,
    Rel,
    Abs,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Key => write!(f, "key"),
            EventKind::Rel => write!(f, "rel"),
            EventKind::Abs => write!(f, "abs"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("unknown event name '{0}'")]
    UnknownEvent(String),

    #[error("invalid output event '{spec}': {reason}")]
    InvalidEvent { spec: String, reason: String },

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("invalid device id '{0}', expected VENDOR:PRODUCT[:VERSION[:BUS]]")]
    InvalidInputId(String),

    #[error("{0} was already created, fields can't be added")]
    AlreadyFinished(DeviceId),

    #[error("{0} has not been created")]
    NotCreated(DeviceId),

    #[error("output actor is gone")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
