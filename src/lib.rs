//! padforge - userspace driver for Xbox family gamepads
//!
//! USB reports are decoded into a symbolic [`message::ControllerMessage`],
//! run through each slot's modifier chain and written to virtual uinput
//! devices. Slots are bound to controllers as they are plugged in.

pub mod config;
pub mod controller_thread;
pub mod daemon;
pub mod discovery;
pub mod filter;
pub mod matching;
pub mod message;
pub mod modifier;
pub mod output;
pub mod processor;
pub mod slot;
pub mod transport;
