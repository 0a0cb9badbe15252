//! Per-tick glue between a controller and its slot's outputs
//!
//! Each tick the processor watches the config toggle, runs the active
//! config's modifier chain over a copy of the raw message and hands the
//! resulting writes to the output actor as one frame.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ConfigSet;
use crate::message::{ControllerMessage, MessageLine};
use crate::output::{DeviceId, EmitterWrite, ForceFeedbackCallback, OutputHandle};

/// Per-slot processor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Percent applied to rumble magnitudes
    pub rumble_gain: u32,
    pub force_feedback: bool,
    /// Trace the message line of every tick
    pub verbose: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            rumble_gain: 100,
            force_feedback: false,
            verbose: false,
        }
    }
}

/// Scale a 16 bit force feedback magnitude to a motor byte
pub fn rumble_strength(magnitude: u16, gain: u32) -> u8 {
    ((magnitude as u32 >> 8) * gain / 100).min(255) as u8
}

pub struct MessageProcessor {
    slot: usize,
    config: Arc<Mutex<ConfigSet>>,
    output: OutputHandle,
    options: ProcessorOptions,
    scratch: ControllerMessage,
    toggle_held: bool,
    rumble_tx: Sender<(u8, u8)>,
    rumble_rx: Receiver<(u8, u8)>,
}

impl MessageProcessor {
    pub fn new(slot: usize, config: Arc<Mutex<ConfigSet>>, output: OutputHandle, options: ProcessorOptions) -> Self {
        let scratch = ControllerMessage::new(config.lock().descriptor());
        let (rumble_tx, rumble_rx) = channel::unbounded();
        Self {
            slot,
            config,
            output,
            options,
            scratch,
            toggle_held: false,
            rumble_tx,
            rumble_rx,
        }
    }

    /// Blank message sized for this slot's descriptor
    pub fn blank_message(&self) -> ControllerMessage {
        ControllerMessage::new(self.config.lock().descriptor())
    }

    /// Run one tick for `raw`, which is never modified
    pub fn send(&mut self, raw: &ControllerMessage, dt_ms: u32) {
        let mut frame = Vec::new();
        let mut switched = false;
        {
            let mut set = self.config.lock();

            if let Some(toggle) = set.toggle() {
                let pressed = raw.key(toggle);
                if pressed && !self.toggle_held {
                    set.reset_all_outputs(&mut frame);
                    set.next_config();
                    switched = true;
                }
                self.toggle_held = pressed;
            }

            let Some((config, desc)) = set.current_with_descriptor() else {
                return;
            };

            self.scratch.assign_values(raw);
            config.apply_modifiers(dt_ms, &mut self.scratch, desc);
            if self.options.verbose {
                trace!(slot = self.slot, "{}", MessageLine::new(&self.scratch, desc));
            }

            let output = config.output_mut();
            frame.extend(output.send(&self.scratch));
            frame.extend(output.update(dt_ms));
        }

        self.output.send_frame(frame);
        if switched {
            self.install_force_feedback();
        }
    }

    /// Zero every output of every config of the slot
    pub fn reset(&mut self) {
        let mut frame: Vec<EmitterWrite> = Vec::new();
        self.config.lock().reset_all_outputs(&mut frame);
        self.toggle_held = false;
        self.output.send_frame(frame);
    }

    /// Route rumble requests of the slot's joystick to this processor
    pub fn install_force_feedback(&self) {
        if !self.options.force_feedback {
            return;
        }
        let tx = self.rumble_tx.clone();
        let gain = self.options.rumble_gain;
        let callback: ForceFeedbackCallback = Box::new(move |strong, weak| {
            let _ = tx.send((rumble_strength(strong, gain), rumble_strength(weak, gain)));
        });
        debug!(slot = self.slot, "force feedback wired");
        self.output.set_force_feedback(DeviceId::joystick(self.slot), Some(callback));
    }

    pub fn remove_force_feedback(&self) {
        if self.options.force_feedback {
            self.output.set_force_feedback(DeviceId::joystick(self.slot), None);
        }
    }

    /// Most recent pending rumble request, if any
    pub fn take_rumble(&self) -> Option<(u8, u8)> {
        self.rumble_rx.try_iter().last()
    }

    pub fn current_config(&self) -> usize {
        self.config.lock().current_index()
    }
}
