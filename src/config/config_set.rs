//! The ordered configs of one slot

use tracing::info;

use super::compile::ControllerConfig;
use crate::message::{KeyId, MessageDescriptor};
use crate::output::EmitterWrite;

/// All configs of a slot, the descriptor they were compiled against, and
/// which one is active
#[derive(Debug)]
pub struct ConfigSet {
    descriptor: MessageDescriptor,
    configs: Vec<ControllerConfig>,
    current: usize,
    toggle: Option<KeyId>,
}

impl ConfigSet {
    pub fn new(descriptor: MessageDescriptor, configs: Vec<ControllerConfig>, toggle: Option<KeyId>) -> Self {
        Self {
            descriptor,
            configs,
            current: 0,
            toggle,
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Button that switches to the next config on its rising edge
    pub fn toggle(&self) -> Option<KeyId> {
        self.toggle
    }

    pub fn current(&self) -> Option<&ControllerConfig> {
        self.configs.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut ControllerConfig> {
        self.configs.get_mut(self.current)
    }

    /// The active config together with the descriptor, borrowed apart
    pub fn current_with_descriptor(&mut self) -> Option<(&mut ControllerConfig, &MessageDescriptor)> {
        let descriptor = &self.descriptor;
        self.configs.get_mut(self.current).map(|config| (config, descriptor))
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn next_config(&mut self) {
        if self.configs.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.configs.len();
        info!(config = self.current, "switched to next config");
    }

    pub fn prev_config(&mut self) {
        if self.configs.is_empty() {
            return;
        }
        self.current = (self.current + self.configs.len() - 1) % self.configs.len();
        info!(config = self.current, "switched to previous config");
    }

    /// Select config `n`; out-of-range indices are ignored
    pub fn set_current(&mut self, n: usize) -> bool {
        if n < self.configs.len() {
            self.current = n;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Append the writes that release every output of every config
    pub fn reset_all_outputs(&mut self, frame: &mut Vec<EmitterWrite>) {
        for config in &mut self.configs {
            frame.extend(config.output_mut().reset());
        }
    }

    /// Modifier descriptions of every config, for `--dump-config`
    pub fn describe(&self) -> Vec<Vec<String>> {
        self.configs.iter().map(|c| c.describe(&self.descriptor)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::{ControllerOptions, SlotOptions};
    use crate::config::compile::compile_slot;
    use crate::message::ControllerMessage;
    use crate::output::{DeviceIdentities, MemoryInput, UInput};

    fn three_configs() -> ConfigSet {
        let (backend, _) = MemoryInput::new();
        let mut uinput = UInput::new(Box::new(backend), DeviceIdentities::new(), false);
        let opts = SlotOptions {
            configs: vec![ControllerOptions::default(); 3],
            ..Default::default()
        };
        compile_slot(0, &opts, &mut uinput).unwrap()
    }

    #[test]
    fn test_next_and_prev_wrap() {
        let mut set = three_configs();
        assert_eq!(set.current_index(), 0);
        set.prev_config();
        assert_eq!(set.current_index(), 2);
        set.next_config();
        assert_eq!(set.current_index(), 0);
        set.next_config();
        set.next_config();
        set.next_config();
        assert_eq!(set.current_index(), 0);
    }

    #[test]
    fn test_set_current_bounds() {
        let mut set = three_configs();
        assert!(set.set_current(2));
        assert_eq!(set.current_index(), 2);
        assert!(!set.set_current(3));
        assert_eq!(set.current_index(), 2);
    }

    #[test]
    fn test_reset_all_outputs_releases_previous_config() {
        let mut set = three_configs();
        let a = set.descriptor().key.get("a").unwrap();
        let x1 = set.descriptor().abs.get("x1").unwrap();

        let mut msg = ControllerMessage::new(set.descriptor());
        msg.set_key(a, true);
        msg.set_abs(x1, 1000);
        let pressed = set.current_mut().map(|c| c.output_mut().send(&msg)).unwrap_or_default();
        // the first frame also carries the resting axes
        assert!(pressed.iter().any(|w| w.value == 1000));
        assert!(pressed.iter().any(|w| w.value == 1));

        set.next_config();
        let mut frame = Vec::new();
        set.reset_all_outputs(&mut frame);
        assert_eq!(frame.len(), 2);
        assert!(frame.iter().all(|w| w.value == 0));
    }
}
