//! Logical slots and the arena that owns them

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::config::{compile_slot, AppConfig, ConfigSet};
use crate::controller_thread::ControllerThread;
use crate::matching::{parse_rules, DeviceProperties, MatchRule};
use crate::output::codes::parse_input_id;
use crate::output::UInput;
use crate::processor::ProcessorOptions;
use crate::transport::ControllerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slot: its configs, match rules, LED and the thread bound to it
pub struct ControllerSlot {
    id: SlotId,
    config: Arc<Mutex<ConfigSet>>,
    rules: Vec<MatchRule>,
    led: u8,
    options: ProcessorOptions,
    thread: Option<ControllerThread>,
}

impl ControllerSlot {
    pub fn new(id: SlotId, config: ConfigSet, rules: Vec<MatchRule>, led: u8, options: ProcessorOptions) -> Self {
        Self {
            id,
            config: Arc::new(Mutex::new(config)),
            rules,
            led,
            options,
            thread: None,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn config(&self) -> &Arc<Mutex<ConfigSet>> {
        &self.config
    }

    pub fn led_status(&self) -> u8 {
        self.led
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        self.options
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Any one rule matching is enough
    pub fn matches(&self, props: &DeviceProperties) -> bool {
        self.rules.iter().any(|rule| rule.matches(props))
    }

    pub fn is_connected(&self) -> bool {
        self.thread.is_some()
    }

    pub fn thread(&self) -> Option<&ControllerThread> {
        self.thread.as_ref()
    }

    pub fn thread_mut(&mut self) -> Option<&mut ControllerThread> {
        self.thread.as_mut()
    }

    /// Bind a thread; the slot must be free
    pub fn connect(&mut self, thread: ControllerThread) {
        debug_assert!(self.thread.is_none(), "slot {} already connected", self.id);
        self.thread = Some(thread);
    }

    pub fn disconnect(&mut self) -> Option<ControllerThread> {
        self.thread.take()
    }
}

/// All slots, created at startup
#[derive(Default)]
pub struct SlotArena {
    slots: Vec<ControllerSlot>,
}

impl SlotArena {
    pub fn new(slots: Vec<ControllerSlot>) -> Self {
        Self { slots }
    }

    /// Compile every configured slot against `uinput`
    ///
    /// Must run before `uinput` is finished so every emitter exists up front.
    pub fn build(config: &AppConfig, uinput: &mut UInput) -> Result<Self> {
        let mut slots = Vec::with_capacity(config.slots.len());
        for (index, opts) in config.slots.iter().enumerate() {
            let input_id = opts
                .device_id
                .as_deref()
                .or(config.daemon.device_id.as_deref())
                .map(parse_input_id)
                .transpose()
                .with_context(|| format!("slot {} device_id", index))?;
            let name = opts.device_name.clone().or_else(|| config.daemon.device_name.clone());
            uinput.identities_mut().set_slot(index, name, input_id);

            let set = compile_slot(index, opts, uinput)?;
            let rules = parse_rules(&opts.rules).with_context(|| format!("slot {}", index))?;
            let options = ProcessorOptions {
                rumble_gain: opts.rumble_gain,
                force_feedback: config.daemon.force_feedback,
                verbose: config.daemon.verbose,
            };
            slots.push(ControllerSlot::new(SlotId(index), set, rules, opts.led.status(index), options));
        }
        Ok(Self::new(slots))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: SlotId) -> Option<&ControllerSlot> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut ControllerSlot> {
        self.slots.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControllerSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ControllerSlot> {
        self.slots.iter_mut()
    }

    /// First free slot whose rules match, else the first free slot without rules
    pub fn find_free_slot(&self, props: &DeviceProperties) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|slot| !slot.is_connected() && slot.matches(props))
            .or_else(|| self.slots.iter().find(|slot| !slot.is_connected() && !slot.has_rules()))
            .map(ControllerSlot::id)
    }

    /// Slot currently running controller `id`
    pub fn find_controller(&self, id: ControllerId) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|slot| slot.thread().is_some_and(|t| t.id() == id))
            .map(ControllerSlot::id)
    }

    pub fn connected(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_connected()).count()
    }

    /// One line per slot: id, config count, then the bound controller or `-`
    pub fn status_table(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| {
                let configs = slot.config.lock().len();
                match slot.thread() {
                    Some(thread) => format!(
                        "slot {:>2}  configs {:>2}  led {:>2}  {}  {}  {}",
                        slot.id,
                        configs,
                        slot.led,
                        thread.usbpath(),
                        thread.usbid(),
                        thread.name()
                    ),
                    None => format!("slot {:>2}  configs {:>2}  led {:>2}  -", slot.id, configs, slot.led),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::SlotOptions;
    use crate::matching::{PROP_PRODUCT, PROP_VENDOR};
    use crate::output::{DeviceIdentities, MemoryInput};

    fn props(vendor: &str, product: &str) -> DeviceProperties {
        let mut props = DeviceProperties::new();
        props.insert(PROP_VENDOR.to_string(), vendor.to_string());
        props.insert(PROP_PRODUCT.to_string(), product.to_string());
        props
    }

    fn arena(rules: &[&[&str]]) -> SlotArena {
        let config = AppConfig {
            slots: rules
                .iter()
                .map(|r| SlotOptions {
                    rules: r.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let (backend, _) = MemoryInput::new();
        let mut uinput = UInput::new(Box::new(backend), DeviceIdentities::new(), false);
        SlotArena::build(&config, &mut uinput).unwrap()
    }

    #[test]
    fn test_rules_take_precedence_over_catch_all() {
        let arena = arena(&[&[], &["vendor=045e"]]);
        assert_eq!(arena.find_free_slot(&props("045e", "028e")), Some(SlotId(1)));
        assert_eq!(arena.find_free_slot(&props("046d", "c21d")), Some(SlotId(0)));
    }

    #[test]
    fn test_no_match_and_no_catch_all() {
        let arena = arena(&[&["vendor=045e"], &["product=0719"]]);
        assert_eq!(arena.find_free_slot(&props("ffff", "0001")), None);
        assert_eq!(arena.find_free_slot(&props("046d", "0719")), Some(SlotId(1)));
    }

    #[test]
    fn test_any_rule_matches() {
        let arena = arena(&[&["vendor=046d", "product=028e"]]);
        assert_eq!(arena.find_free_slot(&props("045e", "028e")), Some(SlotId(0)));
    }

    #[test]
    fn test_auto_led_and_status_table() {
        let arena = arena(&[&[], &[], &[], &[], &[]]);
        let leds: Vec<u8> = arena.iter().map(ControllerSlot::led_status).collect();
        assert_eq!(leds, vec![2, 3, 4, 5, 2]);

        let table = arena.status_table();
        assert_eq!(table.len(), 5);
        assert!(table[0].starts_with("slot  0"));
        assert!(table[0].ends_with('-'));
        assert_eq!(arena.connected(), 0);
    }
}
