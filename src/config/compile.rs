//! Compile declarative options into runnable configs
//!
//! Every name is resolved here, once, at startup. A config that names an
//! unknown button, axis or event never makes it into a running slot.

use anyhow::{Context, Result};

use super::config_set::ConfigSet;
use super::options::{ControllerOptions, SlotOptions};
use crate::filter::{AxisFilter, ButtonFilter};
use crate::message::names::GamepadNames;
use crate::message::{ControllerMessage, MessageDescriptor};
use crate::modifier::{
    parse_mapping_list, dpad, AxisMappingSpec, AxismapModifier, ButtonMappingSpec, ButtonmapModifier, Dpad,
    DpadRotationModifier, FourWayModifier, Modifier, ModifierSpec, RelativeAxisModifier, SquareAxisModifier,
    StickAxes,
};
use crate::output::events::OutputEntries;
use crate::output::{OutputMap, UInput};

/// One runnable config: its modifier chain and its output wiring
pub struct ControllerConfig {
    modifiers: Vec<Box<dyn Modifier>>,
    output: OutputMap,
}

impl ControllerConfig {
    pub fn new(modifiers: Vec<Box<dyn Modifier>>, output: OutputMap) -> Self {
        Self { modifiers, output }
    }

    /// Build the modifier chain and the output map of `opts`
    ///
    /// Output names registered by modifiers end up in `desc`; output fields
    /// are created on `uinput`, which must not be finished yet.
    pub fn compile(
        opts: &ControllerOptions,
        slot: usize,
        desc: &mut MessageDescriptor,
        uinput: &mut UInput,
    ) -> Result<Self> {
        let modifiers = modifier_chain(opts, desc)?;
        let entries = OutputEntries::resolve(opts.profile, &opts.ui_buttonmap, &opts.ui_axismap)
            .context("invalid output event")?;
        let output = OutputMap::build(&entries, slot, desc, uinput)?;
        Ok(Self::new(modifiers, output))
    }

    /// Run every modifier over `msg`, in order
    pub fn apply_modifiers(&mut self, dt_ms: u32, msg: &mut ControllerMessage, desc: &MessageDescriptor) {
        for modifier in &mut self.modifiers {
            modifier.update(dt_ms, msg, desc);
        }
    }

    pub fn output(&self) -> &OutputMap {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputMap {
        &mut self.output
    }

    /// Modifier descriptions in chain order
    pub fn describe(&self, desc: &MessageDescriptor) -> Vec<String> {
        self.modifiers.iter().map(|m| m.describe(desc)).collect()
    }
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("modifiers", &self.modifiers.len())
            .field("output", &self.output)
            .finish()
    }
}

/// Build the modifier chain in its fixed order
///
/// 1. calibration, stick deadzone and trigger deadzone
/// 2. square-axis
/// 3. sensitivity
/// 4. four-way restrictor
/// 5. relative-axis
/// 6. dpad-rotation
/// 7. autofire
/// 8. buttonmap, then axismap
/// 9. the free `modifier` list
pub fn modifier_chain(opts: &ControllerOptions, desc: &mut MessageDescriptor) -> Result<Vec<Box<dyn Modifier>>> {
    let mut chain: Vec<Box<dyn Modifier>> = Vec::new();
    let names = GamepadNames::register(desc);
    let sticks = [(names.x1, names.y1), (names.x2, names.y2)];

    let mut conditioning = AxismapModifier::new();
    for (axis, value) in &opts.calibration {
        let id = desc.abs.get(axis).with_context(|| format!("calibration for '{}'", axis))?;
        let filter: AxisFilter = format!("cal:{}", value)
            .parse()
            .with_context(|| format!("calibration for '{}'", axis))?;
        conditioning.add_filter(id, filter);
    }
    if opts.deadzone != 0 {
        for axis in names.sticks() {
            conditioning.add_filter(axis, AxisFilter::deadzone(opts.deadzone, true));
        }
    }
    if opts.deadzone_trigger != 0 {
        for axis in [names.lt, names.rt] {
            conditioning.add_filter(axis, AxisFilter::deadzone(opts.deadzone_trigger, true));
        }
    }
    if !conditioning.is_empty() {
        chain.push(Box::new(conditioning));
    }

    if opts.square_axis {
        for (x, y) in sticks {
            chain.push(Box::new(SquareAxisModifier::new(StickAxes::same(x, y))));
        }
    }

    let mut sensitivity = AxismapModifier::new();
    for (axis, value) in &opts.sensitivity {
        let id = desc.abs.get(axis).with_context(|| format!("sensitivity for '{}'", axis))?;
        sensitivity.add_filter(id, AxisFilter::Sensitivity { sensitivity: *value });
    }
    if !sensitivity.is_empty() {
        chain.push(Box::new(sensitivity));
    }

    if opts.four_way_restrictor {
        for (x, y) in sticks {
            chain.push(Box::new(FourWayModifier::new(StickAxes::same(x, y))));
        }
    }

    let mut relative = RelativeAxisModifier::new();
    for (axis, speed) in &opts.relative_axis {
        let id = desc.abs.get(axis).with_context(|| format!("relative_axis for '{}'", axis))?;
        relative.add(id, *speed);
    }
    if !relative.is_empty() {
        chain.push(Box::new(relative));
    }

    if opts.dpad_rotation != 0 {
        if opts.dpad_rotation % 45 != 0 {
            anyhow::bail!("dpad_rotation must be a multiple of 45, got {}", opts.dpad_rotation);
        }
        chain.push(Box::new(DpadRotationModifier::new(
            Dpad::resolve(desc)?,
            dpad::rotation_steps(opts.dpad_rotation),
        )));
    }

    let mut autofire = ButtonmapModifier::new();
    for (button, spec) in &opts.autofire {
        let id = desc.key.get(button).with_context(|| format!("autofire for '{}'", button))?;
        let (rate, delay) = parse_autofire(spec).with_context(|| format!("autofire for '{}'", button))?;
        autofire.add_filter(id, ButtonFilter::autofire(rate, delay));
    }
    if !autofire.is_empty() {
        chain.push(Box::new(autofire));
    }

    let mut buttonmap: Vec<ButtonMappingSpec> = Vec::new();
    for entry in &opts.buttonmap {
        buttonmap.extend(parse_mapping_list(entry).with_context(|| format!("buttonmap '{}'", entry))?);
    }
    if !buttonmap.is_empty() {
        chain.push(Box::new(ButtonmapModifier::from_specs(&buttonmap, desc).context("buttonmap")?));
    }

    let mut axismap: Vec<AxisMappingSpec> = Vec::new();
    for entry in &opts.axismap {
        axismap.extend(parse_mapping_list(entry).with_context(|| format!("axismap '{}'", entry))?);
    }
    if !axismap.is_empty() {
        chain.push(Box::new(AxismapModifier::from_specs(&axismap, desc).context("axismap")?));
    }

    for entry in &opts.modifiers {
        let spec: ModifierSpec = entry.parse().with_context(|| format!("modifier '{}'", entry))?;
        chain.push(spec.compile(desc).with_context(|| format!("modifier '{}'", entry))?);
    }

    Ok(chain)
}

fn parse_autofire(spec: &str) -> Result<(u32, u32)> {
    let (rate, delay) = match spec.split_once(':') {
        Some((rate, delay)) => (rate, Some(delay)),
        None => (spec, None),
    };
    let rate: u32 = rate.trim().parse().with_context(|| format!("invalid rate '{}'", rate))?;
    let delay: u32 = match delay {
        Some(d) => d.trim().parse().with_context(|| format!("invalid delay '{}'", d))?,
        None => 0,
    };
    Ok((rate, delay))
}

/// Compile every config of a slot against one fresh gamepad descriptor
pub fn compile_slot(slot: usize, opts: &SlotOptions, uinput: &mut UInput) -> Result<ConfigSet> {
    let mut desc = MessageDescriptor::new();
    GamepadNames::register(&mut desc);

    let mut configs = Vec::with_capacity(opts.configs.len());
    for (index, config) in opts.configs.iter().enumerate() {
        let compiled = ControllerConfig::compile(config, slot, &mut desc, uinput)
            .with_context(|| format!("slot {} config {}", slot, index))?;
        configs.push(compiled);
    }

    let toggle = opts
        .toggle
        .as_deref()
        .map(|name| desc.key.get(name))
        .transpose()
        .with_context(|| format!("slot {} toggle button", slot))?;

    Ok(ConfigSet::new(desc, configs, toggle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;
    use crate::output::{DeviceIdentities, MemoryInput};

    fn chain_descriptions(opts: &ControllerOptions) -> Vec<String> {
        let (mut desc, _) = gamepad_descriptor();
        let chain = modifier_chain(opts, &mut desc).unwrap();
        chain.iter().map(|m| m.describe(&desc)).collect()
    }

    #[test]
    fn test_empty_options_give_empty_chain() {
        assert!(chain_descriptions(&ControllerOptions::default()).is_empty());
    }

    #[test]
    fn test_chain_order_is_fixed() {
        let opts = ControllerOptions {
            deadzone: 4000,
            square_axis: true,
            dpad_rotation: 90,
            buttonmap: vec!["a=b".into()],
            axismap: vec!["-y1=y1".into()],
            modifiers: vec!["latency:10".into()],
            ..Default::default()
        };
        let names: Vec<String> = chain_descriptions(&opts)
            .into_iter()
            .map(|d| d.split(':').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["axismap", "square", "square", "dpad-rotation", "buttonmap", "axismap", "latency"]
        );
    }

    #[test]
    fn test_unknown_names_fail_compilation() {
        let (mut desc, _) = gamepad_descriptor();
        let opts = ControllerOptions {
            buttonmap: vec!["a=nope".into()],
            ..Default::default()
        };
        let err = modifier_chain(&opts, &mut desc).err().unwrap();
        assert!(format!("{:#}", err).contains("nope"));

        let opts = ControllerOptions {
            dpad_rotation: 30,
            ..Default::default()
        };
        assert!(modifier_chain(&opts, &mut desc).is_err());
    }

    #[test]
    fn test_deadzone_conditions_before_remap() {
        let (mut desc, names) = gamepad_descriptor();
        let opts = ControllerOptions {
            deadzone: 4000,
            axismap: vec!["x1=y1".into()],
            ..Default::default()
        };
        let mut chain = modifier_chain(&opts, &mut desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 3000);
        for m in &mut chain {
            m.update(10, &mut msg, &desc);
        }
        assert_eq!(msg.abs(names.y1), 0);
    }

    #[test]
    fn test_autofire_spec() {
        assert_eq!(parse_autofire("20").unwrap(), (20, 0));
        assert_eq!(parse_autofire("20:100").unwrap(), (20, 100));
        assert!(parse_autofire("fast").is_err());
    }

    #[test]
    fn test_compile_slot_resolves_toggle() {
        let (backend, _) = MemoryInput::new();
        let mut uinput = UInput::new(Box::new(backend), DeviceIdentities::new(), true);
        let opts = SlotOptions {
            toggle: Some("guide".into()),
            configs: vec![ControllerOptions::default(), ControllerOptions::default()],
            ..Default::default()
        };
        let set = compile_slot(0, &opts, &mut uinput).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.toggle().is_some());

        let bad = SlotOptions {
            toggle: Some("turbo".into()),
            ..Default::default()
        };
        assert!(compile_slot(1, &bad, &mut uinput).is_err());
    }
}
