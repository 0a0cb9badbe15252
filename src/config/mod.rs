//! Configuration for padforge
//!
//! Loads the YAML daemon configuration and compiles slot options into
//! runnable config sets.

pub mod compile;
pub mod config_set;
pub mod options;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::matching::parse_rules;
use crate::modifier::{parse_mapping_list, AxisMappingSpec, ButtonMappingSpec, ModifierSpec};
use crate::output::codes::parse_input_id;

pub use compile::{compile_slot, ControllerConfig};
pub use config_set::ConfigSet;
pub use options::{ControllerOptions, LedSetting, SlotOptions};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default = "default_slots")]
    pub slots: Vec<SlotOptions>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            slots: default_slots(),
        }
    }
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Run with `usbpath usbid name` when a controller is bound to a slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_connect: Option<String>,

    /// Run with `usbpath usbid name` when a controller leaves its slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_disconnect: Option<String>,

    /// Child process started with the first controller; its exit ends the daemon
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<String>,

    /// Read timeout of the controller loops, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Separate mouse and keyboard devices next to the joystick
    #[serde(default = "default_true")]
    pub extra_devices: bool,

    /// Expose rumble on the joystick devices
    #[serde(default)]
    pub force_feedback: bool,

    /// Detach the kernel driver from claimed interfaces
    #[serde(default = "default_true")]
    pub detach_kernel_driver: bool,

    /// Base name of the virtual devices, slots may override it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// `VENDOR:PRODUCT[:VERSION[:BUS]]` of the virtual devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Trace every message that reaches the output stage
    #[serde(default)]
    pub verbose: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            on_connect: None,
            on_disconnect: None,
            exec: Vec::new(),
            timeout_ms: default_timeout_ms(),
            extra_devices: true,
            force_feedback: false,
            detach_kernel_driver: true,
            device_name: None,
            device_id: None,
            verbose: false,
        }
    }
}

impl DaemonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Validate configuration for correctness and consistency
    ///
    /// Checks syntax only; names are resolved when slots are compiled.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.timeout_ms == 0 {
            anyhow::bail!("daemon.timeout_ms must be positive");
        }
        if let Some(id) = &self.daemon.device_id {
            parse_input_id(id).with_context(|| "daemon.device_id".to_string())?;
        }
        if self.daemon.exec.first().is_some_and(|cmd| cmd.trim().is_empty()) {
            anyhow::bail!("daemon.exec command cannot be empty");
        }

        if self.slots.is_empty() {
            anyhow::bail!("At least one slot must be defined");
        }

        for (index, slot) in self.slots.iter().enumerate() {
            parse_rules(&slot.rules).with_context(|| format!("slot {}", index))?;

            if slot.configs.is_empty() {
                anyhow::bail!("slot {} must have at least one config", index);
            }
            if slot.rumble_gain > 1000 {
                anyhow::bail!("slot {} rumble_gain {} is out of range (0-1000)", index, slot.rumble_gain);
            }
            if let Some(id) = &slot.device_id {
                parse_input_id(id).with_context(|| format!("slot {} device_id", index))?;
            }
            if slot.toggle.as_deref().is_some_and(str::is_empty) {
                anyhow::bail!("slot {} toggle cannot be empty", index);
            }

            for (config_index, config) in slot.configs.iter().enumerate() {
                validate_controller(config).with_context(|| format!("slot {} config {}", index, config_index))?;
            }
        }

        Ok(())
    }
}

fn validate_controller(config: &ControllerOptions) -> Result<()> {
    if config.deadzone < 0 || config.deadzone_trigger < 0 {
        anyhow::bail!("deadzones cannot be negative");
    }
    for entry in &config.buttonmap {
        parse_mapping_list::<crate::filter::ButtonFilter>(entry)
            .map(|_: Vec<ButtonMappingSpec>| ())
            .with_context(|| format!("buttonmap '{}'", entry))?;
    }
    for entry in &config.axismap {
        parse_mapping_list::<crate::filter::AxisFilter>(entry)
            .map(|_: Vec<AxisMappingSpec>| ())
            .with_context(|| format!("axismap '{}'", entry))?;
    }
    for entry in &config.modifiers {
        entry
            .parse::<ModifierSpec>()
            .with_context(|| format!("modifier '{}'", entry))?;
    }
    Ok(())
}

fn default_slots() -> Vec<SlotOptions> {
    vec![SlotOptions::default()]
}
fn default_timeout_ms() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
