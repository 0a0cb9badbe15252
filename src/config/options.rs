//! Declarative per-config and per-slot options, as read from YAML

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::output::OutputProfile;

/// Tunables of one controller config
///
/// Everything here is plain data; [`super::compile`] turns it into a
/// modifier chain and an output map.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerOptions {
    /// `axis: "min:center:max"`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub calibration: BTreeMap<String, String>,

    /// Stick deadzone, applied in smooth mode
    pub deadzone: i32,

    /// Deadzone of the analog triggers
    pub deadzone_trigger: i32,

    pub square_axis: bool,

    /// `axis: sensitivity`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sensitivity: BTreeMap<String, f32>,

    pub four_way_restrictor: bool,

    /// `axis: speed`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relative_axis: BTreeMap<String, i32>,

    /// Degrees, in multiples of 45
    pub dpad_rotation: i32,

    /// `button: "rate[:delay]"` in milliseconds
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub autofire: BTreeMap<String, String>,

    /// `[-]LHS[^FILTER...]=RHS` entries; an entry may hold a comma list
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttonmap: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub axismap: Vec<String>,

    /// Extra modifiers in `NAME:ARG:ARG...` form, applied last
    #[serde(rename = "modifier", skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,

    /// Base output layout
    #[serde(with = "profile_serde")]
    pub profile: OutputProfile,

    /// `source[^FILTER...]: EVENT`, overriding the profile per source
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ui_buttonmap: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ui_axismap: BTreeMap<String, String>,
}

/// LED setting of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedSetting {
    /// `2 + slot % 4`, the "player N" pattern
    #[default]
    Auto,
    Status(u8),
}

impl LedSetting {
    pub fn status(&self, slot: usize) -> u8 {
        match self {
            LedSetting::Auto => 2 + (slot % 4) as u8,
            LedSetting::Status(status) => *status,
        }
    }
}

impl FromStr for LedSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(LedSetting::Auto);
        }
        match s.parse::<u8>() {
            Ok(status) if status <= 15 => Ok(LedSetting::Status(status)),
            _ => Err(format!("invalid led '{}' (auto or 0-15)", s)),
        }
    }
}

impl fmt::Display for LedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedSetting::Auto => write!(f, "auto"),
            LedSetting::Status(status) => write!(f, "{}", status),
        }
    }
}

impl<'de> Deserialize<'de> for LedSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n.to_string().parse().map_err(serde::de::Error::custom),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for LedSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// One logical slot: which devices it takes and how it drives them
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SlotOptions {
    /// Match rules, `key=value`; any one matching is enough
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,

    #[serde(default)]
    pub led: LedSetting,

    /// Button that cycles through `configs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,

    /// Rumble strength in percent
    #[serde(default = "default_rumble_gain")]
    pub rumble_gain: u32,

    /// Virtual device name, defaults to the daemon's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// `VENDOR:PRODUCT[:VERSION[:BUS]]` of the virtual devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default = "default_configs")]
    pub configs: Vec<ControllerOptions>,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            led: LedSetting::Auto,
            toggle: None,
            rumble_gain: default_rumble_gain(),
            device_name: None,
            device_id: None,
            configs: default_configs(),
        }
    }
}

mod profile_serde {
    use super::*;

    pub fn serialize<S: Serializer>(profile: &OutputProfile, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&profile.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OutputProfile, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn default_rumble_gain() -> u32 {
    100
}

fn default_configs() -> Vec<ControllerOptions> {
    vec![ControllerOptions::default()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_options_from_yaml() {
        let yaml = r#"
deadzone: 4000
square_axis: true
sensitivity:
  x1: 0.5
buttonmap: ["a=b,b=a"]
modifier: ["dpad-rotation:90"]
profile: xpad
ui_buttonmap:
  a: KEY_SPACE
"#;
        let opts: ControllerOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.deadzone, 4000);
        assert!(opts.square_axis);
        assert_eq!(opts.sensitivity.get("x1"), Some(&0.5));
        assert_eq!(opts.modifiers, vec!["dpad-rotation:90"]);
        assert_eq!(opts.profile, OutputProfile::Xpad);
        assert_eq!(opts.ui_buttonmap.get("a").map(String::as_str), Some("KEY_SPACE"));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        assert!(serde_yaml::from_str::<ControllerOptions>("dedzone: 10").is_err());
        assert!(serde_yaml::from_str::<ControllerOptions>("profile: gamecube").is_err());
    }

    #[test]
    fn test_led_setting() {
        assert_eq!(LedSetting::Auto.status(0), 2);
        assert_eq!(LedSetting::Auto.status(5), 3);
        assert_eq!("7".parse::<LedSetting>(), Ok(LedSetting::Status(7)));
        assert!("16".parse::<LedSetting>().is_err());

        let slot: SlotOptions = serde_yaml::from_str("led: 0").unwrap();
        assert_eq!(slot.led, LedSetting::Status(0));
        let slot: SlotOptions = serde_yaml::from_str("led: auto").unwrap();
        assert_eq!(slot.led, LedSetting::Auto);
    }

    #[test]
    fn test_slot_defaults() {
        let slot: SlotOptions = serde_yaml::from_str("match: [vendor=045e]").unwrap();
        assert_eq!(slot.rules, vec!["vendor=045e"]);
        assert_eq!(slot.rumble_gain, 100);
        assert_eq!(slot.configs.len(), 1);
        assert_eq!(slot.configs[0].profile, OutputProfile::Default);
    }
}
