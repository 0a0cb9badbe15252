//! Slot match rules
//!
//! A rule is a predicate over the string properties discovery reports for a
//! device. Leaves compare one property; a [`MatchRule::Group`] is the AND of
//! its children. Written as `key=value`, with `,` joining leaves into a group:
//!
//! ```text
//! usbid=045e:028e
//! vendor=045e,product=0719
//! usbpath=003:012
//! property=ID_SERIAL:Microsoft_Controller
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Properties of one device, as reported by udev
pub type DeviceProperties = BTreeMap<String, String>;

pub const PROP_VENDOR: &str = "ID_VENDOR_ID";
pub const PROP_PRODUCT: &str = "ID_MODEL_ID";
pub const PROP_BUSNUM: &str = "BUSNUM";
pub const PROP_DEVNUM: &str = "DEVNUM";
pub const PROP_SERIAL: &str = "ID_SERIAL_SHORT";
pub const PROP_DEVNAME: &str = "DEVNAME";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("match rule '{0}' must be key=value")]
    Syntax(String),

    #[error("unknown match rule '{0}'")]
    UnknownKey(String),

    #[error("match rule {key}: expected {expected}, got '{value}'")]
    Arity {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("match rule {key}: '{value}' is not a valid number")]
    Number { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    UsbId { vendor: u16, product: u16 },
    Vendor(u16),
    Product(u16),
    UsbPath { bus: u16, dev: u16 },
    Serial(String),
    Property { name: String, value: String },
    Evdev(String),
    /// All children must match
    Group(Vec<MatchRule>),
}

impl MatchRule {
    pub fn matches(&self, props: &DeviceProperties) -> bool {
        match self {
            MatchRule::UsbId { vendor, product } => {
                hex_prop(props, PROP_VENDOR) == Some(*vendor) && hex_prop(props, PROP_PRODUCT) == Some(*product)
            }
            MatchRule::Vendor(vendor) => hex_prop(props, PROP_VENDOR) == Some(*vendor),
            MatchRule::Product(product) => hex_prop(props, PROP_PRODUCT) == Some(*product),
            MatchRule::UsbPath { bus, dev } => {
                dec_prop(props, PROP_BUSNUM) == Some(*bus) && dec_prop(props, PROP_DEVNUM) == Some(*dev)
            }
            MatchRule::Serial(serial) => props.get(PROP_SERIAL) == Some(serial),
            MatchRule::Property { name, value } => props.get(name) == Some(value),
            MatchRule::Evdev(path) => props.get(PROP_DEVNAME) == Some(path),
            MatchRule::Group(rules) => rules.iter().all(|r| r.matches(props)),
        }
    }

    fn parse_leaf(s: &str) -> Result<Self, RuleError> {
        let (key, value) = s.split_once('=').ok_or_else(|| RuleError::Syntax(s.to_string()))?;
        let key = key.trim();
        let value = value.trim();
        let args: Vec<&str> = value.split(':').collect();
        let arity = |expected: &'static str| RuleError::Arity {
            key: key.to_string(),
            expected,
            value: value.to_string(),
        };
        let hex = |v: &str| {
            u16::from_str_radix(v.trim_start_matches("0x"), 16).map_err(|_| RuleError::Number {
                key: key.to_string(),
                value: v.to_string(),
            })
        };
        let dec = |v: &str| {
            v.parse::<u16>().map_err(|_| RuleError::Number {
                key: key.to_string(),
                value: v.to_string(),
            })
        };

        match key.to_ascii_lowercase().as_str() {
            "usbid" => match args.as_slice() {
                [vendor, product] => Ok(MatchRule::UsbId {
                    vendor: hex(vendor)?,
                    product: hex(product)?,
                }),
                _ => Err(arity("VENDOR:PRODUCT")),
            },
            "vendor" => match args.as_slice() {
                [vendor] => Ok(MatchRule::Vendor(hex(vendor)?)),
                _ => Err(arity("VENDOR")),
            },
            "product" => match args.as_slice() {
                [product] => Ok(MatchRule::Product(hex(product)?)),
                _ => Err(arity("PRODUCT")),
            },
            "usbpath" => match args.as_slice() {
                [bus, dev] => Ok(MatchRule::UsbPath {
                    bus: dec(bus)?,
                    dev: dec(dev)?,
                }),
                _ => Err(arity("BUS:DEV")),
            },
            "serial" if !value.is_empty() => Ok(MatchRule::Serial(value.to_string())),
            "serial" => Err(arity("SERIAL")),
            "property" => match value.split_once(':') {
                Some((name, value)) if !name.is_empty() => Ok(MatchRule::Property {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(arity("NAME:VALUE")),
            },
            "evdev" if !value.is_empty() => Ok(MatchRule::Evdev(value.to_string())),
            "evdev" => Err(arity("PATH")),
            _ => Err(RuleError::UnknownKey(key.to_string())),
        }
    }
}

fn hex_prop(props: &DeviceProperties, name: &str) -> Option<u16> {
    props.get(name).and_then(|v| u16::from_str_radix(v, 16).ok())
}

fn dec_prop(props: &DeviceProperties, name: &str) -> Option<u16> {
    props.get(name).and_then(|v| v.parse().ok())
}

impl FromStr for MatchRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut leaves = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(MatchRule::parse_leaf)
            .collect::<Result<Vec<_>, _>>()?;
        if leaves.len() > 1 {
            return Ok(MatchRule::Group(leaves));
        }
        leaves.pop().ok_or_else(|| RuleError::Syntax(s.to_string()))
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::UsbId { vendor, product } => write!(f, "usbid={:04x}:{:04x}", vendor, product),
            MatchRule::Vendor(vendor) => write!(f, "vendor={:04x}", vendor),
            MatchRule::Product(product) => write!(f, "product={:04x}", product),
            MatchRule::UsbPath { bus, dev } => write!(f, "usbpath={:03}:{:03}", bus, dev),
            MatchRule::Serial(serial) => write!(f, "serial={}", serial),
            MatchRule::Property { name, value } => write!(f, "property={}:{}", name, value),
            MatchRule::Evdev(path) => write!(f, "evdev={}", path),
            MatchRule::Group(rules) => {
                let parts: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// Parse a list of rules, failing on the first bad one
pub fn parse_rules<S: AsRef<str>>(rules: &[S]) -> Result<Vec<MatchRule>, RuleError> {
    rules.iter().map(|r| r.as_ref().parse()).collect()
}
