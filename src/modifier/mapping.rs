//! Axis and button remapping
//!
//! A mapping is written `[-]LHS[^FILTER[^FILTER...]][=RHS]`. The filters run
//! in declared order on the LHS value before it is combined into RHS.

use std::fmt;
use std::str::FromStr;

use crate::filter::{AxisFilter, ButtonFilter, FilterError};
use crate::message::{to_float, AbsId, ControllerMessage, KeyId, MessageDescriptor};

use super::{Modifier, ModifierError};

/// A mapping as written, names still unresolved
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSpec<F> {
    pub lhs: String,
    pub rhs: String,
    pub invert: bool,
    pub filters: Vec<F>,
}

pub type AxisMappingSpec = MappingSpec<AxisFilter>;
pub type ButtonMappingSpec = MappingSpec<ButtonFilter>;

impl<F> FromStr for MappingSpec<F>
where
    F: FromStr<Err = FilterError>,
{
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (lhs, rhs) = match s.split_once('=') {
            Some((lhs, rhs)) => (lhs.trim(), rhs.trim()),
            None => (s, ""),
        };
        let (invert, lhs) = match lhs.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, lhs),
        };

        let mut parts = lhs.split('^');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(ModifierError::InvalidMapping(s.to_string()));
        }
        let filters = parts.map(str::parse).collect::<Result<Vec<F>, _>>()?;

        let rhs = if rhs.is_empty() { name } else { rhs };
        Ok(MappingSpec {
            lhs: name.to_string(),
            rhs: rhs.to_string(),
            invert,
            filters,
        })
    }
}

impl<F: fmt::Display> fmt::Display for MappingSpec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            write!(f, "-")?;
        }
        write!(f, "{}", self.lhs)?;
        for filter in &self.filters {
            write!(f, "^{}", filter)?;
        }
        write!(f, "={}", self.rhs)
    }
}

/// Parse a comma separated mapping list (`a=b,x^toggle=y`)
pub fn parse_mapping_list<F>(s: &str) -> Result<Vec<MappingSpec<F>>, ModifierError>
where
    F: FromStr<Err = FilterError>,
{
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// A mapping with its names resolved against a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping<I, F> {
    pub lhs: I,
    pub rhs: I,
    pub invert: bool,
    pub filters: Vec<F>,
}

pub type AxisMapping = Mapping<AbsId, AxisFilter>;
pub type ButtonMapping = Mapping<KeyId, ButtonFilter>;

// ============================================================================
// Axismap
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AxismapModifier {
    mappings: Vec<AxisMapping>,
}

impl AxismapModifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve written mappings; both sides must already be registered
    pub fn from_specs(specs: &[AxisMappingSpec], desc: &MessageDescriptor) -> Result<Self, ModifierError> {
        let mut modifier = Self::new();
        for spec in specs {
            modifier.add(Mapping {
                lhs: desc.abs.get(&spec.lhs)?,
                rhs: desc.abs.get(&spec.rhs)?,
                invert: spec.invert,
                filters: spec.filters.clone(),
            });
        }
        Ok(modifier)
    }

    pub fn add(&mut self, mapping: AxisMapping) {
        self.mappings.push(mapping);
    }

    /// Append `filter` to the identity mapping of `axis`, creating it if needed
    pub fn add_filter(&mut self, axis: AbsId, filter: AxisFilter) {
        match self.mappings.iter_mut().find(|m| m.lhs == axis && m.rhs == axis) {
            Some(mapping) => mapping.filters.push(filter),
            None => self.add(Mapping {
                lhs: axis,
                rhs: axis,
                invert: false,
                filters: vec![filter],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Modifier for AxismapModifier {
    fn update(&mut self, dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        for mapping in &mut self.mappings {
            mapping.filters.iter_mut().for_each(|f| f.update(dt_ms));
        }

        let mut out = msg.clone();
        for mapping in &self.mappings {
            out.set_abs_float(mapping.lhs, 0.0);
        }

        for mapping in &mut self.mappings {
            let (min, max) = msg.abs_range(mapping.lhs);
            let mut value = msg.abs(mapping.lhs);
            if mapping.invert {
                value = AxisFilter::Invert.filter(value, min, max);
            }
            for filter in &mut mapping.filters {
                value = filter.filter(value, min, max);
            }

            let lhs = to_float(value, min, max);
            if mapping.lhs == mapping.rhs {
                out.set_abs_float(mapping.rhs, lhs);
            } else {
                let rhs = out.abs_float(mapping.rhs);
                out.set_abs_float(mapping.rhs, (lhs + rhs).clamp(-1.0, 1.0));
            }
        }

        *msg = out;
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        let entries: Vec<String> = self
            .mappings
            .iter()
            .map(|m| {
                describe_mapping(
                    m.invert,
                    desc.abs.name(m.lhs),
                    m.filters.iter().map(ToString::to_string),
                    desc.abs.name(m.rhs),
                )
            })
            .collect();
        format!("axismap:{}", entries.join(","))
    }
}

// ============================================================================
// Buttonmap
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ButtonmapModifier {
    mappings: Vec<ButtonMapping>,
}

impl ButtonmapModifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ButtonMappingSpec], desc: &MessageDescriptor) -> Result<Self, ModifierError> {
        let mut modifier = Self::new();
        for spec in specs {
            modifier.add(Mapping {
                lhs: desc.key.get(&spec.lhs)?,
                rhs: desc.key.get(&spec.rhs)?,
                invert: spec.invert,
                filters: spec.filters.clone(),
            });
        }
        Ok(modifier)
    }

    pub fn add(&mut self, mapping: ButtonMapping) {
        self.mappings.push(mapping);
    }

    /// Append `filter` to the identity mapping of `button`, creating it if needed
    pub fn add_filter(&mut self, button: KeyId, filter: ButtonFilter) {
        match self.mappings.iter_mut().find(|m| m.lhs == button && m.rhs == button) {
            Some(mapping) => mapping.filters.push(filter),
            None => self.add(Mapping {
                lhs: button,
                rhs: button,
                invert: false,
                filters: vec![filter],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Modifier for ButtonmapModifier {
    fn update(&mut self, dt_ms: u32, msg: &mut ControllerMessage, _desc: &MessageDescriptor) {
        for mapping in &mut self.mappings {
            mapping.filters.iter_mut().for_each(|f| f.update(dt_ms));
        }

        let mut out = msg.clone();
        for mapping in &self.mappings {
            out.set_key(mapping.lhs, false);
        }

        for mapping in &mut self.mappings {
            let mut value = msg.key(mapping.lhs) != mapping.invert;
            for filter in &mut mapping.filters {
                value = filter.filter(value);
            }
            let combined = value || out.key(mapping.rhs);
            out.set_key(mapping.rhs, combined);
        }

        *msg = out;
    }

    fn describe(&self, desc: &MessageDescriptor) -> String {
        let entries: Vec<String> = self
            .mappings
            .iter()
            .map(|m| {
                describe_mapping(
                    m.invert,
                    desc.key.name(m.lhs),
                    m.filters.iter().map(ToString::to_string),
                    desc.key.name(m.rhs),
                )
            })
            .collect();
        format!("buttonmap:{}", entries.join(","))
    }
}

fn describe_mapping(invert: bool, lhs: &str, filters: impl Iterator<Item = String>, rhs: &str) -> String {
    let mut out = String::new();
    if invert {
        out.push('-');
    }
    out.push_str(lhs);
    for filter in filters {
        out.push('^');
        out.push_str(&filter);
    }
    out.push('=');
    out.push_str(rhs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::names::gamepad_descriptor;

    #[test]
    fn test_parse_mapping_forms() {
        let spec: AxisMappingSpec = "x1".parse().unwrap();
        assert_eq!(spec.lhs, "x1");
        assert_eq!(spec.rhs, "x1");
        assert!(!spec.invert);

        let spec: AxisMappingSpec = "-y1^dead:4000^inv=x2".parse().unwrap();
        assert!(spec.invert);
        assert_eq!(spec.lhs, "y1");
        assert_eq!(spec.rhs, "x2");
        assert_eq!(spec.filters, vec![AxisFilter::deadzone(4000, true), AxisFilter::Invert]);

        assert!("=x1".parse::<AxisMappingSpec>().is_err());
        assert!(matches!(
            "a^wobble=b".parse::<ButtonMappingSpec>(),
            Err(ModifierError::Filter(FilterError::Unknown { .. }))
        ));
    }

    #[test]
    fn test_parse_mapping_list_skips_empty_entries() {
        let list: Vec<ButtonMappingSpec> = parse_mapping_list("a=b, b=a,").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].to_string(), "b=a");
    }

    #[test]
    fn test_unknown_name_fails_at_compile() {
        let (desc, _) = gamepad_descriptor();
        let specs: Vec<ButtonMappingSpec> = parse_mapping_list("a=nosuchbutton").unwrap();
        assert!(matches!(
            ButtonmapModifier::from_specs(&specs, &desc),
            Err(ModifierError::Descriptor(_))
        ));
    }

    #[test]
    fn test_buttonmap_swaps_buttons() {
        let (desc, names) = gamepad_descriptor();
        let specs = parse_mapping_list("a=b,b=a").unwrap();
        let mut modifier = ButtonmapModifier::from_specs(&specs, &desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.a, true);
        modifier.update(10, &mut msg, &desc);
        assert!(!msg.key(names.a));
        assert!(msg.key(names.b));
    }

    #[test]
    fn test_buttonmap_combines_sources_with_or() {
        let (desc, names) = gamepad_descriptor();
        let specs = parse_mapping_list("a=x,b=x").unwrap();
        let mut modifier = ButtonmapModifier::from_specs(&specs, &desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_key(names.b, true);
        modifier.update(10, &mut msg, &desc);
        assert!(msg.key(names.x));
        assert!(!msg.key(names.a));
        assert!(!msg.key(names.b));
    }

    #[test]
    fn test_axismap_invert_flips_sign() {
        let (desc, names) = gamepad_descriptor();
        let specs = parse_mapping_list("-x1=x1").unwrap();
        let mut modifier = AxismapModifier::from_specs(&specs, &desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 16000);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), -16000);
    }

    #[test]
    fn test_axismap_moves_axis() {
        let (desc, names) = gamepad_descriptor();
        let specs = parse_mapping_list("x1=x2").unwrap();
        let mut modifier = AxismapModifier::from_specs(&specs, &desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 32767);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 0);
        assert_eq!(msg.abs(names.x2), 32767);
    }

    #[test]
    fn test_axismap_sum_is_clamped() {
        let (desc, names) = gamepad_descriptor();
        let specs = parse_mapping_list("x1=x2").unwrap();
        let mut modifier = AxismapModifier::from_specs(&specs, &desc).unwrap();

        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 32767);
        msg.set_abs(names.x2, 32767);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x2), 32767);
    }

    #[test]
    fn test_filters_apply_in_declared_order() {
        let (desc, names) = gamepad_descriptor();
        // deadzone first swallows the value; invert afterwards keeps it at 0
        let specs = parse_mapping_list("x1^dead:4000:4000:0^inv").unwrap();
        let mut modifier = AxismapModifier::from_specs(&specs, &desc).unwrap();
        let mut msg = ControllerMessage::new(&desc);
        msg.set_abs(names.x1, 3000);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), 0);

        msg.set_abs(names.x1, 16000);
        modifier.update(10, &mut msg, &desc);
        assert_eq!(msg.abs(names.x1), -16000);
    }

    #[test]
    fn test_add_filter_extends_identity_mapping() {
        let (desc, names) = gamepad_descriptor();
        let mut modifier = ButtonmapModifier::new();
        modifier.add_filter(names.a, ButtonFilter::Invert);
        modifier.add_filter(names.a, ButtonFilter::Invert);
        assert_eq!(modifier.describe(&desc), "buttonmap:a^invert^invert=a");
    }
}
