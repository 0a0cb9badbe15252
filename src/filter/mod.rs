//! Scalar filters used inside axis and button mappings
//!
//! Filters are written as `name[:arg[:arg...]]` and chained with `^` in
//! mapping strings, e.g. `x1^deadzone:4000^invert`.

pub mod axis;
pub mod button;

use std::str::FromStr;

use thiserror::Error;

pub use axis::AxisFilter;
pub use button::ButtonFilter;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("unknown {kind} filter '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("{filter}: too many arguments (expected at most {max})")]
    TooManyArguments { filter: String, max: usize },

    #[error("{filter}: missing argument '{arg}'")]
    MissingArgument { filter: String, arg: &'static str },

    #[error("{filter}: invalid argument '{value}'")]
    InvalidArgument { filter: String, value: String },
}

/// Split `name:arg:arg` into the name and its arguments
pub(crate) fn split_filter(spec: &str) -> (&str, Vec<&str>) {
    match spec.split_once(':') {
        Some((name, rest)) => (name, rest.split(':').collect()),
        None => (spec, Vec::new()),
    }
}

/// Parse one positional argument, reporting the filter name on failure
pub(crate) fn parse_arg<T: FromStr>(filter: &str, value: &str) -> Result<T, FilterError> {
    value.trim().parse().map_err(|_| FilterError::InvalidArgument {
        filter: filter.to_string(),
        value: value.to_string(),
    })
}

/// Parse a boolean written as `1/0`, `true/false`, `yes/no` or `on/off`
pub(crate) fn parse_bool(filter: &str, value: &str) -> Result<bool, FilterError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FilterError::InvalidArgument {
            filter: filter.to_string(),
            value: value.to_string(),
        }),
    }
}

pub(crate) fn check_arity(filter: &str, args: &[&str], max: usize) -> Result<(), FilterError> {
    if args.len() > max {
        return Err(FilterError::TooManyArguments {
            filter: filter.to_string(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filter() {
        assert_eq!(split_filter("invert"), ("invert", vec![]));
        assert_eq!(split_filter("dead:4000:2000"), ("dead", vec!["4000", "2000"]));
        assert_eq!(split_filter("log:"), ("log", vec![""]));
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("x", "1"), Ok(true));
        assert_eq!(parse_bool("x", "Off"), Ok(false));
        assert!(parse_bool("x", "maybe").is_err());
    }
}
