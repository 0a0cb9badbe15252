//! Button filters

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::{check_arity, parse_arg, parse_bool, split_filter, FilterError};

pub const DEFAULT_AUTOFIRE_RATE: u32 = 50;
pub const DEFAULT_AUTOFIRE_DELAY: u32 = 0;

/// Which edge a click filter reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Press,
    Release,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ButtonFilter {
    /// Flip a sticky state on every rising edge
    Toggle { state: bool, last: bool },
    Invert,
    Const { value: bool },
    /// Pulse while held, after an optional delay
    Autofire {
        rate: u32,
        delay: u32,
        held: bool,
        engaged: bool,
        counter: u32,
    },
    /// True for one tick on the selected edge
    Click { mode: ClickMode, last: bool },
    /// True only once held for `delay` milliseconds
    Delay { delay: u32, held_for: u32 },
    Log { name: String },
}

impl ButtonFilter {
    pub fn toggle() -> Self {
        ButtonFilter::Toggle {
            state: false,
            last: false,
        }
    }

    pub fn autofire(rate: u32, delay: u32) -> Self {
        ButtonFilter::Autofire {
            rate,
            delay,
            held: false,
            engaged: false,
            counter: 0,
        }
    }

    pub fn click(mode: ClickMode) -> Self {
        ButtonFilter::Click { mode, last: false }
    }

    pub fn delay(delay: u32) -> Self {
        ButtonFilter::Delay { delay, held_for: 0 }
    }

    /// Advance the filter clock by `dt_ms` milliseconds
    pub fn update(&mut self, dt_ms: u32) {
        match self {
            ButtonFilter::Autofire {
                delay,
                held,
                engaged,
                counter,
                ..
            } => {
                if *held {
                    *counter = counter.saturating_add(dt_ms);
                    if *counter > *delay {
                        *engaged = true;
                    }
                }
            }
            ButtonFilter::Delay { held_for, .. } => {
                *held_for = held_for.saturating_add(dt_ms);
            }
            _ => {}
        }
    }

    pub fn filter(&mut self, value: bool) -> bool {
        match self {
            ButtonFilter::Toggle { state, last } => {
                if value && !*last {
                    *state = !*state;
                }
                *last = value;
                *state
            }

            ButtonFilter::Invert => !value,

            ButtonFilter::Const { value: constant } => *constant,

            ButtonFilter::Autofire {
                rate,
                held,
                engaged,
                counter,
                ..
            } => {
                *held = value;
                if !value {
                    *counter = 0;
                    *engaged = false;
                    false
                } else if *engaged {
                    if *counter > *rate {
                        *counter = 0;
                        true
                    } else {
                        false
                    }
                } else {
                    true
                }
            }

            ButtonFilter::Click { mode, last } => {
                if *last == value {
                    return false;
                }
                *last = value;
                match mode {
                    ClickMode::Press => value,
                    ClickMode::Release => !value,
                    ClickMode::Both => true,
                }
            }

            ButtonFilter::Delay { delay, held_for } => {
                if value {
                    *held_for >= *delay
                } else {
                    *held_for = 0;
                    false
                }
            }

            ButtonFilter::Log { name } => {
                if name.is_empty() {
                    info!(value, "button");
                } else {
                    info!(name = %name, value, "button");
                }
                value
            }
        }
    }
}

impl FromStr for ButtonFilter {
    type Err = FilterError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_filter(spec.trim());
        match name.to_ascii_lowercase().as_str() {
            "toggle" | "tog" => {
                check_arity(name, &args, 0)?;
                Ok(ButtonFilter::toggle())
            }
            "invert" | "inv" => {
                check_arity(name, &args, 0)?;
                Ok(ButtonFilter::Invert)
            }
            "const" => {
                check_arity(name, &args, 1)?;
                let value = args.first().ok_or(FilterError::MissingArgument {
                    filter: name.to_string(),
                    arg: "value",
                })?;
                Ok(ButtonFilter::Const {
                    value: parse_bool(name, value)?,
                })
            }
            "autofire" | "auto" => {
                check_arity(name, &args, 2)?;
                let rate = match args.first() {
                    Some(s) => parse_arg(name, s)?,
                    None => DEFAULT_AUTOFIRE_RATE,
                };
                let delay = match args.get(1) {
                    Some(s) => parse_arg(name, s)?,
                    None => DEFAULT_AUTOFIRE_DELAY,
                };
                Ok(ButtonFilter::autofire(rate, delay))
            }
            "click-press" => Ok(ButtonFilter::click(ClickMode::Press)),
            "click-release" => Ok(ButtonFilter::click(ClickMode::Release)),
            "click-both" | "click" => Ok(ButtonFilter::click(ClickMode::Both)),
            "delay" => {
                check_arity(name, &args, 1)?;
                let delay = args.first().ok_or(FilterError::MissingArgument {
                    filter: name.to_string(),
                    arg: "msec",
                })?;
                Ok(ButtonFilter::delay(parse_arg(name, delay)?))
            }
            "log" => Ok(ButtonFilter::Log {
                name: args.join(":"),
            }),
            _ => Err(FilterError::Unknown {
                kind: "button",
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for ButtonFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonFilter::Toggle { .. } => write!(f, "toggle"),
            ButtonFilter::Invert => write!(f, "invert"),
            ButtonFilter::Const { value } => write!(f, "const:{}", u8::from(*value)),
            ButtonFilter::Autofire { rate, delay, .. } => write!(f, "autofire:{}:{}", rate, delay),
            ButtonFilter::Click { mode, .. } => match mode {
                ClickMode::Press => write!(f, "click-press"),
                ClickMode::Release => write!(f, "click-release"),
                ClickMode::Both => write!(f, "click-both"),
            },
            ButtonFilter::Delay { delay, .. } => write!(f, "delay:{}", delay),
            ButtonFilter::Log { name } => write!(f, "log:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_toggle_flips_on_rising_edge_only() {
        let mut f = ButtonFilter::toggle();
        assert!(!f.filter(false));
        assert!(f.filter(true));
        assert!(f.filter(true));
        assert!(f.filter(false));
        assert!(!f.filter(true));
        assert!(!f.filter(false));
    }

    #[test]
    fn test_autofire_without_delay() {
        let mut f = ButtonFilter::autofire(50, 0);
        // first press goes straight through
        assert!(f.filter(true));
        f.update(10);
        assert!(!f.filter(true));
        f.update(30);
        assert!(!f.filter(true));
        f.update(20);
        assert!(f.filter(true));
        f.update(10);
        assert!(!f.filter(true));
        // release is immediate
        assert!(!f.filter(false));
    }

    #[test]
    fn test_autofire_waits_for_delay() {
        let mut f = ButtonFilter::autofire(20, 100);
        assert!(f.filter(true));
        f.update(60);
        assert!(f.filter(true));
        f.update(60);
        // engaged now, counter 120 > rate
        assert!(f.filter(true));
        f.update(10);
        assert!(!f.filter(true));
    }

    #[test]
    fn test_click_modes() {
        let mut press = ButtonFilter::click(ClickMode::Press);
        let mut release = ButtonFilter::click(ClickMode::Release);
        let mut both = ButtonFilter::click(ClickMode::Both);
        let input = [true, true, false, false, true];
        let p: Vec<bool> = input.iter().map(|&v| press.filter(v)).collect();
        let r: Vec<bool> = input.iter().map(|&v| release.filter(v)).collect();
        let b: Vec<bool> = input.iter().map(|&v| both.filter(v)).collect();
        assert_eq!(p, vec![true, false, false, false, true]);
        assert_eq!(r, vec![false, false, true, false, false]);
        assert_eq!(b, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_delay_requires_hold() {
        let mut f = ButtonFilter::delay(100);
        assert!(!f.filter(false));
        f.update(50);
        assert!(!f.filter(true));
        f.update(60);
        assert!(f.filter(true));
        assert!(!f.filter(false));
        f.update(20);
        assert!(!f.filter(true));
    }

    #[test]
    fn test_parse() {
        assert_eq!("tog".parse::<ButtonFilter>(), Ok(ButtonFilter::toggle()));
        assert_eq!("auto".parse::<ButtonFilter>(), Ok(ButtonFilter::autofire(50, 0)));
        assert_eq!("auto:10:200".parse::<ButtonFilter>(), Ok(ButtonFilter::autofire(10, 200)));
        assert_eq!("const:1".parse::<ButtonFilter>(), Ok(ButtonFilter::Const { value: true }));
        assert!("auto:1:2:3".parse::<ButtonFilter>().is_err());
        assert!("delay".parse::<ButtonFilter>().is_err());
        assert!(matches!(
            "wobble".parse::<ButtonFilter>(),
            Err(FilterError::Unknown { kind: "button", .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_toggle_changes_only_on_rising_edges(input in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut f = ButtonFilter::toggle();
            let mut last_in = false;
            let mut last_out = false;
            for v in input {
                let out = f.filter(v);
                if v && !last_in {
                    prop_assert_ne!(out, last_out);
                } else {
                    prop_assert_eq!(out, last_out);
                }
                last_in = v;
                last_out = out;
            }
        }
    }
}
