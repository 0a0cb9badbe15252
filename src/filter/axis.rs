//! Axis filters
//!
//! Each filter maps one absolute value in `[min, max]` to another value in
//! the same range. Time-dependent filters advance in [`AxisFilter::update`],
//! which mappings call once per tick before [`AxisFilter::filter`].

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::{check_arity, parse_arg, parse_bool, split_filter, FilterError};
use crate::message::{from_float, to_float, to_float_no_range_check};

/// Default speed of the `relative` filter
pub const DEFAULT_RELATIVE_SPEED: i32 = 20000;

#[derive(Debug, Clone, PartialEq)]
pub enum AxisFilter {
    /// Mirror the value around the center of the range
    Invert,
    /// Response curve `(1 - (1 - |x|)^t)^(1/t)` with `t = 2^sensitivity`
    Sensitivity { sensitivity: f32 },
    /// Piecewise-linear remap of a measured `min:center:max`
    Calibration { min: i32, center: i32, max: i32 },
    Deadzone {
        min_deadzone: i32,
        max_deadzone: i32,
        smooth: bool,
    },
    /// Integrate the input into a persistent position
    Relative {
        speed: i32,
        float_speed: f32,
        value: f32,
        state: f32,
    },
    /// Linear interpolation between equally spaced samples
    ResponseCurve { samples: Vec<i32> },
    Const { value: i32 },
    Lowpass { rate: f32, prev: f32, value: f32 },
    Log { name: String },
}

impl AxisFilter {
    pub fn deadzone(deadzone: i32, smooth: bool) -> Self {
        AxisFilter::Deadzone {
            min_deadzone: -deadzone,
            max_deadzone: deadzone,
            smooth,
        }
    }

    pub fn relative(speed: i32) -> Self {
        AxisFilter::Relative {
            speed,
            float_speed: 0.0,
            value: 0.0,
            state: 0.0,
        }
    }

    /// Advance the filter clock by `dt_ms` milliseconds
    pub fn update(&mut self, dt_ms: u32) {
        let dt = dt_ms as f32 / 1000.0;
        match self {
            AxisFilter::Relative {
                float_speed,
                value,
                state,
                ..
            } => {
                *state = (*state + *float_speed * *value * dt).clamp(-1.0, 1.0);
            }
            AxisFilter::Lowpass { rate, prev, value } => {
                let step = (*rate * dt).min(1.0);
                *prev += step * (*value - *prev);
            }
            _ => {}
        }
    }

    /// Filter one value in `[min, max]`
    pub fn filter(&mut self, value: i32, min: i32, max: i32) -> i32 {
        match self {
            AxisFilter::Invert => invert(value, min, max),

            AxisFilter::Sensitivity { sensitivity } => {
                let pos = to_float(value, min, max);
                let t = 2f32.powf(*sensitivity);
                let curved = (1.0 - (1.0 - pos.abs()).powf(t)).powf(1.0 / t);
                from_float(curved.copysign(pos), min, max)
            }

            AxisFilter::Calibration {
                min: cal_min,
                center,
                max: cal_max,
            } => {
                let (v, c) = (value as i64, *center as i64);
                let scaled = if v < c && c != *cal_min as i64 {
                    -(min as i64) * (v - c) / (c - *cal_min as i64)
                } else if v > c && c != *cal_max as i64 {
                    max as i64 * (v - c) / (*cal_max as i64 - c)
                } else {
                    0
                };
                scaled.clamp(min as i64, max as i64) as i32
            }

            AxisFilter::Deadzone {
                min_deadzone,
                max_deadzone,
                smooth,
            } => deadzone(value, min, max, *min_deadzone, *max_deadzone, *smooth),

            AxisFilter::Relative {
                speed,
                float_speed,
                value: last,
                state,
            } => {
                *last = to_float(value, min, max);
                *float_speed = to_float_no_range_check(*speed, min, max);
                from_float(*state, min, max)
            }

            AxisFilter::ResponseCurve { samples } => response_curve(samples, value, min, max),

            AxisFilter::Const { value: constant } => *constant,

            AxisFilter::Lowpass { prev, value: last, .. } => {
                *last = to_float(value, min, max);
                from_float(*prev, min, max)
            }

            AxisFilter::Log { name } => {
                if name.is_empty() {
                    info!(value, "axis");
                } else {
                    info!(name = %name, value, "axis");
                }
                value
            }
        }
    }
}

fn invert(value: i32, min: i32, max: i32) -> i32 {
    let (v, min, max) = (value as i64, min as i64, max as i64);
    let center = (max + min + 1) / 2;
    let out = if v < center && min != center {
        (max - center) * (v - center) / (min - center) + center
    } else if v > center && max != center {
        (min - center) * (v - center) / (max - center) + center
    } else {
        v
    };
    out as i32
}

fn deadzone(value: i32, min: i32, max: i32, min_dz: i32, max_dz: i32, smooth: bool) -> i32 {
    let outside = value < min_dz || value > max_dz;
    if !smooth {
        return if outside { value } else { 0 };
    }

    let (v, min, max, min_dz, max_dz) =
        (value as i64, min as i64, max as i64, min_dz as i64, max_dz as i64);
    let out = if v < min_dz && min != min_dz {
        min * (v - min_dz) / (min - min_dz)
    } else if v > max_dz && max != max_dz {
        max * (v - max_dz) / (max - max_dz)
    } else {
        0
    };
    out as i32
}

fn response_curve(samples: &[i32], value: i32, min: i32, max: i32) -> i32 {
    match samples.len() {
        0 => value,
        1 => samples[0],
        n => {
            let bucket_count = n - 1;
            let bucket_size = (max as f32 - min as f32) / bucket_count as f32;
            let offset = (value as f32 - min as f32).max(0.0);
            let bucket = ((offset / bucket_size) as usize).min(bucket_count - 1);
            let t = (offset - bucket as f32 * bucket_size) / bucket_size;
            ((1.0 - t) * samples[bucket] as f32 + t * samples[bucket + 1] as f32) as i32
        }
    }
}

impl FromStr for AxisFilter {
    type Err = FilterError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_filter(spec.trim());
        match name.to_ascii_lowercase().as_str() {
            "invert" | "inv" => {
                check_arity(name, &args, 0)?;
                Ok(AxisFilter::Invert)
            }
            "sensitivity" | "sen" => {
                check_arity(name, &args, 1)?;
                let sensitivity = match args.first() {
                    Some(s) => parse_arg(name, s)?,
                    None => 0.0,
                };
                Ok(AxisFilter::Sensitivity { sensitivity })
            }
            "calibration" | "cal" => {
                check_arity(name, &args, 3)?;
                let mut values = [0i32; 3];
                for (slot, arg) in values.iter_mut().zip(args.iter()) {
                    *slot = parse_arg(name, arg)?;
                }
                Ok(AxisFilter::Calibration {
                    min: values[0],
                    center: values[1],
                    max: values[2],
                })
            }
            "deadzone" | "dead" => {
                check_arity(name, &args, 3)?;
                let mut filter = AxisFilter::deadzone(0, true);
                if let AxisFilter::Deadzone {
                    min_deadzone,
                    max_deadzone,
                    smooth,
                } = &mut filter
                {
                    if let Some(dz) = args.first() {
                        let dz: i32 = parse_arg(name, dz)?;
                        *min_deadzone = -dz;
                        *max_deadzone = dz;
                    }
                    if let Some(max) = args.get(1) {
                        *max_deadzone = parse_arg(name, max)?;
                    }
                    if let Some(s) = args.get(2) {
                        *smooth = parse_bool(name, s)?;
                    }
                }
                Ok(filter)
            }
            "relative" | "rel" => {
                check_arity(name, &args, 1)?;
                let speed = match args.first() {
                    Some(s) => parse_arg(name, s)?,
                    None => DEFAULT_RELATIVE_SPEED,
                };
                Ok(AxisFilter::relative(speed))
            }
            "responsecurve" | "response" | "resp" => {
                let samples = args
                    .iter()
                    .map(|s| parse_arg(name, s))
                    .collect::<Result<Vec<i32>, _>>()?;
                Ok(AxisFilter::ResponseCurve { samples })
            }
            "const" => {
                check_arity(name, &args, 1)?;
                let value = args.first().ok_or(FilterError::MissingArgument {
                    filter: name.to_string(),
                    arg: "value",
                })?;
                Ok(AxisFilter::Const {
                    value: parse_arg(name, value)?,
                })
            }
            "lowpass" => {
                check_arity(name, &args, 1)?;
                let rate = args.first().ok_or(FilterError::MissingArgument {
                    filter: name.to_string(),
                    arg: "rate",
                })?;
                Ok(AxisFilter::Lowpass {
                    rate: parse_arg(name, rate)?,
                    prev: 0.0,
                    value: 0.0,
                })
            }
            "log" => Ok(AxisFilter::Log {
                name: args.join(":"),
            }),
            _ => Err(FilterError::Unknown {
                kind: "axis",
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for AxisFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisFilter::Invert => write!(f, "invert"),
            AxisFilter::Sensitivity { sensitivity } => write!(f, "sensitivity:{}", sensitivity),
            AxisFilter::Calibration { min, center, max } => {
                write!(f, "calibration:{}:{}:{}", min, center, max)
            }
            AxisFilter::Deadzone {
                min_deadzone,
                max_deadzone,
                smooth,
            } => write!(
                f,
                "deadzone:{}:{}:{}",
                -min_deadzone,
                max_deadzone,
                u8::from(*smooth)
            ),
            AxisFilter::Relative { speed, .. } => write!(f, "relative:{}", speed),
            AxisFilter::ResponseCurve { samples } => {
                write!(f, "responsecurve")?;
                for sample in samples {
                    write!(f, ":{}", sample)?;
                }
                Ok(())
            }
            AxisFilter::Const { value } => write!(f, "const:{}", value),
            AxisFilter::Lowpass { rate, .. } => write!(f, "lowpass:{}", rate),
            AxisFilter::Log { name } => write!(f, "log:{}", name),
        }
    }
}
