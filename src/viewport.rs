use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Rendering surface size applied to a page before navigation.
///
/// Config accepts either a table (`{ width = 600, height = 960 }`) or the
/// short `WIDTHxHEIGHT[@SCALE]` form (`"600x960@2"`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: default_scale_factor(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT or WIDTHxHEIGHT@SCALE (e.g., 600x960@2)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Invalid device scale factor: {0}")]
    InvalidScale(String),
    #[error("Width and height must be positive")]
    ZeroDimension,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, scale) = match s.split_once('@') {
            Some((size, scale)) => (size, Some(scale)),
            None => (s, None),
        };

        let (width, height) = size
            .split_once('x')
            .ok_or(ViewportParseError::InvalidFormat)?;
        if height.contains('x') {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(width.to_string()))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(height.to_string()))?;
        if width == 0 || height == 0 {
            return Err(ViewportParseError::ZeroDimension);
        }

        let device_scale_factor = match scale {
            Some(raw) => {
                let value: f64 = raw
                    .trim()
                    .trim_end_matches('x')
                    .parse()
                    .map_err(|_| ViewportParseError::InvalidScale(raw.to_string()))?;
                if !(value > 0.0 && value.is_finite()) {
                    return Err(ViewportParseError::InvalidScale(raw.to_string()));
                }
                value
            }
            None => default_scale_factor(),
        };

        Ok(Viewport {
            width,
            height,
            device_scale_factor,
        })
    }
}

impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Short(String),
            Table {
                width: u32,
                height: u32,
                #[serde(default = "default_scale_factor")]
                device_scale_factor: f64,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Short(raw) => raw.parse().map_err(serde::de::Error::custom),
            Repr::Table {
                width,
                height,
                device_scale_factor,
            } => Ok(Viewport {
                width,
                height,
                device_scale_factor,
            }),
        }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if (self.device_scale_factor - 1.0).abs() < f64::EPSILON {
            write!(f, "{}x{}", self.width, self.height)
        } else {
            write!(
                f,
                "{}x{}@{}",
                self.width, self.height, self.device_scale_factor
            )
        }
    }
}
