//! Control state: which camera to face, how far to zoom, and the
//! device-reported bounds that cap the zoom.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lowest zoom level the control will ever request.
pub const MIN_ZOOM: u32 = 1;

/// Which physical camera is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Outward-facing camera
    #[default]
    Environment,
    /// Inward-facing camera
    User,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }

    /// Guess the facing mode from a device label such as "Back Camera" or
    /// "FaceTime HD Camera". Returns `None` when the label says nothing.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        const ENVIRONMENT_HINTS: &[&str] = &["back", "rear", "environment", "world"];
        const USER_HINTS: &[&str] = &["front", "user", "facetime", "integrated", "selfie"];

        if ENVIRONMENT_HINTS.iter().any(|hint| label.contains(hint)) {
            Some(FacingMode::Environment)
        } else if USER_HINTS.iter().any(|hint| label.contains(hint)) {
            Some(FacingMode::User)
        } else {
            None
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "environment" => Ok(FacingMode::Environment),
            "user" => Ok(FacingMode::User),
            _ => Err(ConfigError::InvalidValue {
                key: "facing_mode",
                value: s.to_string(),
            }),
        }
    }
}

/// How `zoom_in` treats the discovered zoom bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomPolicy {
    /// Never report a zoom level above the device's maximum.
    #[default]
    Clamped,
    /// Increment unconditionally and let the hardware clamp what it applies.
    /// The reported level can then drift above the effective one.
    Unbounded,
}

impl FromStr for ZoomPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamped" => Ok(ZoomPolicy::Clamped),
            "unbounded" => Ok(ZoomPolicy::Unbounded),
            _ => Err(ConfigError::InvalidValue {
                key: "zoom_policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Device-reported limits, recomputed from every newly acquired stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityBounds {
    pub max_zoom: f64,
}

impl Default for CapabilityBounds {
    fn default() -> Self {
        CapabilityBounds { max_zoom: 1.0 }
    }
}

impl CapabilityBounds {
    /// Bounds from a reported zoom maximum, ignoring nonsense values.
    pub fn from_max_zoom(max_zoom: f64) -> Option<Self> {
        (max_zoom.is_finite() && max_zoom > 0.0).then_some(CapabilityBounds { max_zoom })
    }

    /// Highest integer zoom level that fits under the bound.
    pub fn zoom_ceiling(&self) -> u32 {
        // Saturating float-to-int cast; the bound is positive and finite.
        (self.max_zoom.floor() as u32).max(MIN_ZOOM)
    }
}

/// The values that parameterize the next stream acquisition.
///
/// There is no setter: the only ways in are the mutators below, each of
/// which reports whether anything actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    facing_mode: FacingMode,
    zoom_level: u32,
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState::new(FacingMode::default())
    }
}

impl ControlState {
    pub fn new(facing_mode: FacingMode) -> Self {
        ControlState {
            facing_mode,
            zoom_level: MIN_ZOOM,
        }
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn zoom_level(&self) -> u32 {
        self.zoom_level
    }

    /// Step the zoom up by one.
    pub fn zoom_in(&mut self, bounds: &CapabilityBounds, policy: ZoomPolicy) -> bool {
        let next = self.zoom_level.saturating_add(1);
        if next == self.zoom_level {
            return false;
        }
        if policy == ZoomPolicy::Clamped && f64::from(next) > bounds.max_zoom {
            return false;
        }
        self.zoom_level = next;
        true
    }

    /// Step the zoom down by one, never below [`MIN_ZOOM`].
    pub fn zoom_out(&mut self) -> bool {
        if self.zoom_level > MIN_ZOOM {
            self.zoom_level -= 1;
            true
        } else {
            false
        }
    }

    pub fn switch_facing_mode(&mut self) -> bool {
        self.facing_mode = self.facing_mode.toggled();
        true
    }

    /// Pull the zoom level back under a freshly discovered bound.
    pub fn clamp_to(&mut self, bounds: &CapabilityBounds, policy: ZoomPolicy) -> bool {
        if policy == ZoomPolicy::Unbounded {
            return false;
        }
        let ceiling = bounds.zoom_ceiling();
        if self.zoom_level > ceiling {
            self.zoom_level = ceiling;
            true
        } else {
            false
        }
    }
}
