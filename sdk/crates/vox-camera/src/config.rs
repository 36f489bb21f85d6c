//! Camera configuration: the serializable settings and the live props a
//! mounted camera reacts to.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintRequest;
use crate::error::{AcquisitionError, ConfigError};
use crate::state::{FacingMode, ZoomPolicy};

/// Callback invoked once per failed acquisition attempt.
pub type OnUserMediaError = Arc<dyn Fn(&AcquisitionError) + Send + Sync>;

pub const ENV_WIDTH: &str = "VOX_CAMERA_WIDTH";
pub const ENV_HEIGHT: &str = "VOX_CAMERA_HEIGHT";
pub const ENV_FACING_MODE: &str = "VOX_CAMERA_FACING_MODE";
pub const ENV_ZOOM_POLICY: &str = "VOX_CAMERA_ZOOM_POLICY";
/// Full constraint override, as a JSON constraint dictionary.
pub const ENV_VIDEO_CONSTRAINTS: &str = "VOX_CAMERA_VIDEO_CONSTRAINTS";

/// Serializable camera settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Ideal capture width in pixels (500 when unset)
    pub width: Option<u32>,
    /// Ideal capture height in pixels (500 when unset)
    pub height: Option<u32>,
    /// Camera to start with
    pub facing_mode: FacingMode,
    pub zoom_policy: ZoomPolicy,
    /// Full constraint override; bypasses the built request except for zoom
    pub video_constraints: Option<ConstraintRequest>,
}

impl CameraConfig {
    /// Read settings from `VOX_CAMERA_*` environment variables. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CameraConfig::from_env`], reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CameraConfig::default();

        if let Some(value) = lookup(ENV_WIDTH) {
            config.width = Some(parse_dimension(ENV_WIDTH, &value)?);
        }
        if let Some(value) = lookup(ENV_HEIGHT) {
            config.height = Some(parse_dimension(ENV_HEIGHT, &value)?);
        }
        if let Some(value) = lookup(ENV_FACING_MODE) {
            config.facing_mode = parse_option(ENV_FACING_MODE, &value)?;
        }
        if let Some(value) = lookup(ENV_ZOOM_POLICY) {
            config.zoom_policy = parse_option(ENV_ZOOM_POLICY, &value)?;
        }
        if let Some(value) = lookup(ENV_VIDEO_CONSTRAINTS) {
            config.video_constraints = Some(parse_constraints(ENV_VIDEO_CONSTRAINTS, &value)?);
        }
        Ok(config)
    }

    /// Layer explicitly given settings over `self`.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(width) = overrides.width {
            self.width = Some(width);
        }
        if let Some(height) = overrides.height {
            self.height = Some(height);
        }
        if let Some(value) = overrides.facing_mode {
            self.facing_mode = parse_option("facing_mode", &value)?;
        }
        if let Some(value) = overrides.zoom_policy {
            self.zoom_policy = parse_option("zoom_policy", &value)?;
        }
        if let Some(value) = overrides.video_constraints {
            self.video_constraints = Some(parse_constraints("video_constraints", &value)?);
        }
        Ok(self)
    }

    pub fn into_props(self) -> CameraProps {
        CameraProps {
            width: self.width,
            height: self.height,
            facing_mode: self.facing_mode,
            zoom_policy: self.zoom_policy,
            video_constraints: self.video_constraints.map(Arc::new),
            on_user_media_error: None,
        }
    }
}

/// Settings a caller passes explicitly, as raw strings where they need
/// parsing. `None` keeps the underlying value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub facing_mode: Option<String>,
    pub zoom_policy: Option<String>,
    /// JSON constraint dictionary
    pub video_constraints: Option<String>,
}

fn parse_option<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_constraints(key: &'static str, json: &str) -> Result<ConstraintRequest, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::InvalidConstraints {
        key,
        reason: e.to_string(),
    })
}

fn parse_dimension(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// Props of a mounted camera.
///
/// The override and the error callback are compared by identity: handing
/// in a new `Arc` re-negotiates the stream even if its contents are equal.
#[derive(Clone, Default)]
pub struct CameraProps {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub facing_mode: FacingMode,
    pub zoom_policy: ZoomPolicy,
    pub video_constraints: Option<Arc<ConstraintRequest>>,
    pub on_user_media_error: Option<OnUserMediaError>,
}

impl CameraProps {
    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AcquisitionError) + Send + Sync + 'static,
    {
        self.on_user_media_error = Some(Arc::new(callback));
        self
    }

    pub fn with_video_constraints(mut self, constraints: ConstraintRequest) -> Self {
        self.video_constraints = Some(Arc::new(constraints));
        self
    }

    /// Whether switching from `self` to `other` leaves the acquisition
    /// inputs unchanged. The zoom policy only affects commands, not
    /// acquisition.
    pub fn same_inputs(&self, other: &CameraProps) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.facing_mode == other.facing_mode
            && same_arc(&self.video_constraints, &other.video_constraints)
            && same_arc(&self.on_user_media_error, &other.on_user_media_error)
    }
}

fn same_arc<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Debug for CameraProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraProps")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("facing_mode", &self.facing_mode)
            .field("zoom_policy", &self.zoom_policy)
            .field("video_constraints", &self.video_constraints)
            .field("on_user_media_error", &self.on_user_media_error.is_some())
            .finish()
    }
}
