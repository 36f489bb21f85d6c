//! Constraint requests sent to the platform on every acquisition attempt.
//!
//! The serialized form mirrors the platform's media constraint dictionary
//! (`facingMode`, `width: { ideal }`, `advanced: [{ zoom }]`), so a request
//! can be handed to a script-side backend unchanged.

use serde::{Deserialize, Serialize};

use crate::state::{ControlState, FacingMode};

/// Width hint used when the caller gives none.
pub const DEFAULT_WIDTH: u32 = 500;
/// Height hint used when the caller gives none.
pub const DEFAULT_HEIGHT: u32 = 500;

/// A numeric constraint with optional ideal/exact/min/max members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstrainRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl ConstrainRange {
    pub fn ideal(value: u32) -> Self {
        ConstrainRange {
            ideal: Some(value),
            ..Default::default()
        }
    }

    /// The single value a backend should aim for.
    pub fn target(&self) -> Option<u32> {
        self.exact.or(self.ideal).or(self.max).or(self.min)
    }
}

/// One entry of the `advanced` constraint list.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvancedConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<FacingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<ConstrainRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<ConstrainRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced: Vec<AdvancedConstraint>,
}

impl VideoConstraints {
    /// The zoom the request asks for; later `advanced` entries win.
    pub fn zoom(&self) -> Option<f64> {
        self.advanced.iter().rev().find_map(|entry| entry.zoom)
    }
}

/// Everything sent to the platform for one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstraintRequest {
    pub video: VideoConstraints,
    #[serde(default)]
    pub audio: bool,
}

impl ConstraintRequest {
    /// Compose the request for the current control state.
    ///
    /// Without an override the request names the facing mode, ideal
    /// dimensions (zero or unset falls back to 500x500) and the zoom level.
    /// With an override, its constraints are taken as-is and only the zoom
    /// is appended.
    pub fn build(
        state: &ControlState,
        width: Option<u32>,
        height: Option<u32>,
        video_override: Option<&ConstraintRequest>,
    ) -> Self {
        let mut request = match video_override {
            Some(full) => full.clone(),
            None => ConstraintRequest {
                video: VideoConstraints {
                    facing_mode: Some(state.facing_mode()),
                    width: Some(ConstrainRange::ideal(
                        width.filter(|w| *w > 0).unwrap_or(DEFAULT_WIDTH),
                    )),
                    height: Some(ConstrainRange::ideal(
                        height.filter(|h| *h > 0).unwrap_or(DEFAULT_HEIGHT),
                    )),
                    ..Default::default()
                },
                audio: false,
            },
        };

        if state.zoom_level() > 0 {
            request.video.advanced.push(AdvancedConstraint {
                zoom: Some(f64::from(state.zoom_level())),
            });
        }
        request
    }
}

/// Pick the device a request refers to from a list of device labels.
///
/// An explicit `device_id` matches either a label or a list position.
/// Otherwise the first label that hints at the requested facing mode wins,
/// falling back to the first device.
pub fn pick_device(labels: &[String], video: &VideoConstraints) -> Option<usize> {
    if labels.is_empty() {
        return None;
    }

    if let Some(device_id) = video.device_id.as_deref() {
        return labels
            .iter()
            .position(|label| label == device_id)
            .or_else(|| device_id.parse::<usize>().ok().filter(|i| *i < labels.len()));
    }

    let by_facing = video.facing_mode.and_then(|wanted| {
        labels
            .iter()
            .position(|label| FacingMode::from_label(label) == Some(wanted))
    });
    Some(by_facing.unwrap_or(0))
}
