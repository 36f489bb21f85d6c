//! Error types for camera acquisition, snapshot capture and configuration.

use thiserror::Error;

/// Why the platform refused to hand out a camera stream.
///
/// These are recoverable: the control stays mounted, and the next state
/// change retries acquisition with fresh constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// The user or platform denied camera access
    #[error("permission to use the camera was denied")]
    NotAllowed,

    /// No device matches the request
    #[error("no camera matches the request")]
    NotFound,

    /// A constraint could not be satisfied by any device
    #[error("constraint `{constraint}` cannot be satisfied")]
    Overconstrained { constraint: String },

    /// The device exists but could not be opened or read
    #[error("camera could not be read: {0}")]
    NotReadable(String),

    /// The request was dropped before the platform answered
    #[error("camera acquisition was aborted")]
    Aborted,

    /// Anything else the backend reports
    #[error("camera acquisition failed: {0}")]
    Other(String),
}

impl AcquisitionError {
    /// Platform-style error name, as reported to script callers.
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionError::NotAllowed => "NotAllowedError",
            AcquisitionError::NotFound => "NotFoundError",
            AcquisitionError::Overconstrained { .. } => "OverconstrainedError",
            AcquisitionError::NotReadable(_) => "NotReadableError",
            AcquisitionError::Aborted => "AbortError",
            AcquisitionError::Other(_) => "UnknownError",
        }
    }
}

/// Failure while turning the current frame into an encoded still.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("unsupported snapshot format: {0}")]
    UnsupportedMime(String),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] image::ImageError),
}

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid constraints for {key}: {reason}")]
    InvalidConstraints { key: &'static str, reason: String },
}
