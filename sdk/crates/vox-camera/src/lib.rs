//! Camera control for Vox clients.
//!
//! Mount a [`Camera`] over a [`MediaDevices`] backend and drive it through
//! the returned [`CameraHandle`]: switch between front and rear cameras,
//! step the zoom within what the device reports, and take JPEG snapshots.
//! Every command re-negotiates the stream in the background. Superseded and
//! late-arriving streams are released, and only the newest one is ever
//! attached to the view.
//!
//! With the `native` feature, [`NokhwaDevices`] opens the machine's real
//! cameras. The `python` feature exposes the control as `vox_camera.VoxCamera`.

mod camera;
mod capture;
mod config;
mod constraints;
mod error;
mod manager;
mod platform;
mod state;
mod video;

#[cfg(feature = "native")]
mod native;
#[cfg(feature = "python")]
mod python;
#[cfg(test)]
mod testing;

pub use camera::{Camera, CameraHandle};
pub use capture::{draw_current_frame, encode_to_data_uri, snapshot, Raster, JPEG_MIME};
pub use config::{
    CameraConfig, CameraProps, ConfigOverrides, OnUserMediaError, ENV_FACING_MODE, ENV_HEIGHT,
    ENV_VIDEO_CONSTRAINTS, ENV_WIDTH, ENV_ZOOM_POLICY,
};
pub use constraints::{
    pick_device, AdvancedConstraint, ConstrainRange, ConstraintRequest, VideoConstraints,
    DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
pub use error::{AcquisitionError, CaptureError, ConfigError};
pub use manager::{Cycle, StreamLease, StreamManager};
pub use platform::{
    AcquireFuture, MediaDevices, MediaStream, MediaTrack, TrackCapabilities, TrackKind, VideoSink,
    ZoomRange,
};
pub use state::{CapabilityBounds, ControlState, FacingMode, ZoomPolicy, MIN_ZOOM};
pub use video::{VideoElement, VideoFrame};

#[cfg(feature = "native")]
pub use native::NokhwaDevices;

/// Install a `tracing` fmt subscriber. Does nothing if one is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}
