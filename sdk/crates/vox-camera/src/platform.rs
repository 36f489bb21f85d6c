//! Seams to the platform media stack: device acquisition, streams, tracks
//! and the video sink that renders them.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use crate::constraints::ConstraintRequest;
use crate::error::AcquisitionError;
use crate::video::VideoFrame;

/// Pending result of [`MediaDevices::request_stream`].
pub type AcquireFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn MediaStream>, AcquisitionError>> + Send>>;

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Zoom range reported by a video track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Controllable parameters a track reports. Missing entries mean the
/// device does not expose that control.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackCapabilities {
    pub zoom: Option<ZoomRange>,
}

/// One hardware media track. Stopping it releases the device.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> String;

    fn capabilities(&self) -> TrackCapabilities;

    /// Stop the track. Must be safe to call more than once.
    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// A handle to one or more tracks acquired together.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Most recent decoded video frame, if any has arrived yet.
    fn latest_frame(&self) -> Option<VideoFrame>;

    fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks()
            .into_iter()
            .filter(|track| track.kind() == TrackKind::Video)
            .collect()
    }

    /// A stream is active while any of its tracks is still running.
    fn is_active(&self) -> bool {
        self.tracks().iter().any(|track| !track.is_stopped())
    }
}

/// Platform service that turns a constraint request into a stream.
pub trait MediaDevices: Send + Sync {
    fn request_stream(&self, request: ConstraintRequest) -> AcquireFuture;
}

/// Where an acquired stream is rendered.
///
/// The sink never owns the stream; it holds a [`Weak`] reference for
/// rendering only.
pub trait VideoSink: Send + Sync {
    fn attach(&self, stream: Weak<dyn MediaStream>);

    /// Whether the consuming view still wants a stream.
    fn is_live(&self) -> bool;

    /// The frame currently on display.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Native dimensions of the displayed video, `(0, 0)` before the first
    /// frame.
    fn video_dimensions(&self) -> (u32, u32) {
        self.current_frame()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }
}
