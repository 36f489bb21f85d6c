//! Video frames and the video element that displays the attached stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bytes::Bytes;

use crate::platform::{MediaStream, VideoSink};

/// Bytes per packed RGB pixel.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// A decoded frame, packed RGB8, row-major, at native resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        VideoFrame {
            width,
            height,
            data,
        }
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(pixels * RGB_BYTES_PER_PIXEL)
            .collect();
        VideoFrame::new(width, height, Bytes::from(data))
    }

    /// Whether `data` holds exactly `width * height` pixels.
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL
    }
}

/// The in-process video element: renders whatever stream is attached
/// until it is unmounted.
#[derive(Default)]
pub struct VideoElement {
    unmounted: AtomicBool,
    source: Mutex<Option<Weak<dyn MediaStream>>>,
}

impl VideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the element off screen. It stops accepting streams and drops
    /// its reference to the current one.
    pub fn unmount(&self) {
        self.unmounted.store(true, Ordering::SeqCst);
        self.lock_source().take();
    }

    /// Id of the stream last attached, while that stream still exists.
    pub fn attached_stream_id(&self) -> Option<String> {
        self.attached().map(|stream| stream.id().to_string())
    }

    fn attached(&self) -> Option<Arc<dyn MediaStream>> {
        self.lock_source().as_ref().and_then(Weak::upgrade)
    }

    fn lock_source(&self) -> std::sync::MutexGuard<'_, Option<Weak<dyn MediaStream>>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoSink for VideoElement {
    fn attach(&self, stream: Weak<dyn MediaStream>) {
        if self.is_live() {
            *self.lock_source() = Some(stream);
        }
    }

    fn is_live(&self) -> bool {
        !self.unmounted.load(Ordering::SeqCst)
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        // A stopped stream shows nothing.
        self.attached()
            .filter(|stream| stream.is_active())
            .and_then(|stream| stream.latest_frame())
    }
}
