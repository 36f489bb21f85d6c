//! Scripted devices, streams and tracks for lifecycle tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::constraints::ConstraintRequest;
use crate::error::AcquisitionError;
use crate::platform::{
    AcquireFuture, MediaDevices, MediaStream, MediaTrack, TrackCapabilities, TrackKind, ZoomRange,
};
use crate::state::FacingMode;
use crate::video::VideoFrame;

pub struct FakeTrack {
    kind: TrackKind,
    capabilities: TrackCapabilities,
    stops: AtomicUsize,
}

impl FakeTrack {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> String {
        "Fake Camera".to_string()
    }

    fn capabilities(&self) -> TrackCapabilities {
        self.capabilities
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop_count() > 0
    }
}

pub struct FakeStream {
    id: String,
    request: ConstraintRequest,
    tracks: Vec<Arc<FakeTrack>>,
    frame: Mutex<Option<VideoFrame>>,
}

impl FakeStream {
    pub const FRAME_COLOR: [u8; 3] = [200, 40, 120];

    pub fn new(
        id: &str,
        request: ConstraintRequest,
        zoom_max: Option<f64>,
        frame_size: (u32, u32),
    ) -> Arc<Self> {
        let video = Arc::new(FakeTrack {
            kind: TrackKind::Video,
            capabilities: TrackCapabilities {
                zoom: zoom_max.map(|max| ZoomRange {
                    min: 1.0,
                    max,
                    step: 1.0,
                }),
            },
            stops: AtomicUsize::new(0),
        });
        let mut tracks = vec![video];
        if request.audio {
            tracks.push(Arc::new(FakeTrack {
                kind: TrackKind::Audio,
                capabilities: TrackCapabilities::default(),
                stops: AtomicUsize::new(0),
            }));
        }
        Arc::new(FakeStream {
            id: id.to_string(),
            request,
            tracks,
            frame: Mutex::new(Some(VideoFrame::solid(
                frame_size.0,
                frame_size.1,
                Self::FRAME_COLOR,
            ))),
        })
    }

    pub fn with_frame(id: &str, width: u32, height: u32) -> Arc<Self> {
        Self::new(id, ConstraintRequest::default(), None, (width, height))
    }

    pub fn request(&self) -> &ConstraintRequest {
        &self.request
    }

    pub fn set_frame(&self, frame: VideoFrame) {
        *self.frame.lock().unwrap() = Some(frame);
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Stops seen by the busiest track; every track should agree.
    pub fn stop_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|track| track.stop_count())
            .max()
            .unwrap_or(0)
    }

    pub fn track_stop_counts(&self) -> Vec<usize> {
        self.tracks.iter().map(|track| track.stop_count()).collect()
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|track| Arc::clone(track) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame.lock().unwrap().clone()
    }
}

type ZoomLookup = Box<dyn Fn(&ConstraintRequest) -> Option<f64> + Send + Sync>;

/// Devices that answer every request after a configurable delay.
pub struct FakeDevices {
    delay: Duration,
    frame_size: (u32, u32),
    zoom_max: ZoomLookup,
    delays: Mutex<VecDeque<Duration>>,
    failures: Mutex<VecDeque<AcquisitionError>>,
    requests: Mutex<Vec<ConstraintRequest>>,
    running_at_request: Mutex<Vec<usize>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
}

impl Default for FakeDevices {
    fn default() -> Self {
        FakeDevices {
            delay: Duration::from_millis(10),
            frame_size: (640, 480),
            zoom_max: Box::new(|_| None),
            delays: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            running_at_request: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_zoom(mut self, max: f64) -> Self {
        self.zoom_max = Box::new(move |_| Some(max));
        self
    }

    pub fn with_zoom_by_facing(mut self, environment: Option<f64>, user: Option<f64>) -> Self {
        self.zoom_max = Box::new(move |request| match request.video.facing_mode {
            Some(FacingMode::User) => user,
            _ => environment,
        });
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Delay for the next request only.
    pub fn delay_next(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    /// Reject the next request with `err`.
    pub fn fail_next(&self, err: AcquisitionError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn requests(&self) -> Vec<ConstraintRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// For each request, how many earlier streams still had a running
    /// track when it was issued.
    pub fn running_at_request(&self) -> Vec<usize> {
        self.running_at_request.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<Arc<FakeStream>> {
        self.streams.lock().unwrap().clone()
    }

    pub fn stream(&self, id: &str) -> Option<Arc<FakeStream>> {
        self.streams().into_iter().find(|stream| stream.id == id)
    }
}

impl MediaDevices for FakeDevices {
    fn request_stream(&self, request: ConstraintRequest) -> AcquireFuture {
        let running = self
            .streams()
            .iter()
            .filter(|stream| stream.stop_count() == 0)
            .count();
        self.running_at_request.lock().unwrap().push(running);

        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or(self.delay);

        let outcome = match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => {
                let zoom_max = (self.zoom_max)(&request);
                let stream = FakeStream::new(
                    &format!("stream-{index}"),
                    request,
                    zoom_max,
                    self.frame_size,
                );
                self.streams.lock().unwrap().push(Arc::clone(&stream));
                Ok(stream as Arc<dyn MediaStream>)
            }
        };

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}
