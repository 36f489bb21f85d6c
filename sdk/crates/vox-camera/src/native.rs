//! Real camera devices through nokhwa.
//!
//! Each acquisition opens the device on its own capture thread. The thread
//! reports the opened stream (or the failure) back over a oneshot channel,
//! then keeps the latest decoded frame until the track is stopped.
//!
//! Stopping a track only signals its thread, which closes the device after
//! the frame read in progress returns. Capture threads therefore take turns
//! through a [`DeviceGate`]: a new thread opens its camera only once the
//! previous one has closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use bytes::Bytes;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, ControlValueDescription, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::constraints::{pick_device, ConstraintRequest, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::error::AcquisitionError;
use crate::platform::{
    AcquireFuture, MediaDevices, MediaStream, MediaTrack, TrackCapabilities, TrackKind, ZoomRange,
};
use crate::video::VideoFrame;

const DEFAULT_FRAME_RATE: u32 = 30;

type Acquired = Result<Arc<dyn MediaStream>, AcquisitionError>;
type SharedFrame = Arc<Mutex<Option<VideoFrame>>>;

/// Exclusive access to the camera hardware, held by a capture thread from
/// before it opens a device until after it has closed it.
#[derive(Clone, Default)]
struct DeviceGate(Arc<Mutex<()>>);

impl DeviceGate {
    fn hold(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Camera devices of the local machine.
pub struct NokhwaDevices {
    backend: ApiBackend,
    next_id: AtomicU64,
    gate: DeviceGate,
}

impl NokhwaDevices {
    pub fn new(backend: ApiBackend) -> Self {
        NokhwaDevices {
            backend,
            next_id: AtomicU64::new(0),
            gate: DeviceGate::default(),
        }
    }
}

impl Default for NokhwaDevices {
    fn default() -> Self {
        Self::new(ApiBackend::Auto)
    }
}

impl MediaDevices for NokhwaDevices {
    fn request_stream(&self, request: ConstraintRequest) -> AcquireFuture {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let backend = self.backend;
        let gate = self.gate.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let spawned = thread::Builder::new()
            .name(format!("vox-camera-capture-{n}"))
            .spawn(move || {
                let _device = gate.hold();
                run_capture(backend, request, format!("camera-{n}"), ready_tx)
            });

        Box::pin(async move {
            if let Err(e) = spawned {
                return Err(AcquisitionError::Other(format!(
                    "failed to spawn capture thread: {e}"
                )));
            }
            ready_rx.await.unwrap_or(Err(AcquisitionError::Aborted))
        })
    }
}

fn run_capture(
    backend: ApiBackend,
    request: ConstraintRequest,
    id: String,
    ready: oneshot::Sender<Acquired>,
) {
    let (mut camera, label) = match open_camera(backend, &request) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let zoom = apply_zoom(&mut camera, request.video.zoom());

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(map_error(e)));
        return;
    }
    let resolution = camera.resolution();
    tracing::info!(
        "opened {} at {}x{} for {}",
        label,
        resolution.width(),
        resolution.height(),
        id
    );

    let stop = CancellationToken::new();
    let frame: SharedFrame = Arc::new(Mutex::new(None));
    let stream = Arc::new(NativeStream {
        id: id.clone(),
        track: Arc::new(NativeTrack {
            label,
            zoom,
            stop: stop.clone(),
        }),
        frame: Arc::clone(&frame),
    });

    if ready.send(Ok(stream)).is_err() {
        // Nobody is waiting any more; the stream was dropped unseen.
        stop.cancel();
    }

    while !stop.is_cancelled() {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("{}: frame read failed, ending track: {}", id, e);
                stop.cancel();
                break;
            }
        };
        match buffer.decode_image::<RgbFormat>() {
            Ok(image) => {
                let (width, height) = image.dimensions();
                let decoded = VideoFrame::new(width, height, Bytes::from(image.into_raw()));
                *frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(decoded);
            }
            Err(e) => tracing::debug!("{}: dropping undecodable frame: {}", id, e),
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("{}: failed to close device: {}", id, e);
    }
    tracing::debug!("{} capture thread exiting", id);
}

fn open_camera(
    backend: ApiBackend,
    request: &ConstraintRequest,
) -> Result<(Camera, String), AcquisitionError> {
    let devices = nokhwa::query(backend).map_err(map_error)?;
    let labels: Vec<String> = devices.iter().map(|info| info.human_name()).collect();

    let index = match pick_device(&labels, &request.video) {
        Some(index) => index,
        None if labels.is_empty() => return Err(AcquisitionError::NotFound),
        None => {
            return Err(AcquisitionError::Overconstrained {
                constraint: "deviceId".to_string(),
            })
        }
    };

    let video = &request.video;
    let width = video
        .width
        .and_then(|w| w.target())
        .unwrap_or(DEFAULT_WIDTH);
    let height = video
        .height
        .and_then(|h| h.target())
        .unwrap_or(DEFAULT_HEIGHT);
    let frame_rate = video
        .frame_rate
        .map(|fps| fps.round() as u32)
        .filter(|fps| *fps > 0)
        .unwrap_or(DEFAULT_FRAME_RATE);

    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, frame_rate),
    ));
    let camera = Camera::new(devices[index].index().clone(), format).map_err(map_error)?;
    Ok((camera, labels[index].clone()))
}

/// Apply the requested zoom and report the device's zoom range. Devices
/// without a zoom control report none and ignore the request.
fn apply_zoom(camera: &mut Camera, zoom: Option<f64>) -> Option<ZoomRange> {
    let control = match camera.camera_control(KnownCameraControl::Zoom) {
        Ok(control) => control,
        Err(e) => {
            tracing::debug!("no zoom control: {}", e);
            return None;
        }
    };
    let ControlValueDescription::IntegerRange { min, max, step, .. } = *control.description()
    else {
        return None;
    };

    if let Some(zoom) = zoom {
        let value = (zoom.round() as i64).clamp(min, max);
        if let Err(e) =
            camera.set_camera_control(KnownCameraControl::Zoom, ControlValueSetter::Integer(value))
        {
            tracing::warn!("failed to set zoom {}: {}", value, e);
        }
    }

    Some(ZoomRange {
        min: min as f64,
        max: max as f64,
        step: step as f64,
    })
}

fn map_error(err: NokhwaError) -> AcquisitionError {
    match err {
        NokhwaError::OpenDeviceError { .. } | NokhwaError::OpenStreamError { .. } => {
            AcquisitionError::NotReadable(err.to_string())
        }
        NokhwaError::SetPropertyError { .. } => AcquisitionError::Overconstrained {
            constraint: "format".to_string(),
        },
        other => AcquisitionError::Other(other.to_string()),
    }
}

struct NativeTrack {
    label: String,
    zoom: Option<ZoomRange>,
    stop: CancellationToken,
}

impl MediaTrack for NativeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn capabilities(&self) -> TrackCapabilities {
        TrackCapabilities { zoom: self.zoom }
    }

    fn stop(&self) {
        self.stop.cancel();
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

struct NativeStream {
    id: String,
    track: Arc<NativeTrack>,
    frame: SharedFrame,
}

impl MediaStream for NativeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![Arc::clone(&self.track) as Arc<dyn MediaTrack>]
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.track.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error() {
        assert_eq!(
            map_error(NokhwaError::OpenStreamError("busy".to_string())),
            AcquisitionError::NotReadable(
                NokhwaError::OpenStreamError("busy".to_string()).to_string()
            )
        );
        assert!(matches!(
            map_error(NokhwaError::GeneralError("x".to_string())),
            AcquisitionError::Other(_)
        ));
    }

    #[test]
    fn test_gate_waits_for_previous_close() {
        use std::sync::mpsc;
        use std::time::Duration;

        let gate = DeviceGate::default();
        let (events_tx, events) = mpsc::channel();

        let held = gate.hold();
        let next = {
            let gate = gate.clone();
            let events_tx = events_tx.clone();
            thread::spawn(move || {
                let _device = gate.hold();
                events_tx.send("opened").unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        events_tx.send("closed").unwrap();
        drop(held);
        next.join().unwrap();

        let order: Vec<_> = events.try_iter().collect();
        assert_eq!(order, vec!["closed", "opened"]);
    }

    #[test]
    fn test_dropping_stream_stops_capture() {
        let stop = CancellationToken::new();
        let stream = NativeStream {
            id: "camera-0".to_string(),
            track: Arc::new(NativeTrack {
                label: "Integrated Camera".to_string(),
                zoom: None,
                stop: stop.clone(),
            }),
            frame: Arc::new(Mutex::new(None)),
        };
        assert!(stream.is_active());
        drop(stream);
        assert!(stop.is_cancelled());
    }
}
