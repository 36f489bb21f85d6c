//! The mounted camera control and its imperative command surface.
//!
//! Commands mutate watch channels synchronously on the caller's thread. A
//! background reconcile loop observes every change and re-negotiates the
//! stream: tear down the current cycle, then start a fresh one for the
//! latest state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture;
use crate::config::CameraProps;
use crate::constraints::ConstraintRequest;
use crate::manager::StreamManager;
use crate::platform::{MediaDevices, VideoSink};
use crate::state::{CapabilityBounds, ControlState, FacingMode};
use crate::video::VideoElement;

/// Entry point for mounting a camera control.
pub struct Camera;

impl Camera {
    /// Mount a camera backed by `devices` and start the first acquisition.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(devices: Arc<dyn MediaDevices>, props: CameraProps) -> CameraHandle {
        let video = Arc::new(VideoElement::new());

        let (control_tx, control_rx) = watch::channel(ControlState::new(props.facing_mode));
        let (bounds_tx, bounds_rx) = watch::channel(CapabilityBounds::default());
        let (props_tx, props_rx) = watch::channel(props);
        let control = Arc::new(control_tx);
        let props = Arc::new(props_tx);

        let manager = StreamManager::new(
            devices,
            Arc::clone(&video) as Arc<dyn VideoSink>,
            Arc::new(bounds_tx),
            Arc::clone(&control),
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reconcile_loop(
            manager,
            control_rx,
            props_rx,
            cancel.clone(),
        ));

        CameraHandle {
            control,
            bounds: bounds_rx,
            props,
            video,
            cancel,
            task: Some(task),
        }
    }
}

/// Imperative commands for a mounted camera.
///
/// No method fails: problems are either absorbed into an empty result or
/// reported through the error callback. Dropping the handle unmounts the
/// camera; streams are then released in the background.
pub struct CameraHandle {
    control: Arc<watch::Sender<ControlState>>,
    bounds: watch::Receiver<CapabilityBounds>,
    props: Arc<watch::Sender<CameraProps>>,
    video: Arc<VideoElement>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CameraHandle {
    /// Capture the frame on display as a JPEG data URI at native
    /// resolution. `None` once the video element is unmounted.
    pub fn snapshot(&self) -> Option<String> {
        match capture::snapshot(self.video.as_ref()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!("snapshot failed: {}", e);
                None
            }
        }
    }

    pub fn zoom_in(&self) {
        let bounds = *self.bounds.borrow();
        let policy = self.props.borrow().zoom_policy;
        if self
            .control
            .send_if_modified(|state| state.zoom_in(&bounds, policy))
        {
            tracing::debug!("zoom in to {}", self.current_zoom_level());
        }
    }

    pub fn zoom_out(&self) {
        if self.control.send_if_modified(|state| state.zoom_out()) {
            tracing::debug!("zoom out to {}", self.current_zoom_level());
        }
    }

    pub fn switch_facing_mode(&self) {
        self.control
            .send_if_modified(|state| state.switch_facing_mode());
        tracing::debug!("switched facing mode to {}", self.facing_mode());
    }

    pub fn max_zoom_level(&self) -> f64 {
        self.bounds.borrow().max_zoom
    }

    pub fn current_zoom_level(&self) -> u32 {
        self.control.borrow().zoom_level()
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.control.borrow().facing_mode()
    }

    /// Replace the props. The stream is only re-negotiated when an
    /// acquisition input changed, or when a clamped zoom policy pulls the
    /// current zoom back under the known maximum.
    pub fn set_props(&self, props: CameraProps) {
        let policy = props.zoom_policy;
        self.props.send_if_modified(|current| {
            let changed = !current.same_inputs(&props);
            *current = props;
            changed
        });

        let bounds = *self.bounds.borrow();
        if self
            .control
            .send_if_modified(|state| state.clamp_to(&bounds, policy))
        {
            tracing::debug!("zoom clamped to {} by policy change", self.current_zoom_level());
        }
    }

    pub fn props(&self) -> CameraProps {
        self.props.borrow().clone()
    }

    /// The element the stream renders into.
    pub fn video(&self) -> &Arc<VideoElement> {
        &self.video
    }

    /// Unmount the camera and wait until every stream it acquired, including
    /// ones still in flight, has been released.
    pub async fn unmount(mut self) {
        self.video.unmount();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("camera reconcile loop failed: {}", e);
            }
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.video.unmount();
        self.cancel.cancel();
    }
}

async fn run_reconcile_loop(
    mut manager: StreamManager,
    mut control_rx: watch::Receiver<ControlState>,
    mut props_rx: watch::Receiver<CameraProps>,
    cancel: CancellationToken,
) {
    tracing::info!("camera mounted");

    loop {
        let (request, on_error, policy) = {
            let control = *control_rx.borrow_and_update();
            let props = props_rx.borrow_and_update();
            (
                ConstraintRequest::build(
                    &control,
                    props.width,
                    props.height,
                    props.video_constraints.as_deref(),
                ),
                props.on_user_media_error.clone(),
                props.zoom_policy,
            )
        };
        let cycle = manager.reconcile(request, on_error, policy);

        let unmounted = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                changed = control_rx.changed() => break changed.is_err(),
                changed = props_rx.changed() => break changed.is_err(),
                Some(()) = manager.next_finished() => {}
            }
        };

        cycle.teardown();
        if unmounted {
            break;
        }
        tracing::debug!("control state changed; re-negotiating after cycle {}", cycle.id());
    }

    manager.shutdown().await;
    tracing::info!("camera unmounted");
}
