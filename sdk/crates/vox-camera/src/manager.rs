//! Stream acquisition: one reconciliation cycle per control-state change,
//! at most one attached stream, and every acquired stream released exactly
//! once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::OnUserMediaError;
use crate::constraints::ConstraintRequest;
use crate::platform::{AcquireFuture, MediaDevices, MediaStream, VideoSink};
use crate::state::{CapabilityBounds, ControlState, ZoomPolicy};

/// Exclusive ownership of an acquired stream.
///
/// Releasing stops every track. This happens exactly once, on
/// [`StreamLease::release`] or on drop, whichever comes first.
pub struct StreamLease {
    id: String,
    stream: Arc<dyn MediaStream>,
    released: bool,
}

impl StreamLease {
    pub fn new(stream: Arc<dyn MediaStream>) -> Self {
        StreamLease {
            id: stream.id().to_string(),
            stream,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Non-owning reference for the sink.
    pub fn downgrade(&self) -> Weak<dyn MediaStream> {
        Arc::downgrade(&self.stream)
    }

    /// Label of the primary video track.
    pub fn label(&self) -> Option<String> {
        self.stream
            .video_tracks()
            .into_iter()
            .next()
            .map(|track| track.label())
    }

    /// Zoom bound reported by the primary video track, if it has one.
    pub fn capability_bounds(&self) -> Option<CapabilityBounds> {
        let track = self.stream.video_tracks().into_iter().next()?;
        let zoom = track.capabilities().zoom?;
        CapabilityBounds::from_max_zoom(zoom.max)
    }

    pub fn release(mut self) {
        self.stop_tracks();
    }

    fn stop_tracks(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for track in self.stream.tracks() {
            track.stop();
        }
        tracing::debug!("released stream {}", self.id);
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Where a cycle parks its attached stream. Shared with the [`Cycle`]
/// handle so teardown can release it without waiting on the task.
type LeaseSlot = Arc<Mutex<Option<StreamLease>>>;

fn lock_slot(slot: &LeaseSlot) -> MutexGuard<'_, Option<StreamLease>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one in-flight or settled reconciliation cycle.
pub struct Cycle {
    id: u64,
    token: CancellationToken,
    slot: LeaseSlot,
}

impl Cycle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Release whatever the cycle owns. An attached stream is stopped
    /// before this returns. If acquisition is still pending, the stream is
    /// released as soon as it resolves.
    pub fn teardown(&self) {
        let mut slot = lock_slot(&self.slot);
        self.token.cancel();
        if let Some(lease) = slot.take() {
            lease.release();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Everything a cycle task needs once its acquisition resolves.
struct CycleContext {
    id: u64,
    token: CancellationToken,
    slot: LeaseSlot,
    sink: Arc<dyn VideoSink>,
    bounds: Arc<watch::Sender<CapabilityBounds>>,
    control: Arc<watch::Sender<ControlState>>,
    policy: ZoomPolicy,
    on_error: Option<OnUserMediaError>,
}

/// Requests streams from the platform and keeps the sink consistent with
/// the latest request.
pub struct StreamManager {
    devices: Arc<dyn MediaDevices>,
    sink: Arc<dyn VideoSink>,
    bounds: Arc<watch::Sender<CapabilityBounds>>,
    control: Arc<watch::Sender<ControlState>>,
    root: CancellationToken,
    cycles: JoinSet<()>,
    next_cycle: u64,
}

impl StreamManager {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        sink: Arc<dyn VideoSink>,
        bounds: Arc<watch::Sender<CapabilityBounds>>,
        control: Arc<watch::Sender<ControlState>>,
    ) -> Self {
        StreamManager {
            devices,
            sink,
            bounds,
            control,
            root: CancellationToken::new(),
            cycles: JoinSet::new(),
            next_cycle: 0,
        }
    }

    /// Start a cycle for `request`. The platform request is issued before
    /// this returns; its result is handled on a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reconcile(
        &mut self,
        request: ConstraintRequest,
        on_error: Option<OnUserMediaError>,
        policy: ZoomPolicy,
    ) -> Cycle {
        let id = self.next_cycle;
        self.next_cycle += 1;
        let token = self.root.child_token();
        let slot: LeaseSlot = Arc::new(Mutex::new(None));

        tracing::debug!(
            cycle = id,
            facing_mode = ?request.video.facing_mode,
            zoom = ?request.video.zoom(),
            "requesting camera stream"
        );
        let acquire = self.devices.request_stream(request);

        let ctx = CycleContext {
            id,
            token: token.clone(),
            slot: Arc::clone(&slot),
            sink: Arc::clone(&self.sink),
            bounds: Arc::clone(&self.bounds),
            control: Arc::clone(&self.control),
            policy,
            on_error,
        };
        self.cycles.spawn(run_cycle(acquire, ctx));

        Cycle { id, token, slot }
    }

    /// Number of cycles that still hold or await a stream.
    pub fn outstanding(&self) -> usize {
        self.cycles.len()
    }

    /// Wait for the next cycle to finish. `None` when none are running.
    pub async fn next_finished(&mut self) -> Option<()> {
        match self.cycles.join_next().await? {
            Ok(()) => Some(()),
            Err(e) => {
                tracing::error!("reconciliation cycle failed: {}", e);
                Some(())
            }
        }
    }

    /// Tear down every cycle and wait until all of their streams,
    /// including ones still being acquired, have been released.
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        while self.next_finished().await.is_some() {}
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        // Cycles still running see the cancellation and release on their own.
        self.root.cancel();
        self.cycles.detach_all();
    }
}

async fn run_cycle(acquire: AcquireFuture, ctx: CycleContext) {
    let stream = match acquire.await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(cycle = ctx.id, "camera acquisition failed: {}", err);
            if let Some(on_error) = &ctx.on_error {
                on_error(&err);
            }
            return;
        }
    };
    let lease = StreamLease::new(stream);

    if ctx.token.is_cancelled() {
        tracing::debug!(
            cycle = ctx.id,
            "cycle superseded before stream {} resolved; discarding",
            lease.id()
        );
        lease.release();
        return;
    }

    if let Some(bounds) = lease.capability_bounds() {
        ctx.bounds.send_if_modified(|current| {
            if *current != bounds {
                *current = bounds;
                true
            } else {
                false
            }
        });
        let clamped = ctx
            .control
            .send_if_modified(|state| state.clamp_to(&bounds, ctx.policy));
        if clamped {
            tracing::debug!(
                cycle = ctx.id,
                "zoom clamped to new maximum {}",
                bounds.max_zoom
            );
        }
    }

    {
        // Holding the slot keeps teardown from slipping in between the
        // check and the attach.
        let mut slot = lock_slot(&ctx.slot);
        if ctx.token.is_cancelled() || !ctx.sink.is_live() {
            tracing::debug!(
                cycle = ctx.id,
                "sink gone or cycle superseded; discarding stream {}",
                lease.id()
            );
            lease.release();
            return;
        }

        ctx.sink.attach(lease.downgrade());
        tracing::info!(
            cycle = ctx.id,
            "attached stream {} ({})",
            lease.id(),
            lease.label().unwrap_or_default()
        );
        *slot = Some(lease);
    }

    ctx.token.cancelled().await;
    // Shutdown cancels through the root token and leaves the lease here.
    if let Some(lease) = lock_slot(&ctx.slot).take() {
        lease.release();
    }
}
