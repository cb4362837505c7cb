//! Worker threads and the per-thread stage loop.
//!
//! Every thread, the driver included, walks the same sequence each frame:
//!
//! ```text
//! wait MotionProjection gate → project rows
//! wait Parse gate            → drain parse queue
//! wait Recon gate            → drain recon queue, then help unfinished tiles
//! wait LoopFilter gate       → drain loop filter queue (row gated)
//! wait Cdef gate             → drain CDEF queue (row gated)
//! frame barrier
//! ```
//!
//! Pool threads then check the end flag and either loop back or exit. The driver opens
//! each gate itself (see [`super::driver`]) and runs the same drains in between.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::collaborator::FrameStages;
use super::motion_proj::drain_motion_projection;
use super::row_sync::{drain_cdef, drain_lf};
use super::shared::Shared;
use super::stage::Stage;
use super::tile_scheduler::{drain_parse, drain_recon};
use crate::errors::{DecodeMtError, Result};

/// Identity and failure record of one thread.
#[derive(Debug)]
pub struct WorkerContext {
    worker_id: usize,
    first_error: Option<DecodeMtError>,
}

impl WorkerContext {
    /// Create the context of thread `worker_id` (0 is the driver).
    #[must_use]
    pub fn new(worker_id: usize) -> Self {
        Self { worker_id, first_error: None }
    }

    /// Thread index.
    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// First failure this thread reported, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&DecodeMtError> {
        self.first_error.as_ref()
    }

    /// Record a failure locally and with the scheduler.
    ///
    /// Returns true if the caller should keep draining its stage.
    pub(crate) fn fail<F>(&mut self, shared: &Shared<F>, err: DecodeMtError) -> bool {
        if self.first_error.is_none() && !err.is_secondary() {
            self.first_error = Some(err.clone());
        }
        shared.report_failure(self.worker_id, err)
    }

    /// Convert the thread's record into its exit status.
    pub(crate) fn into_result(self) -> Result<()> {
        self.first_error.map_or(Ok(()), Err)
    }
}

/// The frame a thread is working on plus its scratch space for that frame.
pub(crate) struct FrameRun<F: FrameStages> {
    frame: Option<Arc<F>>,
    scratch: Option<F::Scratch>,
}

impl<F: FrameStages> FrameRun<F> {
    /// Pick up the installed frame, if any, and create scratch for it.
    pub fn load(shared: &Shared<F>, worker_id: usize) -> Self {
        let frame = shared.current_frame();
        let scratch = frame.as_ref().map(|f| f.create_scratch(worker_id));
        Self { frame, scratch }
    }

    /// Run this thread's share of `stage`. Does nothing when no frame is installed.
    pub fn run_stage(&mut self, shared: &Shared<F>, ctx: &mut WorkerContext, stage: Stage) {
        let (Some(frame), Some(scratch)) = (self.frame.as_deref(), self.scratch.as_mut()) else {
            return;
        };
        match stage {
            Stage::MotionProjection => drain_motion_projection(shared, ctx, frame, scratch),
            Stage::Parse => drain_parse(shared, ctx, frame),
            Stage::Recon => drain_recon(shared, ctx, frame, scratch),
            Stage::LoopFilter => drain_lf(shared, ctx, frame, scratch),
            Stage::Cdef => drain_cdef(shared, ctx, frame, scratch),
        }
    }
}

/// One pass of a pool thread through every stage and the frame barrier.
///
/// Returns true if this pass was the shutdown pass. The end flag is read once the
/// motion projection gate has opened. The driver sets it only between frames, before it
/// opens that gate again, so every thread of a pass sees the same value no matter how
/// late it leaves the previous barrier.
fn run_pool_frame<F: FrameStages>(shared: &Shared<F>, ctx: &mut WorkerContext) -> bool {
    let worker_id = ctx.worker_id();
    let mut run: Option<FrameRun<F>> = None;
    let mut exiting = false;
    for stage in Stage::ALL {
        shared.gate(stage).wait();
        if stage == Stage::MotionProjection {
            exiting = shared.end_flag.load(Ordering::SeqCst);
        }
        let current = run.get_or_insert_with(|| FrameRun::load(shared, worker_id));
        current.run_stage(shared, ctx, stage);
    }
    drop(run);
    shared.finish_frame();
    exiting
}

/// Body of a pool thread.
///
/// Waits for the scheduler to finish spawning, then processes frames until the end flag
/// is observed after a frame barrier.
pub(crate) fn worker_entry<F: FrameStages>(shared: &Shared<F>, mut ctx: WorkerContext) -> Result<()> {
    shared.start.wait();
    if !shared.setup_ok.load(Ordering::SeqCst) {
        debug!("Worker {} exiting: scheduler setup failed", ctx.worker_id());
        return Ok(());
    }
    while !run_pool_frame(shared, &mut ctx) {}
    shared.num_threads_exited.fetch_add(1, Ordering::SeqCst);
    debug!("Worker {} exited", ctx.worker_id());
    ctx.into_result()
}

/// Spawn pool thread `worker_id`.
pub(crate) fn spawn_worker<F: FrameStages>(
    shared: &Arc<Shared<F>>,
    worker_id: usize,
) -> Result<JoinHandle<Result<()>>> {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("decmt-worker-{worker_id}"))
        .spawn(move || {
            let ctx = WorkerContext::new(worker_id);
            match panic::catch_unwind(AssertUnwindSafe(|| worker_entry(&shared, ctx))) {
                Ok(result) => result,
                Err(payload) => Err(handle_worker_panic(&shared, worker_id, payload)),
            }
        })
        .map_err(|e| DecodeMtError::ThreadSpawn { worker_id, reason: e.to_string() })
}

/// Extract a human-readable message from a panic payload.
#[must_use]
pub fn extract_panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Record a pool thread panic with the scheduler and count the thread as exited.
fn handle_worker_panic<F>(
    shared: &Shared<F>,
    worker_id: usize,
    panic_info: Box<dyn std::any::Any + Send>,
) -> DecodeMtError {
    let err =
        DecodeMtError::WorkerPanicked { worker_id, message: extract_panic_message(panic_info) };
    shared.report_failure(worker_id, err.clone());
    shared.num_threads_exited.fetch_add(1, Ordering::SeqCst);
    err
}

/// Join all pool threads, returning the first error any of them reported.
pub(crate) fn join_worker_threads(handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    let mut first = None;
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.join() {
            Ok(result) => result,
            Err(payload) => Err(DecodeMtError::WorkerPanicked {
                worker_id: i + 1,
                message: extract_panic_message(payload),
            }),
        };
        if let Err(e) = outcome {
            error!("Worker {} finished with error: {e}", i + 1);
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
