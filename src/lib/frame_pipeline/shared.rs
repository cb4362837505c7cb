//! State shared by the driver and every pool thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use decmt_pool::JobPool;
use log::{debug, error};
use parking_lot::{Mutex, RwLock};

use super::backoff::Poller;
use super::config::{ErrorPolicy, SchedulerConfig};
use super::gate::{FrameBarrier, StageGate};
use super::stage::{NUM_STAGES, RowJob, Stage, TileJob};
use super::state::FrameState;
use super::stats::PipelineStats;
use super::worker::extract_panic_message;
use crate::errors::DecodeMtError;
use crate::geometry::Capacity;

/// Everything the threads of one scheduler generation share.
pub(crate) struct Shared<F> {
    pub config: SchedulerConfig,
    pub state: FrameState,
    pub gates: [StageGate; NUM_STAGES],
    /// Opened once after every pool thread has been spawned.
    pub start: StageGate,
    /// Decided before `start` opens: false tells pool threads to exit immediately.
    pub setup_ok: AtomicBool,
    pub barrier: FrameBarrier,
    pub end_flag: AtomicBool,
    pub num_threads_exited: AtomicUsize,
    pub abort: AtomicBool,
    pub first_error: Mutex<Option<DecodeMtError>>,
    pub frame: RwLock<Option<Arc<F>>>,
    pub parse_pool: JobPool<TileJob>,
    pub recon_pool: JobPool<TileJob>,
    pub lf_pool: JobPool<RowJob>,
    pub cdef_pool: JobPool<RowJob>,
    pub stats: Arc<PipelineStats>,
}

impl<F> Shared<F> {
    pub fn new(config: SchedulerConfig, capacity: Capacity, stats: Arc<PipelineStats>) -> Self {
        let num_threads = config.num_threads;
        Self {
            state: FrameState::new(capacity),
            gates: Default::default(),
            start: StageGate::new(),
            setup_ok: AtomicBool::new(false),
            barrier: FrameBarrier::new(num_threads),
            end_flag: AtomicBool::new(false),
            num_threads_exited: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
            frame: RwLock::new(None),
            parse_pool: JobPool::new("parse", capacity.max_tiles),
            recon_pool: JobPool::new("recon", capacity.max_tiles),
            lf_pool: JobPool::new("loop-filter", capacity.max_sb_rows),
            cdef_pool: JobPool::new("cdef", capacity.max_sb_rows),
            stats,
            config,
        }
    }

    pub fn gate(&self, stage: Stage) -> &StageGate {
        &self.gates[stage.index()]
    }

    /// Open `stage`'s gate, waking every thread waiting on it.
    pub fn open_stage(&self, stage: Stage) {
        if self.gate(stage).open() {
            debug!("Opened {stage} stage");
        }
    }

    pub fn current_frame(&self) -> Option<Arc<F>> {
        self.frame.read().clone()
    }

    pub fn poller(&self) -> Poller<'_> {
        Poller::new(&self.abort, &self.config, &self.stats)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Run one collaborator call, converting failures and panics into job errors.
    pub fn run_job(
        &self,
        stage: Stage,
        index: u32,
        worker_id: usize,
        job: impl FnOnce() -> anyhow::Result<()>,
    ) -> Result<(), DecodeMtError> {
        let started = self.stats.start_job();
        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
        self.stats.record_job(stage, worker_id, started);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => match e.downcast_ref::<DecodeMtError>() {
                Some(DecodeMtError::Aborted { .. }) => Err(DecodeMtError::Aborted { stage }),
                _ => Err(DecodeMtError::job_failed(stage, index, &e)),
            },
            Err(payload) => Err(DecodeMtError::JobFailed {
                stage,
                index,
                message: format!("panicked: {}", extract_panic_message(payload)),
            }),
        }
    }

    /// Record a job failure. Returns true if the caller should keep draining its stage.
    ///
    /// The first primary failure of a frame is kept for the driver. Under
    /// [`ErrorPolicy::Abort`] it also raises the frame-wide abort flag.
    pub fn report_failure(&self, worker_id: usize, err: DecodeMtError) -> bool {
        if err.is_secondary() {
            debug!("Worker {worker_id}: {err}");
        } else {
            error!("Worker {worker_id}: {err}");
            self.stats.record_failure();
            let mut first = self.first_error.lock();
            if first.is_none() {
                *first = Some(err);
            }
            drop(first);
            if self.config.error_policy == ErrorPolicy::Abort {
                self.abort.store(true, Ordering::SeqCst);
            }
        }
        self.config.error_policy == ErrorPolicy::Abort
    }

    /// Reset run by the last thread to reach the frame barrier.
    pub fn reset_after_frame(&self) {
        for gate in &self.gates {
            gate.close();
        }
        // Jobs left behind by a thread that stopped draining under LocalOnly.
        let leftover = self.parse_pool.drain()
            + self.recon_pool.drain()
            + self.lf_pool.drain()
            + self.cdef_pool.drain();
        if leftover > 0 {
            debug!("Discarded {leftover} unprocessed jobs at end of frame");
        }
        self.state.clear_row_maps();
        self.abort.store(false, Ordering::SeqCst);
    }

    /// Arrive at the frame barrier and wait for every other thread.
    pub fn finish_frame(&self) {
        self.barrier.arrive_and_wait(|| self.reset_after_frame());
    }
}
