//! The frame scheduler: thread pool lifecycle and per-frame stage transitions.
//!
//! The thread calling [`FrameScheduler::decode_frame`] is the driver. For each frame it
//! installs the frame, queues the parse jobs, then walks the stages: open the stage gate,
//! drain the stage alongside the pool threads, move on. Loop filter and CDEF jobs are
//! queued just before their gates open. After CDEF the driver joins the pool at the frame
//! barrier, whose last arriver resets the gates and row maps for the next frame.
//!
//! # Shutdown
//!
//! [`FrameScheduler::shutdown`] sets the end flag, uninstalls the frame and forces every
//! gate open in order. Pool threads walk through the stages without work, meet at the
//! barrier (the driver arrives without waiting) and exit on seeing the end flag. The
//! driver polls the exit counter until every pool thread has left, then joins them.
//!
//! # Geometry changes
//!
//! A [`GeometryCheck`] compares each frame with the previous one. An unchanged layout
//! reuses the tile records after a progress reset; a changed layout that still fits is
//! re-installed; a layout that exceeds the allocation shuts the pool down and starts a
//! new one sized for the union of old and new capacity.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::backoff::StallWatch;
use super::collaborator::FrameStages;
use super::config::SchedulerConfig;
use super::row_sync::{queue_cdef_jobs, queue_lf_jobs};
use super::shared::Shared;
use super::stage::Stage;
use super::stats::PipelineStats;
use super::tile_scheduler::queue_parse_jobs;
use super::worker::{FrameRun, WorkerContext, join_worker_threads, spawn_worker};
use crate::errors::{DecodeMtError, Result};
use crate::geometry::{Capacity, FrameGeometry, GeometryChange, GeometryCheck};

/// Poll interval while waiting for pool threads to exit.
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

/// Summary of one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Zero-based frame counter
    pub frame_number: u64,
    /// How the frame's geometry compared with the previous frame
    pub geometry_change: GeometryChange,
    /// Wall time from install to barrier
    pub elapsed: Duration,
    /// Tiles in the frame
    pub num_tiles: u32,
    /// Superblock rows in the frame
    pub sb_rows: u32,
}

/// Frame-level multi-threaded decode scheduler.
///
/// Owns `num_threads - 1` pool threads; the caller of
/// [`decode_frame`](FrameScheduler::decode_frame) is the remaining thread.
pub struct FrameScheduler<F: FrameStages> {
    config: SchedulerConfig,
    capacity: Capacity,
    shared: Arc<Shared<F>>,
    handles: Vec<JoinHandle<Result<()>>>,
    driver: WorkerContext,
    geometry_check: GeometryCheck,
    stats: Arc<PipelineStats>,
    frames_decoded: u64,
    shut_down: bool,
}

impl<F: FrameStages> FrameScheduler<F> {
    /// Validate `config`, allocate frame state for `capacity` and start the pool threads.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::InvalidParameter`] for an invalid configuration or
    /// [`DecodeMtError::ThreadSpawn`] if a pool thread cannot be started. In the latter
    /// case threads already started are told to exit and joined before returning.
    pub fn new(config: SchedulerConfig, capacity: Capacity) -> Result<Self> {
        config.validate()?;
        let stats =
            Arc::new(PipelineStats::new(config.num_threads).with_timing(config.collect_stats));
        let (shared, handles) = start_pool(&config, capacity, &stats)?;
        info!(
            "Started frame scheduler: {} threads, up to {} tiles and {} superblock rows",
            config.num_threads, capacity.max_tiles, capacity.max_sb_rows
        );
        Ok(Self {
            config,
            capacity,
            shared,
            handles,
            driver: WorkerContext::new(0),
            geometry_check: GeometryCheck::new(),
            stats,
            frames_decoded: 0,
            shut_down: false,
        })
    }

    /// Create a scheduler with default settings for `num_threads` threads and a
    /// `max_tile_cols` x `max_tile_rows` tile grid over at most `max_sb_rows` superblock
    /// rows.
    ///
    /// # Errors
    /// See [`FrameScheduler::new`].
    pub fn init(
        num_threads: usize,
        max_tile_cols: usize,
        max_tile_rows: usize,
        max_sb_rows: usize,
    ) -> Result<Self> {
        Self::new(
            SchedulerConfig::new(num_threads),
            Capacity::for_grid(max_tile_cols, max_tile_rows, max_sb_rows),
        )
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current allocation.
    #[must_use]
    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// Statistics accumulated across all frames.
    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Frames decoded so far.
    #[must_use]
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Pool threads that have exited in the current pool generation.
    #[must_use]
    pub fn num_threads_exited(&self) -> usize {
        self.shared.num_threads_exited.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Completed frame barriers in the current pool generation.
    #[must_use]
    pub fn barrier_completions(&self) -> u64 {
        self.shared.barrier.completions()
    }

    /// Returns true once [`shutdown`](FrameScheduler::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Decode one frame across the pool.
    ///
    /// Blocks until every stage of the frame has completed on every thread.
    ///
    /// # Errors
    /// - [`DecodeMtError::ShutDown`] after [`shutdown`](FrameScheduler::shutdown)
    /// - [`DecodeMtError::InvalidGeometry`] for an invalid picture
    /// - [`DecodeMtError::ThreadSpawn`] if a reallocation cannot restart the pool
    /// - the first job failure of the frame, usually [`DecodeMtError::JobFailed`]
    pub fn decode_frame(&mut self, stages: Arc<F>) -> Result<FrameReport> {
        if self.shut_down {
            return Err(DecodeMtError::ShutDown);
        }
        let started = Instant::now();
        let geometry = stages.geometry();
        geometry.picture().validate()?;

        let geometry_change = self.geometry_check.update(geometry, &self.capacity);
        if let Err(e) = self.prepare_state(geometry, geometry_change) {
            self.geometry_check.reset();
            return Err(e);
        }

        let shared = Arc::clone(&self.shared);
        shared.state.motion.reset(stages.motion_projection_rows());
        *shared.frame.write() = Some(Arc::clone(&stages));
        if let Err(e) = queue_parse_jobs(&shared, 0..=geometry.num_tiles().saturating_sub(1)) {
            *shared.frame.write() = None;
            return Err(e);
        }

        let mut run = FrameRun::load(&shared, self.driver.worker_id());
        for stage in Stage::ALL {
            match stage {
                Stage::LoopFilter => queue_lf_jobs(&shared),
                Stage::Cdef => queue_cdef_jobs(&shared),
                _ => {}
            }
            shared.open_stage(stage);
            run.run_stage(&shared, &mut self.driver, stage);
        }
        drop(run);
        shared.finish_frame();
        *shared.frame.write() = None;

        let frame_number = self.frames_decoded;
        self.frames_decoded += 1;
        self.stats.record_frame();

        if let Some(err) = shared.first_error.lock().take() {
            warn!("Frame {frame_number} failed: {err}");
            return Err(err);
        }

        let report = FrameReport {
            frame_number,
            geometry_change,
            elapsed: started.elapsed(),
            num_tiles: geometry.num_tiles(),
            sb_rows: geometry.sb_rows(),
        };
        debug!("Decoded frame {frame_number} in {:?}", report.elapsed);
        Ok(report)
    }

    fn prepare_state(&mut self, geometry: &FrameGeometry, change: GeometryChange) -> Result<()> {
        match change {
            GeometryChange::Same => {
                self.shared.state.reset_progress();
                Ok(())
            }
            GeometryChange::Reconfigure => {
                debug!(
                    "Frame geometry changed: {} tiles over {} superblock rows",
                    geometry.num_tiles(),
                    geometry.sb_rows()
                );
                self.shared.state.configure(geometry)
            }
            GeometryChange::Reallocate => {
                let capacity = self.capacity.union(&geometry.required_capacity());
                info!(
                    "Reallocating frame state: {} tiles, {} superblock rows",
                    capacity.max_tiles, capacity.max_sb_rows
                );
                if let Err(e) = self.stop_pool() {
                    warn!("Previous pool finished with error: {e}");
                }
                let (shared, handles) = start_pool(&self.config, capacity, &self.stats)?;
                self.shared = shared;
                self.handles = handles;
                self.capacity = capacity;
                self.shared.state.configure(geometry)
            }
        }
    }

    /// Stop every pool thread.
    ///
    /// Idempotent. After shutdown [`decode_frame`](FrameScheduler::decode_frame) returns
    /// [`DecodeMtError::ShutDown`].
    ///
    /// # Errors
    /// Returns the first error any pool thread reported over its lifetime.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let result = self.stop_pool();
        info!("Frame scheduler shut down after {} frames", self.frames_decoded);
        result
    }

    fn stop_pool(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        shared.end_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        *shared.frame.write() = None;
        for stage in Stage::ALL {
            shared.open_stage(stage);
        }
        shared.barrier.arrive_no_wait(|| shared.reset_after_frame());

        let expected = self.handles.len();
        let mut watch = StallWatch::start(self.config.stall);
        while self.num_threads_exited() < expected {
            thread::sleep(SHUTDOWN_POLL);
            if watch.check(|| {
                format!("{} of {expected} pool threads to exit", expected - self.num_threads_exited())
            }) {
                self.stats.record_stall();
            }
        }
        join_worker_threads(std::mem::take(&mut self.handles))
    }
}

impl<F: FrameStages> Drop for FrameScheduler<F> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Frame scheduler dropped with worker error: {e}");
        }
    }
}

impl<F: FrameStages> std::fmt::Debug for FrameScheduler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("config", &self.config)
            .field("capacity", &self.capacity)
            .field("frames_decoded", &self.frames_decoded)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

/// Allocate shared state and spawn the pool threads of one generation.
fn start_pool<F: FrameStages>(
    config: &SchedulerConfig,
    capacity: Capacity,
    stats: &Arc<PipelineStats>,
) -> Result<(Arc<Shared<F>>, Vec<JoinHandle<Result<()>>>)> {
    let shared = Arc::new(Shared::new(config.clone(), capacity, Arc::clone(stats)));
    let mut handles = Vec::with_capacity(config.pool_threads());
    for worker_id in 1..config.num_threads {
        match spawn_worker(&shared, worker_id) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                shared.setup_ok.store(false, std::sync::atomic::Ordering::SeqCst);
                shared.start.open();
                if let Err(join_err) = join_worker_threads(handles) {
                    warn!("Worker failed during aborted setup: {join_err}");
                }
                return Err(e);
            }
        }
    }
    shared.setup_ok.store(true, std::sync::atomic::Ordering::SeqCst);
    shared.start.open();
    Ok((shared, handles))
}
