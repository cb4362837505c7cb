//! Row-parallel motion-field projection.
//!
//! Projection rows are claimed through a mutex-protected cursor by every thread that
//! reaches the stage. Reconstruction may not start until every row is projected, so the
//! completed-row count is published for the recon gate.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::collaborator::FrameStages;
use super::shared::Shared;
use super::stage::Stage;
use super::worker::WorkerContext;

/// Claim cursor and completion count for one frame's projection rows.
#[derive(Debug, Default)]
pub struct MotionProjection {
    rows: AtomicU32,
    cursor: Mutex<u32>,
    completed: AtomicU32,
}

impl MotionProjection {
    /// Create an empty projection with no rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for a frame with `rows` projection rows.
    pub fn reset(&self, rows: u32) {
        let mut cursor = self.cursor.lock();
        *cursor = 0;
        self.rows.store(rows, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    /// Number of projection rows this frame.
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows.load(Ordering::SeqCst)
    }

    /// Claim the next row, or `None` when all rows are claimed.
    pub fn claim(&self) -> Option<u32> {
        let mut cursor = self.cursor.lock();
        if *cursor >= self.rows() {
            return None;
        }
        let row = *cursor;
        *cursor += 1;
        Some(row)
    }

    /// Record a projected row.
    pub fn mark_done(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Rows projected so far.
    #[must_use]
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns true once every row is projected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed() >= self.rows()
    }
}

/// Claim and project rows until none are left.
pub(crate) fn drain_motion_projection<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &mut WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
) {
    let motion = &shared.state.motion;
    while let Some(row) = motion.claim() {
        if shared.is_aborted() {
            shared.stats.record_aborted_job();
            continue;
        }
        let result = shared.run_job(Stage::MotionProjection, row, ctx.worker_id(), || {
            frame.project_motion_row(row, scratch)
        });
        match result {
            Ok(()) => motion.mark_done(),
            Err(e) => {
                if !ctx.fail(shared, e) {
                    break;
                }
            }
        }
    }
}
