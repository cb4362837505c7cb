//! Row-level gating for the post-filters.
//!
//! Loop filter row `r` reads reconstructed pixels from rows `r-1`, `r` and `r+1`, so it
//! starts only when those rows are reconstructed in every tile column. CDEF row `r` reads
//! deblocked pixels from rows `r` and `r+1`, so it starts only when both are loop
//! filtered. Rows at the picture edge clamp to the rows that exist.

use super::collaborator::FrameStages;
use super::shared::Shared;
use super::stage::{RowJob, Stage};
use super::state::FrameState;
use super::worker::WorkerContext;
use crate::errors::Result;

/// Frame rows loop filter row `row` depends on: `r-1`, `r`, `r+1`, clamped.
#[must_use]
pub fn lf_dependencies(row: u32, sb_rows: u32) -> [u32; 3] {
    let last = sb_rows.saturating_sub(1);
    [row.saturating_sub(1), row, (row + 1).min(last)]
}

/// Frame rows CDEF row `row` depends on: `r` and `r+1`, or `r` alone for the last row.
#[must_use]
pub fn cdef_dependencies(row: u32, sb_rows: u32) -> [u32; 2] {
    let offset = u32::from(row + 1 < sb_rows);
    [row, row + offset]
}

/// Returns true if loop filter row `row` may start.
#[must_use]
pub fn lf_ready(state: &FrameState, row: u32) -> bool {
    lf_dependencies(row, state.sb_rows()).iter().all(|&r| state.is_recon_row_complete(r))
}

/// Returns true if CDEF row `row` may start.
#[must_use]
pub fn cdef_ready(state: &FrameState, row: u32) -> bool {
    cdef_dependencies(row, state.sb_rows())
        .iter()
        .all(|&r| state.lf_row_map.is_set(r as usize))
}

/// Clear the loop filter map and post one job per frame row.
pub(crate) fn queue_lf_jobs<F>(shared: &Shared<F>) {
    shared.state.lf_row_map.clear();
    for row in 0..shared.state.sb_rows() {
        let slot = shared.lf_pool.acquire_empty();
        shared.lf_pool.post_full(slot, RowJob { row });
    }
}

/// Clear the CDEF map and post one job per frame row.
pub(crate) fn queue_cdef_jobs<F>(shared: &Shared<F>) {
    shared.state.cdef_completed_in_row.clear();
    for row in 0..shared.state.sb_rows() {
        let slot = shared.cdef_pool.acquire_empty();
        shared.cdef_pool.post_full(slot, RowJob { row });
    }
}

/// Drain the loop filter queue.
pub(crate) fn drain_lf<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &mut WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
) {
    while let Some(full) = shared.lf_pool.get_full_nonblocking() {
        let row = full.job().row;
        shared.lf_pool.release(full);
        if shared.is_aborted() {
            shared.stats.record_aborted_job();
            continue;
        }
        if let Err(e) = filter_lf_row(shared, ctx, frame, scratch, row) {
            if !ctx.fail(shared, e) {
                break;
            }
        }
    }
}

fn filter_lf_row<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
    row: u32,
) -> Result<()> {
    let state = &shared.state;
    shared.poller().wait_until(
        Stage::LoopFilter,
        || lf_ready(state, row),
        || format!("reconstruction of rows {:?}", lf_dependencies(row, state.sb_rows())),
    )?;

    shared.run_job(Stage::LoopFilter, row, ctx.worker_id(), || {
        if frame.loop_filter_enabled() {
            frame.loop_filter_row(row, scratch)?;
        }
        frame.save_boundary_lines(row, scratch)
    })?;

    state.lf_row_map.set(row as usize);
    Ok(())
}

/// Drain the CDEF queue.
pub(crate) fn drain_cdef<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &mut WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
) {
    while let Some(full) = shared.cdef_pool.get_full_nonblocking() {
        let row = full.job().row;
        shared.cdef_pool.release(full);
        if shared.is_aborted() {
            shared.stats.record_aborted_job();
            continue;
        }
        if let Err(e) = filter_cdef_row(shared, ctx, frame, scratch, row) {
            if !ctx.fail(shared, e) {
                break;
            }
        }
    }
}

fn filter_cdef_row<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
    row: u32,
) -> Result<()> {
    let state = &shared.state;
    shared.poller().wait_until(
        Stage::Cdef,
        || cdef_ready(state, row),
        || format!("loop filter of rows {:?}", cdef_dependencies(row, state.sb_rows())),
    )?;

    if frame.cdef_enabled() {
        shared.run_job(Stage::Cdef, row, ctx.worker_id(), || frame.cdef_row(row, scratch))?;
    }

    state.cdef_completed_in_row.set(row as usize);
    Ok(())
}
