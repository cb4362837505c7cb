//! Tile-level scheduling: parse and reconstruction.
//!
//! # Parse
//!
//! The driver posts one parse job per tile before the frame starts. Every thread drains
//! the parse queue without blocking. Popping a parse job immediately posts the matching
//! reconstruction job and opens the recon stage, so reconstruction of a tile's first rows
//! overlaps with parsing of its later rows.
//!
//! # Reconstruction
//!
//! Threads first drain the recon queue, each popped tile being decoded row by row through
//! the tile's claim cursor. Once the queue is empty a thread looks for the incomplete tile
//! with the most unclaimed rows (ties to the lowest index) and joins in on that tile. Row
//! claims go through the tile's mutex, so two threads working the same tile interleave
//! rows without ever decoding one twice. A thread leaves the stage when every row of every
//! tile has been claimed.

use std::ops::RangeInclusive;

use log::debug;

use super::collaborator::FrameStages;
use super::config::TileSwitchStrategy;
use super::shared::Shared;
use super::stage::{Stage, TileJob};
use super::tile_progress::{TileParseProgress, TileProgress, TopRightSync};
use super::worker::WorkerContext;
use crate::errors::{DecodeMtError, Result};

/// Pick the tile a thread should help once the recon queue is empty.
///
/// `tiles` yields `(num_sb_rows, first_unclaimed_row)` per tile in index order. Tiles
/// with every row claimed are skipped.
#[must_use]
pub fn select_steal_target(
    strategy: TileSwitchStrategy,
    tiles: impl IntoIterator<Item = (u32, u32)>,
) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, (rows, claimed)) in tiles.into_iter().enumerate() {
        if claimed >= rows {
            continue;
        }
        let pending = rows - claimed;
        match strategy {
            TileSwitchStrategy::LowestIndex => return Some(index),
            TileSwitchStrategy::MostRowsPending => {
                // Strictly greater keeps the lowest index on ties.
                if best.is_none_or(|(_, most)| pending > most) {
                    best = Some((index, pending));
                }
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Post one parse job per tile in `tiles` and clear the reconstruction row map.
///
/// Helpers in the recon stage only switch to tiles of this range. The post-filters gate
/// on every tile column of the frame, so `decode_frame` always queues the whole frame as
/// one tile group.
pub(crate) fn queue_parse_jobs<F>(shared: &Shared<F>, tiles: RangeInclusive<u32>) -> Result<()> {
    let num_tiles = shared.state.num_tiles();
    if tiles.is_empty() || *tiles.end() >= num_tiles {
        return Err(DecodeMtError::invalid_parameter(
            "tile range",
            format!("{}..={} outside 0..{num_tiles}", tiles.start(), tiles.end()),
        ));
    }
    shared.state.sb_recon_row_map.clear();
    shared.state.set_queued_tiles(*tiles.start(), *tiles.end() + 1);
    for tile in tiles {
        let slot = shared.parse_pool.acquire_empty();
        shared.parse_pool.post_full(slot, TileJob { tile });
    }
    Ok(())
}

/// Drain the parse queue.
pub(crate) fn drain_parse<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &mut WorkerContext,
    frame: &F,
) {
    while let Some(full) = shared.parse_pool.get_full_nonblocking() {
        let tile = full.job().tile;
        shared.parse_pool.release(full);
        if shared.is_aborted() {
            shared.stats.record_aborted_job();
            continue;
        }

        let slot = shared.recon_pool.acquire_empty();
        shared.recon_pool.post_full(slot, TileJob { tile });
        shared.open_stage(Stage::Recon);

        let Some(record) = shared.state.tile(tile) else {
            continue;
        };
        let progress = TileParseProgress::new(tile, record);
        let result = shared.run_job(Stage::Parse, tile, ctx.worker_id(), || {
            frame.parse_tile(tile, &progress)
        });
        if let Err(e) = result {
            if !ctx.fail(shared, e) {
                break;
            }
        }
    }
}

/// Drain the recon queue, then help unfinished tiles until every row is claimed.
pub(crate) fn drain_recon<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &mut WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
) {
    loop {
        let tile = if let Some(full) = shared.recon_pool.get_full_nonblocking() {
            let tile = full.job().tile;
            shared.recon_pool.release(full);
            if shared.is_aborted() {
                shared.stats.record_aborted_job();
                continue;
            }
            tile
        } else {
            if shared.is_aborted() {
                break;
            }
            let Some(tile) = pick_tile_to_help(shared) else {
                break;
            };
            shared.stats.record_tile_switch();
            debug!("Worker {} switching to tile {tile}", ctx.worker_id());
            tile
        };

        if let Err(e) = decode_tile(shared, ctx, frame, scratch, tile) {
            if !ctx.fail(shared, e) {
                break;
            }
        }
    }
}

fn pick_tile_to_help<F>(shared: &Shared<F>) -> Option<u32> {
    let _switch = shared.state.tile_switch.lock();
    let (first, tiles) = shared.state.queued_tiles();
    select_steal_target(shared.config.tile_switch, tiles.iter().map(TileProgress::claim_snapshot))
        .map(|index| first + index as u32)
}

/// Reconstruct rows of `tile` until none are left to claim.
fn decode_tile<F: FrameStages>(
    shared: &Shared<F>,
    ctx: &WorkerContext,
    frame: &F,
    scratch: &mut F::Scratch,
    tile: u32,
) -> Result<()> {
    let Some(record) = shared.state.tile(tile) else {
        return Ok(());
    };
    let layout = record.layout();
    let poller = shared.poller();

    while let Some(row) = record.claim_next_row() {
        poller.wait_until(
            Stage::Recon,
            || record.is_row_parsed(row) && shared.state.motion.is_complete(),
            || format!("tile {tile} row {row} to be parsed and motion projected"),
        )?;

        let sync = TopRightSync::new(record, row, poller);
        shared.run_job(Stage::Recon, tile, ctx.worker_id(), || {
            frame.decode_tile_row(tile, row, &sync, scratch)
        })?;

        record.finish_row(row);
        shared.state.mark_recon_row(layout.sb_row_start + row, layout.tile_col);
    }
    Ok(())
}
