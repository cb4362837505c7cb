//! Frame pipeline state: tile records, row bitmaps and projection progress.
//!
//! Everything here is allocated once for a [`Capacity`] and reused frame after frame.
//! [`FrameState::configure`] installs a new frame's layout; the row bitmaps are cleared by
//! the queuing call of the stage that sets them and again by the frame barrier.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use super::motion_proj::MotionProjection;
use super::tile_progress::{TileLayout, TileProgress};
use crate::errors::{DecodeMtError, Result};
use crate::geometry::{Capacity, FrameGeometry};

/// A bitmap of completion flags that only ever go from clear to set between resets.
#[derive(Debug)]
pub struct RowMap {
    flags: Box<[AtomicBool]>,
}

impl RowMap {
    /// Create a cleared map with `len` flags.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { flags: (0..len).map(|_| AtomicBool::new(false)).collect() }
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if the map has no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Set flag `index`. Returns true if this call set it.
    pub fn set(&self, index: usize) -> bool {
        self.flags.get(index).is_some_and(|f| !f.swap(true, Ordering::SeqCst))
    }

    /// Returns true if flag `index` is set.
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        self.flags.get(index).is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Clear every flag.
    pub fn clear(&self) {
        for flag in &*self.flags {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Number of set flags.
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.flags.iter().filter(|f| f.load(Ordering::SeqCst)).count()
    }
}

/// Dimensions of the frame currently installed.
#[derive(Debug, Default)]
struct FrameDims {
    num_tiles: AtomicU32,
    tile_cols: AtomicU32,
    sb_rows: AtomicU32,
    /// Tiles queued for parsing this frame, `queued_start..queued_end`.
    queued_start: AtomicU32,
    queued_end: AtomicU32,
}

/// Shared per-frame scheduling state.
#[derive(Debug)]
pub struct FrameState {
    capacity: Capacity,
    dims: FrameDims,
    tiles: Box<[TileProgress]>,
    /// Reconstructed rows, indexed `frame_sb_row * tile_cols + tile_col`.
    pub sb_recon_row_map: RowMap,
    /// Loop-filtered frame rows.
    pub lf_row_map: RowMap,
    /// CDEF-filtered frame rows.
    pub cdef_completed_in_row: RowMap,
    /// Motion-field projection progress.
    pub motion: MotionProjection,
    /// Serialises tile-switch scans.
    pub tile_switch: Mutex<()>,
}

impl FrameState {
    /// Allocate state for frames up to `capacity`.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            dims: FrameDims::default(),
            tiles: (0..capacity.max_tiles)
                .map(|_| TileProgress::new(capacity.max_tile_sb_rows))
                .collect(),
            sb_recon_row_map: RowMap::new(capacity.max_sb_rows * capacity.max_tile_cols),
            lf_row_map: RowMap::new(capacity.max_sb_rows),
            cdef_completed_in_row: RowMap::new(capacity.max_sb_rows),
            motion: MotionProjection::new(),
            tile_switch: Mutex::new(()),
        }
    }

    /// Allocated capacity.
    #[must_use]
    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// Install `frame`'s layout and reset every tile record.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::CapacityExceeded`] if the frame does not fit.
    pub fn configure(&self, frame: &FrameGeometry) -> Result<()> {
        let needed = frame.required_capacity();
        check_fits("tiles", needed.max_tiles, self.capacity.max_tiles)?;
        check_fits("tile columns", needed.max_tile_cols, self.capacity.max_tile_cols)?;
        check_fits("superblock rows", needed.max_sb_rows, self.capacity.max_sb_rows)?;
        check_fits("tile rows", needed.max_tile_sb_rows, self.capacity.max_tile_sb_rows)?;

        self.dims.num_tiles.store(frame.num_tiles(), Ordering::SeqCst);
        self.dims.tile_cols.store(frame.tile_cols(), Ordering::SeqCst);
        self.dims.sb_rows.store(frame.sb_rows(), Ordering::SeqCst);
        self.set_queued_tiles(0, 0);
        for (i, tile) in self.tiles.iter().enumerate() {
            tile.configure(TileLayout::of(frame, i as u32));
        }
        Ok(())
    }

    /// Reset per-frame progress, keeping the installed layout.
    pub fn reset_progress(&self) {
        for tile in self.active_tiles() {
            tile.reset();
        }
        self.clear_row_maps();
    }

    /// Clear the three row bitmaps.
    pub fn clear_row_maps(&self) {
        self.sb_recon_row_map.clear();
        self.lf_row_map.clear();
        self.cdef_completed_in_row.clear();
    }

    /// Tiles in the installed frame.
    #[must_use]
    pub fn num_tiles(&self) -> u32 {
        self.dims.num_tiles.load(Ordering::SeqCst)
    }

    /// Tile columns in the installed frame.
    #[must_use]
    pub fn tile_cols(&self) -> u32 {
        self.dims.tile_cols.load(Ordering::SeqCst)
    }

    /// Superblock rows in the installed frame.
    #[must_use]
    pub fn sb_rows(&self) -> u32 {
        self.dims.sb_rows.load(Ordering::SeqCst)
    }

    /// Progress record of `tile`.
    #[must_use]
    pub fn tile(&self, tile: u32) -> Option<&TileProgress> {
        self.tiles.get(tile as usize)
    }

    /// Progress records of the installed frame's tiles.
    pub fn active_tiles(&self) -> &[TileProgress] {
        let n = (self.num_tiles() as usize).min(self.tiles.len());
        &self.tiles[..n]
    }

    /// Record that tiles `start..end` were queued for parsing this frame.
    pub fn set_queued_tiles(&self, start: u32, end: u32) {
        self.dims.queued_start.store(start, Ordering::SeqCst);
        self.dims.queued_end.store(end, Ordering::SeqCst);
    }

    /// First queued tile index and the progress records of the queued tiles.
    ///
    /// Only these tiles will ever be parsed this frame, so only they may be helped.
    #[must_use]
    pub fn queued_tiles(&self) -> (u32, &[TileProgress]) {
        let active = self.active_tiles();
        let end = (self.dims.queued_end.load(Ordering::SeqCst) as usize).min(active.len());
        let start = (self.dims.queued_start.load(Ordering::SeqCst) as usize).min(end);
        (start as u32, &active[start..end])
    }

    /// Index into `sb_recon_row_map` for a frame row and tile column.
    #[must_use]
    pub fn recon_index(&self, sb_row: u32, tile_col: u32) -> usize {
        sb_row as usize * self.tile_cols() as usize + tile_col as usize
    }

    /// Mark frame row `sb_row` of tile column `tile_col` reconstructed.
    pub fn mark_recon_row(&self, sb_row: u32, tile_col: u32) -> bool {
        self.sb_recon_row_map.set(self.recon_index(sb_row, tile_col))
    }

    /// Returns true if frame row `sb_row` is reconstructed in every tile column.
    #[must_use]
    pub fn is_recon_row_complete(&self, sb_row: u32) -> bool {
        (0..self.tile_cols()).all(|col| self.sb_recon_row_map.is_set(self.recon_index(sb_row, col)))
    }
}

fn check_fits(what: &'static str, requested: usize, capacity: usize) -> Result<()> {
    if requested > capacity {
        return Err(DecodeMtError::CapacityExceeded { what, requested, capacity });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PictureGeometry, SuperblockSize};

    fn frame_2x2() -> FrameGeometry {
        FrameGeometry::uniform(PictureGeometry::new(256, 256, SuperblockSize::Sb64), 2, 2).unwrap()
    }

    #[test]
    fn test_row_map_sets_once() {
        let map = RowMap::new(3);
        assert!(map.set(1));
        assert!(!map.set(1));
        assert!(!map.set(7));
        assert!(map.is_set(1));
        assert!(!map.is_set(7));
        assert_eq!(map.count_set(), 1);
        map.clear();
        assert_eq!(map.count_set(), 0);
    }

    #[test]
    fn test_configure_installs_layout() {
        let frame = frame_2x2();
        let state = FrameState::new(frame.required_capacity());
        state.configure(&frame).unwrap();

        assert_eq!(state.num_tiles(), 4);
        assert_eq!(state.tile_cols(), 2);
        assert_eq!(state.sb_rows(), 4);
        assert_eq!(state.active_tiles().len(), 4);
        assert_eq!(state.tile(2).unwrap().layout().sb_row_start, 2);
    }

    #[test]
    fn test_configure_rejects_oversized_frame() {
        let small = frame_2x2();
        let big = FrameGeometry::uniform(PictureGeometry::new(512, 512, SuperblockSize::Sb64), 4, 2)
            .unwrap();
        let state = FrameState::new(small.required_capacity());
        let err = state.configure(&big).unwrap_err();
        assert!(matches!(err, DecodeMtError::CapacityExceeded { what: "tiles", .. }));
    }

    #[test]
    fn test_recon_row_needs_every_tile_column() {
        let frame = frame_2x2();
        let state = FrameState::new(frame.required_capacity());
        state.configure(&frame).unwrap();

        assert!(state.mark_recon_row(1, 0));
        assert!(!state.is_recon_row_complete(1));
        assert!(state.mark_recon_row(1, 1));
        assert!(state.is_recon_row_complete(1));
        assert!(!state.is_recon_row_complete(0));

        state.reset_progress();
        assert!(!state.is_recon_row_complete(1));
        assert_eq!(state.sb_recon_row_map.count_set(), 0);
    }
}
