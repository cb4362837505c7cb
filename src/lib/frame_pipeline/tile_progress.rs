//! Per-tile progress records and the handles collaborators use to report progress.
//!
//! A [`TileProgress`] tracks, for one tile:
//! - which superblock rows have been entropy parsed (`row_parsed`)
//! - which rows have been claimed for reconstruction (`row_started`, plus a cursor)
//! - how many superblocks of each row are reconstructed (`completed_in_row`)
//!
//! Rows are claimed in order through the cursor under the tile's mutex, so a row is never
//! claimed twice and `row_started` is set at most once per frame.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use super::backoff::Poller;
use super::stage::Stage;
use crate::errors::Result;
use crate::geometry::{FrameGeometry, TileGeometry};

/// Layout of one tile in the current frame, in superblock units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileLayout {
    /// Tile bounds in MI blocks
    pub bounds: Option<TileGeometry>,
    /// Tile column within the tile grid
    pub tile_col: u32,
    /// Frame superblock row of the tile's first row
    pub sb_row_start: u32,
    /// Superblock rows in the tile
    pub num_sb_rows: u32,
    /// Superblock columns in the tile
    pub num_sb_cols: u32,
}

impl TileLayout {
    /// Layout of tile `tile` of `frame`.
    #[must_use]
    pub fn of(frame: &FrameGeometry, tile: u32) -> Self {
        let sb_size = frame.picture().sb_size;
        frame.tile(tile).map_or_else(Self::default, |bounds| Self {
            bounds: Some(*bounds),
            tile_col: frame.tile_col_of(tile),
            sb_row_start: bounds.sb_row_start(sb_size),
            num_sb_rows: bounds.num_sb_rows(sb_size),
            num_sb_cols: bounds.num_sb_cols(sb_size),
        })
    }
}

/// Progress record of one tile.
#[derive(Debug)]
pub struct TileProgress {
    layout: RwLock<TileLayout>,
    cursor: Mutex<u32>,
    row_parsed: Box<[AtomicBool]>,
    row_started: Box<[AtomicBool]>,
    completed_in_row: Box<[AtomicU32]>,
}

impl TileProgress {
    /// Create a record able to track `max_rows` superblock rows.
    #[must_use]
    pub fn new(max_rows: usize) -> Self {
        Self {
            layout: RwLock::new(TileLayout::default()),
            cursor: Mutex::new(0),
            row_parsed: (0..max_rows).map(|_| AtomicBool::new(false)).collect(),
            row_started: (0..max_rows).map(|_| AtomicBool::new(false)).collect(),
            completed_in_row: (0..max_rows).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Number of rows this record can track.
    #[must_use]
    pub fn max_rows(&self) -> usize {
        self.row_parsed.len()
    }

    /// Current layout.
    #[must_use]
    pub fn layout(&self) -> TileLayout {
        *self.layout.read()
    }

    /// Install a new layout and reset all progress.
    pub fn configure(&self, layout: TileLayout) {
        *self.layout.write() = layout;
        self.reset();
    }

    /// Reset the cursor and every bitmap.
    pub fn reset(&self) {
        let mut cursor = self.cursor.lock();
        *cursor = 0;
        for i in 0..self.max_rows() {
            self.row_parsed[i].store(false, Ordering::SeqCst);
            self.row_started[i].store(false, Ordering::SeqCst);
            self.completed_in_row[i].store(0, Ordering::SeqCst);
        }
    }

    /// Claim the next unclaimed row for reconstruction.
    ///
    /// Returns the tile-local row, or `None` if every row has been claimed.
    pub fn claim_next_row(&self) -> Option<u32> {
        let rows = self.layout.read().num_sb_rows;
        let mut cursor = self.cursor.lock();
        if *cursor >= rows {
            return None;
        }
        let row = *cursor;
        let already = self.row_started[row as usize].swap(true, Ordering::SeqCst);
        debug_assert!(!already, "row {row} claimed twice");
        *cursor += 1;
        Some(row)
    }

    /// `(num_sb_rows, cursor)` read under the tile mutex.
    #[must_use]
    pub fn claim_snapshot(&self) -> (u32, u32) {
        let rows = self.layout.read().num_sb_rows;
        let cursor = self.cursor.lock();
        (rows, *cursor)
    }

    /// Record that `row` has been parsed.
    pub fn mark_row_parsed(&self, row: u32) {
        if let Some(flag) = self.row_parsed.get(row as usize) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Returns true if `row` has been parsed.
    #[must_use]
    pub fn is_row_parsed(&self, row: u32) -> bool {
        self.row_parsed.get(row as usize).is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Superblocks of `row` reconstructed so far.
    #[must_use]
    pub fn completed_in_row(&self, row: u32) -> u32 {
        self.completed_in_row.get(row as usize).map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Count one more reconstructed superblock in `row`.
    pub fn mark_sb_done(&self, row: u32) {
        if let Some(count) = self.completed_in_row.get(row as usize) {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Mark every superblock of `row` reconstructed.
    pub fn finish_row(&self, row: u32) {
        let cols = self.layout.read().num_sb_cols;
        if let Some(count) = self.completed_in_row.get(row as usize) {
            count.fetch_max(cols, Ordering::SeqCst);
        }
    }
}

/// Handle passed to `parse_tile` for reporting parsed rows.
#[derive(Debug, Clone, Copy)]
pub struct TileParseProgress<'a> {
    tile: u32,
    progress: &'a TileProgress,
}

impl<'a> TileParseProgress<'a> {
    pub(crate) fn new(tile: u32, progress: &'a TileProgress) -> Self {
        Self { tile, progress }
    }

    /// Tile being parsed.
    #[must_use]
    pub fn tile(&self) -> u32 {
        self.tile
    }

    /// Superblock rows in the tile.
    #[must_use]
    pub fn num_sb_rows(&self) -> u32 {
        self.progress.layout().num_sb_rows
    }

    /// Report that tile-local `row` is fully parsed. Reconstruction of that row may
    /// start immediately.
    pub fn mark_row_parsed(&self, row: u32) {
        self.progress.mark_row_parsed(row);
    }
}

/// Handle passed to `decode_tile_row` for intra-tile top-right synchronisation.
///
/// Superblock `c` of row `r` may depend on superblocks up to `c + 1` of row `r - 1`, so it
/// waits until row `r - 1` has completed `min(c + 2, tile_sb_cols)` superblocks.
#[derive(Debug, Clone, Copy)]
pub struct TopRightSync<'a> {
    progress: &'a TileProgress,
    row: u32,
    sb_cols: u32,
    poller: Poller<'a>,
}

impl<'a> TopRightSync<'a> {
    pub(crate) fn new(progress: &'a TileProgress, row: u32, poller: Poller<'a>) -> Self {
        Self { progress, row, sb_cols: progress.layout().num_sb_cols, poller }
    }

    /// Tile-local row being reconstructed.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Superblock columns in the tile.
    #[must_use]
    pub fn sb_cols(&self) -> u32 {
        self.sb_cols
    }

    /// Number of superblocks of the row above that must be complete before `col` starts.
    #[must_use]
    pub fn required_above(&self, col: u32) -> u32 {
        (col + 2).min(self.sb_cols)
    }

    /// Block until the superblocks above and above-right of `col` are reconstructed.
    ///
    /// # Errors
    /// Returns [`crate::errors::DecodeMtError::Aborted`] if the frame is aborted while
    /// waiting.
    pub fn wait_top_right(&self, col: u32) -> Result<()> {
        if self.row == 0 {
            return Ok(());
        }
        let above = self.row - 1;
        let needed = self.required_above(col);
        self.poller.wait_until(
            Stage::Recon,
            || self.progress.completed_in_row(above) >= needed,
            || format!("row {above} to complete {needed} superblocks"),
        )
    }

    /// Report that the next superblock of this row is reconstructed.
    pub fn mark_sb_done(&self) {
        self.progress.mark_sb_done(self.row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_pipeline::config::SchedulerConfig;
    use crate::frame_pipeline::stats::PipelineStats;
    use crate::geometry::{PictureGeometry, SuperblockSize};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn layout(rows: u32, cols: u32) -> TileLayout {
        TileLayout { bounds: None, tile_col: 0, sb_row_start: 0, num_sb_rows: rows, num_sb_cols: cols }
    }

    #[test]
    fn test_layout_of_tile() {
        let picture = PictureGeometry::new(256, 256, SuperblockSize::Sb64);
        let frame = FrameGeometry::uniform(picture, 2, 2).unwrap();
        let layout = TileLayout::of(&frame, 3);
        assert_eq!(layout.tile_col, 1);
        assert_eq!(layout.sb_row_start, 2);
        assert_eq!(layout.num_sb_rows, 2);
        assert_eq!(layout.num_sb_cols, 2);
        assert_eq!(TileLayout::of(&frame, 9), TileLayout::default());
    }

    #[test]
    fn test_claims_are_ordered_and_bounded() {
        let tile = TileProgress::new(8);
        tile.configure(layout(3, 2));
        assert_eq!(tile.claim_next_row(), Some(0));
        assert_eq!(tile.claim_next_row(), Some(1));
        assert_eq!(tile.claim_snapshot(), (3, 2));
        assert_eq!(tile.claim_next_row(), Some(2));
        assert_eq!(tile.claim_next_row(), None);
        assert_eq!(tile.claim_snapshot(), (3, 3));

        tile.reset();
        assert_eq!(tile.claim_snapshot(), (3, 0));
        assert_eq!(tile.claim_next_row(), Some(0));
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let tile = Arc::new(TileProgress::new(512));
        tile.configure(layout(512, 1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tile = Arc::clone(&tile);
                thread::spawn(move || {
                    let mut rows = Vec::new();
                    while let Some(row) = tile.claim_next_row() {
                        rows.push(row);
                    }
                    rows
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            let rows = handle.join().unwrap();
            assert!(rows.windows(2).all(|w| w[0] < w[1]), "claims out of order: {rows:?}");
            for row in rows {
                assert!(seen.insert(row));
            }
        }
        assert_eq!(seen.len(), 512);
    }

    #[test]
    fn test_parse_progress_and_completion_counts() {
        let tile = TileProgress::new(4);
        tile.configure(layout(2, 3));
        let progress = TileParseProgress::new(5, &tile);
        assert_eq!(progress.tile(), 5);
        assert_eq!(progress.num_sb_rows(), 2);
        progress.mark_row_parsed(1);
        assert!(!tile.is_row_parsed(0));
        assert!(tile.is_row_parsed(1));
        assert!(!tile.is_row_parsed(99));

        tile.mark_sb_done(0);
        assert_eq!(tile.completed_in_row(0), 1);
        tile.finish_row(0);
        assert_eq!(tile.completed_in_row(0), 3);
    }

    #[test]
    fn test_top_right_requirement() {
        let abort = AtomicBool::new(false);
        let config = SchedulerConfig::new(1);
        let stats = PipelineStats::new(1);
        let tile = TileProgress::new(4);
        tile.configure(layout(2, 4));
        let sync = TopRightSync::new(&tile, 1, Poller::new(&abort, &config, &stats));

        assert_eq!(sync.required_above(0), 2);
        assert_eq!(sync.required_above(2), 4);
        assert_eq!(sync.required_above(3), 4);

        tile.mark_sb_done(0);
        tile.mark_sb_done(0);
        sync.wait_top_right(0).unwrap();
        sync.mark_sb_done();
        assert_eq!(tile.completed_in_row(1), 1);
    }

    #[test]
    fn test_top_right_wait_unblocks_on_progress() {
        let abort = Arc::new(AtomicBool::new(false));
        let config = Arc::new(SchedulerConfig::new(2));
        let stats = Arc::new(PipelineStats::new(2));
        let tile = Arc::new(TileProgress::new(2));
        tile.configure(layout(2, 3));

        let producer = {
            let tile = Arc::clone(&tile);
            thread::spawn(move || {
                for _ in 0..3 {
                    thread::sleep(std::time::Duration::from_millis(2));
                    tile.mark_sb_done(0);
                }
            })
        };
        let sync = TopRightSync::new(&tile, 1, Poller::new(&abort, &config, &stats));
        sync.wait_top_right(2).unwrap();
        assert_eq!(tile.completed_in_row(0), 3);
        producer.join().unwrap();
    }
}
