//! The interface the scheduler drives for each frame.
//!
//! A decoder hands the scheduler one [`FrameStages`] value per frame. The scheduler calls
//! its methods from any worker thread, in an order constrained only by the row and tile
//! dependencies:
//!
//! | Call                  | Unit              | Starts after                                   |
//! |-----------------------|-------------------|------------------------------------------------|
//! | `project_motion_row`  | projection row    | frame start                                    |
//! | `parse_tile`          | tile              | frame start                                    |
//! | `decode_tile_row`     | tile-local SB row | row parsed, all projection rows done            |
//! | `loop_filter_row`     | frame SB row      | rows `r-1..=r+1` reconstructed in every column  |
//! | `cdef_row`            | frame SB row      | rows `r` and `r+1` loop filtered                |
//!
//! All methods take `&self`; implementations keep their per-superblock buffers behind
//! interior mutability and rely on the scheduler's ordering for exclusive access.

use super::tile_progress::{TileParseProgress, TopRightSync};
use crate::geometry::FrameGeometry;

/// Per-frame decode work driven by the scheduler.
pub trait FrameStages: Send + Sync + 'static {
    /// Private per-thread scratch space, created once per frame per thread.
    type Scratch: Send;

    /// Geometry of this frame.
    fn geometry(&self) -> &FrameGeometry;

    /// Create scratch space for thread `worker_id` (0 is the driver).
    fn create_scratch(&self, worker_id: usize) -> Self::Scratch;

    /// Number of motion-field projection rows; zero skips the stage.
    fn motion_projection_rows(&self) -> u32 {
        0
    }

    /// Project motion for one row.
    fn project_motion_row(&self, _row: u32, _scratch: &mut Self::Scratch) -> anyhow::Result<()> {
        Ok(())
    }

    /// Entropy-parse `tile`, reporting each finished row through `progress`.
    fn parse_tile(&self, tile: u32, progress: &TileParseProgress<'_>) -> anyhow::Result<()>;

    /// Reconstruct tile-local superblock `row` of `tile`.
    ///
    /// Before each superblock `c` the implementation calls
    /// [`TopRightSync::wait_top_right`]`(c)` and after it [`TopRightSync::mark_sb_done`].
    fn decode_tile_row(
        &self,
        tile: u32,
        row: u32,
        sync: &TopRightSync<'_>,
        scratch: &mut Self::Scratch,
    ) -> anyhow::Result<()>;

    /// Returns false to skip the deblocking kernel this frame. Rows are still gated and
    /// marked.
    fn loop_filter_enabled(&self) -> bool {
        true
    }

    /// Deblock frame superblock `row`.
    fn loop_filter_row(&self, row: u32, scratch: &mut Self::Scratch) -> anyhow::Result<()>;

    /// Save the unfiltered boundary lines of `row` for loop restoration. Runs after the
    /// loop filter of the row, whether or not the filter is enabled.
    fn save_boundary_lines(&self, _row: u32, _scratch: &mut Self::Scratch) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns false to skip the CDEF kernel this frame. Rows are still gated and marked.
    fn cdef_enabled(&self) -> bool {
        true
    }

    /// Apply CDEF to frame superblock `row`.
    fn cdef_row(&self, row: u32, scratch: &mut Self::Scratch) -> anyhow::Result<()>;
}
