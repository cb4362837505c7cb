//! The five per-frame pipeline stages.

use std::fmt;

/// Number of pipeline stages.
pub const NUM_STAGES: usize = 5;

/// One stage of the per-frame decode pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Motion-field projection from reference frames (row parallel)
    MotionProjection,
    /// Tile entropy parse (tile parallel)
    Parse,
    /// Tile reconstruction (tile parallel with row-level stealing)
    Recon,
    /// Deblocking loop filter (superblock-row parallel)
    LoopFilter,
    /// Constrained directional enhancement filter (superblock-row parallel)
    Cdef,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; NUM_STAGES] =
        [Stage::MotionProjection, Stage::Parse, Stage::Recon, Stage::LoopFilter, Stage::Cdef];

    /// Position of the stage in pipeline order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Stage::MotionProjection => 0,
            Stage::Parse => 1,
            Stage::Recon => 2,
            Stage::LoopFilter => 3,
            Stage::Cdef => 4,
        }
    }

    /// Convert from stage index to `Stage`.
    #[must_use]
    pub const fn from_index(idx: usize) -> Stage {
        match idx {
            0 => Stage::MotionProjection,
            1 => Stage::Parse,
            2 => Stage::Recon,
            3 => Stage::LoopFilter,
            _ => Stage::Cdef,
        }
    }

    /// Get short name for display.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Stage::MotionProjection => "Mp",
            Stage::Parse => "Pa",
            Stage::Recon => "Re",
            Stage::LoopFilter => "Lf",
            Stage::Cdef => "Cd",
        }
    }

    /// Returns true if jobs of this stage are indexed by tile rather than superblock row.
    #[must_use]
    pub const fn is_tile_stage(self) -> bool {
        matches!(self, Stage::Parse | Stage::Recon)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::MotionProjection => "motion projection",
            Stage::Parse => "parse",
            Stage::Recon => "recon",
            Stage::LoopFilter => "loop filter",
            Stage::Cdef => "cdef",
        };
        f.write_str(name)
    }
}

/// A parse or reconstruction job: one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileJob {
    /// Raster tile index
    pub tile: u32,
}

/// A loop-filter or CDEF job: one superblock row of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowJob {
    /// Frame superblock row
    pub row: u32,
}
