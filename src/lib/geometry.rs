//! Picture and tile geometry.
//!
//! Geometry is expressed in three units:
//! - pixels, for the picture size
//! - mode-info (MI) blocks of 4x4 pixels, for tile bounds
//! - superblocks (SB) of 64x64 or 128x128 pixels, for scheduling
//!
//! Tiles are numbered in raster order (`tile_row * tile_cols + tile_col`). Every tile in a
//! tile row spans the same superblock rows.
//!
//! [`GeometryCheck`] caches the previous frame's geometry and decides whether the
//! scheduler's frame state can be reused as is, must be re-initialised for the new layout,
//! or must be reallocated because the new frame no longer fits.

use std::fmt;

use clap::ValueEnum;

use crate::errors::{DecodeMtError, Result};

/// log2 of the MI block size in pixels.
pub const MI_SIZE_LOG2: u32 = 2;

/// Superblock size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum SuperblockSize {
    /// 64x64 pixels
    #[default]
    #[value(name = "64")]
    Sb64,
    /// 128x128 pixels
    #[value(name = "128")]
    Sb128,
}

impl SuperblockSize {
    /// log2 of the superblock size in pixels.
    #[must_use]
    pub const fn log2(self) -> u32 {
        match self {
            Self::Sb64 => 6,
            Self::Sb128 => 7,
        }
    }

    /// Superblock edge in pixels.
    #[must_use]
    pub const fn pixels(self) -> u32 {
        1 << self.log2()
    }

    /// Superblock edge in MI blocks.
    #[must_use]
    pub const fn mi_blocks(self) -> u32 {
        1 << (self.log2() - MI_SIZE_LOG2)
    }
}

impl fmt::Display for SuperblockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}x{0}", self.pixels())
    }
}

/// Picture-level geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Superblock size
    pub sb_size: SuperblockSize,
    /// Number of colour planes (1 for monochrome)
    pub num_planes: u8,
    /// Sample bit depth
    pub bit_depth: u8,
}

impl PictureGeometry {
    /// Create an 8-bit 4:2:0 picture geometry.
    #[must_use]
    pub fn new(width: u32, height: u32, sb_size: SuperblockSize) -> Self {
        Self { width, height, sb_size, num_planes: 3, bit_depth: 8 }
    }

    /// Set the bit depth.
    #[must_use]
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Set the number of planes.
    #[must_use]
    pub fn with_num_planes(mut self, num_planes: u8) -> Self {
        self.num_planes = num_planes;
        self
    }

    /// Picture height in MI blocks, rounded up to an even count.
    #[must_use]
    pub fn mi_rows(&self) -> u32 {
        ((self.height + 7) >> 3) << 1
    }

    /// Picture width in MI blocks, rounded up to an even count.
    #[must_use]
    pub fn mi_cols(&self) -> u32 {
        ((self.width + 7) >> 3) << 1
    }

    /// Picture height in superblocks.
    #[must_use]
    pub fn sb_rows(&self) -> u32 {
        self.mi_rows().div_ceil(self.sb_size.mi_blocks())
    }

    /// Picture width in superblocks.
    #[must_use]
    pub fn sb_cols(&self) -> u32 {
        self.mi_cols().div_ceil(self.sb_size.mi_blocks())
    }

    /// Check the picture parameters.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::InvalidGeometry`] for an empty picture, an unsupported
    /// plane count or an unsupported bit depth.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DecodeMtError::invalid_geometry(format!(
                "picture size {}x{} is empty",
                self.width, self.height
            )));
        }
        if !(1..=3).contains(&self.num_planes) {
            return Err(DecodeMtError::invalid_geometry(format!(
                "{} planes (expected 1 to 3)",
                self.num_planes
            )));
        }
        if !matches!(self.bit_depth, 8 | 10 | 12) {
            return Err(DecodeMtError::invalid_geometry(format!(
                "bit depth {} (expected 8, 10 or 12)",
                self.bit_depth
            )));
        }
        Ok(())
    }
}

/// Bounds of one tile in MI blocks (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileGeometry {
    /// First MI row
    pub mi_row_start: u32,
    /// One past the last MI row
    pub mi_row_end: u32,
    /// First MI column
    pub mi_col_start: u32,
    /// One past the last MI column
    pub mi_col_end: u32,
}

impl TileGeometry {
    /// Number of superblock rows the tile touches.
    #[must_use]
    pub fn num_sb_rows(&self, sb_size: SuperblockSize) -> u32 {
        span_in_sb(self.mi_row_start, self.mi_row_end, sb_size)
    }

    /// Number of superblock columns the tile touches.
    #[must_use]
    pub fn num_sb_cols(&self, sb_size: SuperblockSize) -> u32 {
        span_in_sb(self.mi_col_start, self.mi_col_end, sb_size)
    }

    /// Frame superblock row of the tile's first row.
    #[must_use]
    pub fn sb_row_start(&self, sb_size: SuperblockSize) -> u32 {
        (self.mi_row_start << MI_SIZE_LOG2) >> sb_size.log2()
    }

    /// Frame superblock column of the tile's first column.
    #[must_use]
    pub fn sb_col_start(&self, sb_size: SuperblockSize) -> u32 {
        (self.mi_col_start << MI_SIZE_LOG2) >> sb_size.log2()
    }
}

fn span_in_sb(mi_start: u32, mi_end: u32, sb_size: SuperblockSize) -> u32 {
    if mi_end <= mi_start {
        return 0;
    }
    let log2 = sb_size.log2();
    (((mi_end - 1) << MI_SIZE_LOG2) >> log2) - ((mi_start << MI_SIZE_LOG2) >> log2) + 1
}

/// Full geometry of one frame: picture plus tile layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    picture: PictureGeometry,
    tile_cols: u32,
    tile_rows: u32,
    tiles: Vec<TileGeometry>,
}

impl FrameGeometry {
    /// Split the picture into `tile_cols` x `tile_rows` tiles of (nearly) equal size in
    /// superblocks. The last tile in each direction absorbs the remainder.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::InvalidGeometry`] if the picture is invalid or has fewer
    /// superblocks than tiles in either direction.
    pub fn uniform(picture: PictureGeometry, tile_cols: u32, tile_rows: u32) -> Result<Self> {
        picture.validate()?;
        let col_starts = uniform_starts(picture.sb_cols(), tile_cols, "column")?;
        let row_starts = uniform_starts(picture.sb_rows(), tile_rows, "row")?;
        Self::from_sb_starts(picture, &col_starts, &row_starts)
    }

    /// Build a tile layout from explicit superblock start positions.
    ///
    /// `col_starts` and `row_starts` list the first superblock column (row) of each tile
    /// column (row); both must start at zero and be strictly increasing.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::InvalidGeometry`] if the starts are empty, do not begin at
    /// zero, are not strictly increasing, or fall outside the picture.
    pub fn from_sb_starts(
        picture: PictureGeometry,
        col_starts: &[u32],
        row_starts: &[u32],
    ) -> Result<Self> {
        picture.validate()?;
        check_starts(col_starts, picture.sb_cols(), "column")?;
        check_starts(row_starts, picture.sb_rows(), "row")?;

        let mi_per_sb = picture.sb_size.mi_blocks();
        let mi_bounds = |starts: &[u32], i: usize, mi_total: u32| {
            let start = starts[i] * mi_per_sb;
            let end = starts.get(i + 1).map_or(mi_total, |next| (next * mi_per_sb).min(mi_total));
            (start, end)
        };

        let mut tiles = Vec::with_capacity(col_starts.len() * row_starts.len());
        for row in 0..row_starts.len() {
            let (mi_row_start, mi_row_end) = mi_bounds(row_starts, row, picture.mi_rows());
            for col in 0..col_starts.len() {
                let (mi_col_start, mi_col_end) = mi_bounds(col_starts, col, picture.mi_cols());
                tiles.push(TileGeometry { mi_row_start, mi_row_end, mi_col_start, mi_col_end });
            }
        }

        Ok(Self {
            picture,
            tile_cols: col_starts.len() as u32,
            tile_rows: row_starts.len() as u32,
            tiles,
        })
    }

    /// Picture geometry.
    #[must_use]
    pub fn picture(&self) -> &PictureGeometry {
        &self.picture
    }

    /// Number of tile columns.
    #[must_use]
    pub fn tile_cols(&self) -> u32 {
        self.tile_cols
    }

    /// Number of tile rows.
    #[must_use]
    pub fn tile_rows(&self) -> u32 {
        self.tile_rows
    }

    /// Total number of tiles.
    #[must_use]
    pub fn num_tiles(&self) -> u32 {
        self.tiles.len() as u32
    }

    /// All tiles in raster order.
    #[must_use]
    pub fn tiles(&self) -> &[TileGeometry] {
        &self.tiles
    }

    /// Tile by raster index.
    #[must_use]
    pub fn tile(&self, tile: u32) -> Option<&TileGeometry> {
        self.tiles.get(tile as usize)
    }

    /// Tile column of a raster tile index.
    #[must_use]
    pub fn tile_col_of(&self, tile: u32) -> u32 {
        tile % self.tile_cols
    }

    /// Picture height in superblock rows.
    #[must_use]
    pub fn sb_rows(&self) -> u32 {
        self.picture.sb_rows()
    }

    /// Picture width in superblock columns.
    #[must_use]
    pub fn sb_cols(&self) -> u32 {
        self.picture.sb_cols()
    }

    /// Capacity needed to schedule this frame.
    #[must_use]
    pub fn required_capacity(&self) -> Capacity {
        let sb_size = self.picture.sb_size;
        Capacity {
            max_tiles: self.tiles.len(),
            max_tile_cols: self.tile_cols as usize,
            max_sb_rows: self.sb_rows() as usize,
            max_tile_sb_rows: self
                .tiles
                .iter()
                .map(|t| t.num_sb_rows(sb_size) as usize)
                .max()
                .unwrap_or(0),
        }
    }
}

fn uniform_starts(total_sb: u32, count: u32, what: &str) -> Result<Vec<u32>> {
    if count == 0 || count > total_sb {
        return Err(DecodeMtError::invalid_geometry(format!(
            "{count} tile {what}s for a picture {total_sb} superblocks across"
        )));
    }
    let step = total_sb / count;
    Ok((0..count).map(|i| i * step).collect())
}

fn check_starts(starts: &[u32], total_sb: u32, what: &str) -> Result<()> {
    if starts.first() != Some(&0) {
        return Err(DecodeMtError::invalid_geometry(format!(
            "tile {what} starts must begin at superblock 0"
        )));
    }
    if starts.windows(2).any(|w| w[0] >= w[1]) {
        return Err(DecodeMtError::invalid_geometry(format!(
            "tile {what} starts must be strictly increasing: {starts:?}"
        )));
    }
    if starts.last().is_some_and(|&last| last >= total_sb) {
        return Err(DecodeMtError::invalid_geometry(format!(
            "tile {what} starts {starts:?} exceed picture of {total_sb} superblocks"
        )));
    }
    Ok(())
}

/// Sizes the scheduler's preallocated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capacity {
    /// Maximum tiles per frame (parse and recon pool size)
    pub max_tiles: usize,
    /// Maximum tile columns (width of the recon row map)
    pub max_tile_cols: usize,
    /// Maximum picture height in superblocks (loop filter and CDEF pool size)
    pub max_sb_rows: usize,
    /// Maximum superblock rows in one tile
    pub max_tile_sb_rows: usize,
}

impl Capacity {
    /// Returns true if `needed` fits inside this capacity.
    #[must_use]
    pub fn covers(&self, needed: &Capacity) -> bool {
        needed.max_tiles <= self.max_tiles
            && needed.max_tile_cols <= self.max_tile_cols
            && needed.max_sb_rows <= self.max_sb_rows
            && needed.max_tile_sb_rows <= self.max_tile_sb_rows
    }

    /// Component-wise maximum of two capacities.
    #[must_use]
    pub fn union(&self, other: &Capacity) -> Capacity {
        Capacity {
            max_tiles: self.max_tiles.max(other.max_tiles),
            max_tile_cols: self.max_tile_cols.max(other.max_tile_cols),
            max_sb_rows: self.max_sb_rows.max(other.max_sb_rows),
            max_tile_sb_rows: self.max_tile_sb_rows.max(other.max_tile_sb_rows),
        }
    }

    /// Capacity for a picture of at most `max_sb_rows` superblock rows split into at most
    /// `max_tile_cols` x `max_tile_rows` tiles.
    #[must_use]
    pub fn for_grid(max_tile_cols: usize, max_tile_rows: usize, max_sb_rows: usize) -> Self {
        Capacity {
            max_tiles: max_tile_cols * max_tile_rows,
            max_tile_cols,
            max_sb_rows,
            max_tile_sb_rows: max_sb_rows,
        }
    }
}

/// Outcome of comparing a new frame's geometry with the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryChange {
    /// First frame, or identical layout: state is reused as is.
    Same,
    /// Layout changed but fits the allocation: per-tile records are re-initialised.
    Reconfigure,
    /// Layout exceeds the allocation: frame state and worker pool are rebuilt.
    Reallocate,
}

/// Caches the previous frame's geometry.
#[derive(Debug, Default)]
pub struct GeometryCheck {
    previous: Option<FrameGeometry>,
}

impl GeometryCheck {
    /// Create a check with no previous frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Geometry of the last frame passed to [`GeometryCheck::update`].
    #[must_use]
    pub fn previous(&self) -> Option<&FrameGeometry> {
        self.previous.as_ref()
    }

    /// Classify `next` against the cached geometry and `capacity`, then cache it.
    pub fn update(&mut self, next: &FrameGeometry, capacity: &Capacity) -> GeometryChange {
        let change = if !capacity.covers(&next.required_capacity()) {
            GeometryChange::Reallocate
        } else if self.previous.as_ref() == Some(next) {
            GeometryChange::Same
        } else {
            GeometryChange::Reconfigure
        };
        self.previous = Some(next.clone());
        change
    }

    /// Forget the cached geometry.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
