//! Frame-level multi-threaded decode scheduling.
//!
//! A fixed pool of N threads (the caller of [`FrameScheduler::decode_frame`] plus N-1
//! pool threads) cooperates on one frame at a time. Every thread walks the same stage
//! sequence; a stage gate keeps threads out of a stage until the driver opens it, and
//! fine-grained progress records let work in neighbouring stages overlap.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                      FRAME SCHEDULER (N threads)                         │
//! │                                                                          │
//! │  MotionProjection → Parse → Recon → LoopFilter → Cdef → frame barrier     │
//! │     [row claims]   [tiles]  [tile rows]  [rows]   [rows]                 │
//! │                                                                          │
//! │  Parse of tile t posts recon of tile t and opens the recon stage         │
//! │  Recon row r waits: parse of row r, projection, top-right neighbour      │
//! │  LoopFilter row r waits: recon of rows r-1..r+1 in every tile column     │
//! │  Cdef row r waits: loop filter of rows r and r+1                         │
//! │                                                                          │
//! │  Job queues via decmt_pool::JobPool (crossbeam ArrayQueue + semaphores)  │
//! │  Progress records via atomics; claim cursors via parking_lot::Mutex      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - `stage`: the five stages and their job payloads
//! - `config`: scheduler configuration and policies
//! - `collaborator`: the [`FrameStages`] trait implemented by the codec
//! - `gate`: stage gates and the frame barrier
//! - `backoff`: polling backoff and stall detection
//! - `state`: per-frame progress records and row maps
//! - `tile_progress`: per-tile claim cursor and the top-right dependency
//! - `motion_proj`, `tile_scheduler`, `row_sync`: per-stage drains
//! - `worker`: the per-thread stage loop
//! - `driver`: [`FrameScheduler`], the public entry point
//! - `stats`: job and wait accounting

mod backoff;
mod collaborator;
mod config;
mod driver;
mod gate;
mod motion_proj;
pub mod row_sync;
mod shared;
mod stage;
pub mod state;
mod stats;
mod tile_progress;
pub mod tile_scheduler;
mod worker;

pub use backoff::{Backoff, Poller, StallWatch};
pub use collaborator::FrameStages;
pub use config::{
    ErrorPolicy, MAX_BACKOFF_US, MIN_BACKOFF_US, SchedulerConfig, StallConfig,
    TileSwitchStrategy,
};
pub use driver::{FrameReport, FrameScheduler};
pub use gate::{FrameBarrier, StageGate};
pub use motion_proj::MotionProjection;
pub use stage::{NUM_STAGES, RowJob, Stage, TileJob};
pub use state::{FrameState, RowMap};
pub use stats::PipelineStats;
pub use tile_progress::{TileLayout, TileParseProgress, TileProgress, TopRightSync};
pub use tile_scheduler::select_steal_target;
pub use worker::{WorkerContext, extract_panic_message};
