//! Custom error types for decmt operations.

use thiserror::Error;

use crate::frame_pipeline::Stage;

/// Result type alias for decmt operations
pub type Result<T> = std::result::Result<T, DecodeMtError>;

/// Error type for decmt operations
#[derive(Error, Debug, Clone)]
pub enum DecodeMtError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Frame or tile geometry is inconsistent
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry {
        /// Explanation of the inconsistency
        reason: String,
    },

    /// A frame needs more jobs than the scheduler was built for
    #[error("{what} exceeds capacity: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// The quantity that overflowed (e.g. "tiles")
        what: &'static str,
        /// Requested amount
        requested: usize,
        /// Allocated amount
        capacity: usize,
    },

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker thread {worker_id}: {reason}")]
    ThreadSpawn {
        /// Index of the worker that failed to start
        worker_id: usize,
        /// Rendered OS error
        reason: String,
    },

    /// A stage job reported failure
    #[error("{stage} job {index} failed: {message}")]
    JobFailed {
        /// Stage the job belonged to
        stage: Stage,
        /// Tile number or superblock row
        index: u32,
        /// Rendered error chain from the collaborator
        message: String,
    },

    /// The frame was abandoned after a failure on another thread
    #[error("Frame aborted during {stage} after a failure on another thread")]
    Aborted {
        /// Stage in which the abort was observed
        stage: Stage,
    },

    /// A worker thread panicked outside a stage job
    #[error("Worker thread {worker_id} panicked: {message}")]
    WorkerPanicked {
        /// Index of the panicking worker
        worker_id: usize,
        /// Panic payload rendered as text
        message: String,
    },

    /// The scheduler has already been shut down
    #[error("Scheduler has been shut down")]
    ShutDown,
}

impl DecodeMtError {
    /// Convenience constructor for [`DecodeMtError::InvalidParameter`].
    #[must_use]
    pub fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
    }

    /// Convenience constructor for [`DecodeMtError::InvalidGeometry`].
    #[must_use]
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry { reason: reason.into() }
    }

    /// Wrap a collaborator failure.
    #[must_use]
    pub fn job_failed(stage: Stage, index: u32, error: &anyhow::Error) -> Self {
        Self::JobFailed { stage, index, message: format!("{error:#}") }
    }

    /// Returns true if this error was caused by another thread's failure rather than
    /// describing one itself.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
