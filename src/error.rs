//! Error types for the tile pipeline crate

/// Coarse classification of [`PipelineError`] variants
///
/// Every failure a run can produce falls into exactly one of these kinds.
/// Initialization failures happen before any unit processes a tile; storage
/// and stall failures abort a launched run; verification failures are
/// reported after a run completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Device, buffer or unit setup could not be satisfied
    Initialization,
    /// A tile read or write barrier reported a fault
    StorageIo,
    /// A staging buffer wait exceeded its deadline
    Stall,
    /// The run was cancelled while a unit was blocked
    Cancelled,
    /// A staging buffer was driven out of its reserve/push/wait/pop protocol
    Protocol,
    /// Destination contents did not match the expected transform
    Verification,
    /// Configuration could not be loaded, saved or validated
    Config,
}

/// Errors that can occur while building or running a tile pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Device memory could not satisfy an allocation
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Run parameters or pipeline configuration are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No tensor buffer lives at the given device address
    #[error("No tensor buffer at address {0:#x}")]
    UnknownAddress(u64),

    /// Source and destination resolve to the same memory
    #[error("Source and destination alias the same buffer at {0:#x}")]
    AliasedBuffers(u64),

    /// A tile-sized region does not match the pipeline's tile size
    #[error("Tile size mismatch: expected {expected} bytes, got {actual} bytes")]
    TileSizeMismatch { expected: usize, actual: usize },

    /// A tile index beyond the end of a tensor buffer was addressed
    #[error("Tile index {index} out of range for buffer with {tile_count} tiles")]
    TileOutOfRange { index: usize, tile_count: usize },

    /// A read barrier reported a fault
    #[error("Read of tile {index} failed: {reason}")]
    StorageRead { index: usize, reason: String },

    /// A write barrier reported a fault
    #[error("Write of tile {index} failed: {reason}")]
    StorageWrite { index: usize, reason: String },

    /// More slots were requested at once than the staging buffer holds
    #[error("Cannot claim {requested} slots from staging buffer {buffer} (depth {depth})")]
    InvalidSlotCount {
        buffer: String,
        requested: usize,
        depth: usize,
    },

    /// Staging buffer operations were issued out of order
    #[error("Staging protocol violation on {buffer}: {detail}")]
    Protocol { buffer: String, detail: String },

    /// A reserve or wait did not complete before the stall deadline
    #[error("Staging buffer {buffer} stalled for {waited_ms} ms")]
    Stalled { buffer: String, waited_ms: u64 },

    /// The run was cancelled while blocked on a staging buffer
    #[error("Run cancelled while blocked on staging buffer {0}")]
    Cancelled(String),

    /// A unit could not be launched on its execution context
    #[error("Failed to launch {unit} unit: {reason}")]
    Launch { unit: String, reason: String },

    /// A unit panicked while processing
    #[error("{0} unit panicked")]
    UnitPanicked(String),

    /// Destination contents failed verification
    #[error("Verification failed: {mismatches} of {checked} elements out of tolerance")]
    Verification { mismatches: usize, checked: usize },

    /// Config file could not be read or written
    #[error("Config I/O error: {0}")]
    Io(String),

    /// Config file could not be parsed or serialized
    #[error("Config serialization error: {0}")]
    Json(String),
}

impl PipelineError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Allocation(_)
            | Self::UnknownAddress(_)
            | Self::AliasedBuffers(_)
            | Self::TileSizeMismatch { .. }
            | Self::Launch { .. } => ErrorKind::Initialization,
            Self::TileOutOfRange { .. } | Self::StorageRead { .. } | Self::StorageWrite { .. } => {
                ErrorKind::StorageIo
            }
            Self::InvalidSlotCount { .. } | Self::Protocol { .. } | Self::UnitPanicked(_) => ErrorKind::Protocol,
            Self::Stalled { .. } => ErrorKind::Stall,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Verification { .. } => ErrorKind::Verification,
            Self::InvalidConfig(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Config,
        }
    }

    /// True for failures that abort a run before any unit starts processing
    pub fn is_initialization(&self) -> bool {
        matches!(self.kind(), ErrorKind::Initialization | ErrorKind::Config)
    }

    /// True when this error only reflects that another failure cancelled the run
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Json(err.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
