//! Error types for the virtual memory simulator.

use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Error, Debug)]
pub enum VmError {
    /// Virtual address outside `[0, VIRTUAL_MEMORY_SIZE)`. Nothing was touched.
    #[error("virtual address {address:#x} is out of range (limit {limit:#x})")]
    OutOfRange { address: u64, limit: u64 },

    /// Rejected at construction, never raised mid-translation.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(String),

    /// The page-table tree is in a state the engine never produces.
    /// The instance should be discarded.
    #[error("page table inconsistency: {0}")]
    Inconsistent(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VmError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        VmError::Parse {
            line,
            message: message.into(),
        }
    }

    /// True for the errors a caller can expect during normal operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VmError::OutOfRange { .. })
    }
}
