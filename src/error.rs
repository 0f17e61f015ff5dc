//! Error handling module for the layout planner
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every planning failure is recoverable: callers either fall back to a
//! default, skip a device, or re-prompt for a different device selection.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for disk layout planning
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A size string such as `"4G"` could not be parsed
    #[error("Invalid size format: '{0}'")]
    InvalidSizeFormat(String),

    /// A device or device set is too small for the requested role
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// MBR tables hold at most four primary partitions
    #[error("Partition table limit reached on {device}: {count} partitions (MBR allows 4)")]
    PartitionTableLimitExceeded { device: PathBuf, count: usize },

    /// A computed partition would end beyond the device
    #[error("Partition would exceed device boundary on {device}: end={end} sectors, device={device_sectors} sectors")]
    BoundaryOverflow {
        device: PathBuf,
        end: u64,
        device_sectors: u64,
    },

    /// No boot or ESP partition to anchor a swap insertion
    #[error("No boot partition found on {0}")]
    NoBootPartitionFound(PathBuf),

    /// A finalized layout breaks an ordering/overlap/alignment invariant
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Configuration errors (unknown swap type, bad device spec, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (reading device listings, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for layout planning operations
pub type Result<T> = std::result::Result<T, LayoutError>;

// Convenient error constructors
impl LayoutError {
    /// Create an invalid size format error
    pub fn invalid_size(input: impl Into<String>) -> Self {
        Self::InvalidSizeFormat(input.into())
    }

    /// Create an insufficient capacity error
    pub fn insufficient_capacity(msg: impl Into<String>) -> Self {
        Self::InsufficientCapacity(msg.into())
    }

    /// Create an invalid layout error
    pub fn invalid_layout(msg: impl Into<String>) -> Self {
        Self::InvalidLayout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
