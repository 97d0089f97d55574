//! Error types for the dvpl library
//!
//! This module defines every error that can surface while packing, unpacking
//! or scheduling a batch. Codec errors describe what is wrong with a single
//! container; filesystem errors carry the operation and path that failed so a
//! batch summary line is actionable on its own.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the dvpl library
pub type Result<T> = std::result::Result<T, DvplError>;

/// Filesystem operation that failed, used to label [`DvplError::Fs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    /// Reading a source file
    Read,
    /// Writing a destination file
    Write,
    /// Creating a destination's parent directories
    CreateDir,
    /// Removing a source after a successful write
    Remove,
    /// Querying file metadata
    Stat,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FsOp::Read => "read",
            FsOp::Write => "write",
            FsOp::CreateDir => "create directory",
            FsOp::Remove => "remove",
            FsOp::Stat => "stat",
        };
        f.write_str(label)
    }
}

/// Main error type for all dvpl operations
#[derive(Debug, Error)]
pub enum DvplError {
    /// Container is shorter than its fixed footer
    #[error("Container too small: {len} bytes (footer alone is 20 bytes)")]
    ContainerTooSmall {
        /// Length of the rejected input
        len: usize,
    },

    /// Trailing marker is not `DVPL`
    #[error("Invalid marker: {}", String::from_utf8_lossy(found))]
    BadMarker {
        /// The four trailing bytes actually found
        found: [u8; 4],
    },

    /// CRC-32 of the stored payload does not match the footer
    #[error("CRC32 mismatch - expected: {expected:#010x}, actual: {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the footer
        expected: u32,
        /// Checksum computed over the stored bytes
        actual: u32,
    },

    /// Footer's stored size disagrees with the payload length
    #[error("Stored size mismatch - footer says {declared} bytes, payload has {actual}")]
    StoredSizeMismatch {
        /// Size recorded in the footer
        declared: u32,
        /// Bytes actually preceding the footer
        actual: usize,
    },

    /// Payload type is unknown, or not writable
    #[error("Unsupported payload type: {0}")]
    UnsupportedPayloadType(u32),

    /// Compressor failed to produce output
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Decompressor rejected the stored bytes
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Payload exceeds what the footer or the block compressor can address
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: u64,
        /// Applicable limit
        limit: u64,
    },

    /// Filesystem operation failed on a specific path
    #[error("Failed to {op} {path:?}: {source}")]
    Fs {
        /// Operation that failed
        op: FsOp,
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// I/O errors without path context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Configuration file could not be parsed
    #[error("Config file error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern as supplied
        pattern: String,
        /// Parser message
        reason: String,
    },
}

impl DvplError {
    /// Attach a path and operation to an I/O error
    pub fn fs(op: FsOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DvplError::Fs {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        DvplError::CompressionFailed(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        DvplError::DecompressionFailed(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        DvplError::InvalidConfiguration(msg.into())
    }

    /// Check if this error indicates a damaged container
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DvplError::ContainerTooSmall { .. }
                | DvplError::BadMarker { .. }
                | DvplError::ChecksumMismatch { .. }
                | DvplError::StoredSizeMismatch { .. }
                | DvplError::DecompressionFailed(_)
        )
    }

    /// Check if retrying the same file may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            DvplError::Fs { source, .. } | DvplError::Io(source) => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            DvplError::ChecksumMismatch { .. } => format!(
                "{}. The file is damaged; rerun with --skip-crc to attempt a decode anyway.",
                self
            ),
            DvplError::BadMarker { .. } | DvplError::ContainerTooSmall { .. } => {
                format!("{}. This does not look like a DVPL file.", self)
            }
            DvplError::Fs { op, path, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!(
                    "Permission denied trying to {} {:?}. Check file permissions.",
                    op, path
                )
            }
            _ => self.to_string(),
        }
    }
}
