//! Core data types used throughout the dvpl library
//!
//! This module contains the values that flow between the codec, the filter
//! engine and the batch scheduler.
//!
//! ## Overview
//!
//! - **Codec**: [`PayloadType`], [`CompressionChoice`] - how a payload is stored
//! - **Work**: [`Mode`], [`FileTask`] - one file's pack or unpack job
//! - **Results**: [`TaskOutcome`], [`BatchFailure`], [`BatchResult`] - what a batch did
//! - **Events**: [`BatchEvent`], [`SkipReason`] - progress delivered to the caller
//!
//! ## Examples
//!
//! ```rust
//! use dvpl::types::{CompressionChoice, PayloadType};
//!
//! let choice = CompressionChoice::new(PayloadType::Lz4Hc);
//! assert!(!choice.forced);
//! assert_eq!(PayloadType::try_from(2).unwrap(), PayloadType::Lz4);
//! ```

use crate::error::{DvplError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Suffix carried by every packed file
pub const DVPL_SUFFIX: &str = ".dvpl";

/// Reserved configuration filename, never packed
pub const CONFIG_FILE_NAME: &str = ".dvpl.yml";

/// Config filename used by older releases, still read and never packed
pub const LEGACY_CONFIG_FILE_NAME: &str = ".dvpl_go.yml";

/// Which (de)compression path applies to a container
///
/// The discriminants are the wire values stored in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PayloadType {
    /// Stored bytes are the payload itself
    None = 0,
    /// LZ4 block, high-compression encoder
    #[default]
    Lz4Hc = 1,
    /// LZ4 block, generic encoder
    Lz4 = 2,
    /// Raw deflate, only ever decoded
    RawDeflate = 3,
}

impl PayloadType {
    /// Every type the codec can decode
    pub const ALL: [PayloadType; 4] = [
        PayloadType::None,
        PayloadType::Lz4Hc,
        PayloadType::Lz4,
        PayloadType::RawDeflate,
    ];

    /// Wire value stored in the footer
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether `pack` may produce this type
    pub fn is_writable(self) -> bool {
        !matches!(self, PayloadType::RawDeflate)
    }

    /// Short label used in progress lines
    pub fn label(self) -> &'static str {
        match self {
            PayloadType::None => "none",
            PayloadType::Lz4Hc => "lz4hc",
            PayloadType::Lz4 => "lz4",
            PayloadType::RawDeflate => "rfc1951",
        }
    }
}

impl TryFrom<u32> for PayloadType {
    type Error = DvplError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(PayloadType::None),
            1 => Ok(PayloadType::Lz4Hc),
            2 => Ok(PayloadType::Lz4),
            3 => Ok(PayloadType::RawDeflate),
            other => Err(DvplError::UnsupportedPayloadType(other)),
        }
    }
}

impl FromStr for PayloadType {
    type Err = DvplError;

    /// Accepts either the numeric wire value or the label
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return PayloadType::try_from(n);
        }
        PayloadType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| DvplError::invalid_config(format!("unknown payload type '{}'", s)))
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requested compression for one pack call
///
/// `forced` keeps the compressed output even when it did not shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionChoice {
    /// Requested algorithm
    pub algorithm: PayloadType,
    /// Keep a non-shrinking result anyway
    pub forced: bool,
}

impl CompressionChoice {
    /// Non-forced choice of `algorithm`
    pub fn new(algorithm: PayloadType) -> Self {
        Self {
            algorithm,
            forced: false,
        }
    }

    /// Choice that keeps compressed output regardless of size
    pub fn forced(algorithm: PayloadType) -> Self {
        Self {
            algorithm,
            forced: true,
        }
    }

    /// Store without compression
    pub fn none() -> Self {
        Self::new(PayloadType::None)
    }
}

/// Direction of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wrap plain files into containers
    Pack,
    /// Restore plain files from containers
    Unpack,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Pack => f.write_str("pack"),
            Mode::Unpack => f.write_str("unpack"),
        }
    }
}

/// One unit of batch work
///
/// Created by the walker, consumed exactly once by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// File to read
    pub source: PathBuf,
    /// File to write
    pub destination: PathBuf,
    /// Resolved compression when packing, `None` when unpacking
    pub compression: Option<CompressionChoice>,
    /// Leave the source in place after success
    pub keep_original: bool,
    /// Decode even if the CRC does not match
    pub skip_integrity_check: bool,
}

impl FileTask {
    /// Direction implied by the task
    pub fn mode(&self) -> Mode {
        if self.compression.is_some() {
            Mode::Pack
        } else {
            Mode::Unpack
        }
    }
}

/// What a successful task did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Source that was read
    pub source: PathBuf,
    /// Destination that was written
    pub destination: PathBuf,
    /// Direction
    pub mode: Mode,
    /// Payload type written (pack) or decoded (unpack)
    pub payload_type: PayloadType,
    /// Bytes read from the source
    pub bytes_in: u64,
    /// Bytes written to the destination
    pub bytes_out: u64,
    /// Whether the source was removed
    pub source_removed: bool,
}

/// Why a walked entry did not become a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The running executable or the reserved config file
    SelfExcluded,
    /// Already carries the container suffix while packing
    AlreadyPacked,
    /// Lacks the container suffix while unpacking
    NotPacked,
    /// Matched an ignore pattern
    Ignored,
    /// Matched none of the filter patterns
    Filtered,
    /// Task was queued but the batch was cancelled
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipReason::SelfExcluded => "excluded",
            SkipReason::AlreadyPacked => "already packed",
            SkipReason::NotPacked => "not a .dvpl file",
            SkipReason::Ignored => "ignored",
            SkipReason::Filtered => "filtered out",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A task that failed, with the error that stopped it
#[derive(Debug)]
pub struct BatchFailure {
    /// Source file of the failed task, or the walked path
    pub path: PathBuf,
    /// What went wrong
    pub error: DvplError,
}

/// Progress delivered to the caller while a batch runs
///
/// Events are emitted from a single collector thread, in completion order.
#[derive(Debug)]
pub enum BatchEvent<'a> {
    /// A task finished successfully
    Completed(&'a TaskOutcome),
    /// A task or walk entry failed
    Failed(&'a BatchFailure),
    /// A walked file was not turned into a task
    Skipped {
        /// The file
        path: &'a std::path::Path,
        /// Why
        reason: SkipReason,
    },
}

/// Aggregate result of one batch invocation
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Files processed successfully
    pub succeeded: usize,
    /// Files not turned into tasks (or dropped by cancellation)
    pub skipped: usize,
    /// Failures in the order they were collected
    pub failures: Vec<BatchFailure>,
    /// Total bytes read from sources
    pub bytes_read: u64,
    /// Total bytes written to destinations
    pub bytes_written: u64,
    /// Successful tasks per payload type, indexed by wire value
    pub by_payload_type: [usize; 4],
    /// Highest number of tasks executing at the same time
    pub peak_in_flight: usize,
    /// Highest task queue length observed by the walker
    pub peak_queued: usize,
    /// Wall time of the batch
    pub duration: Duration,
    /// Whether the batch was cancelled before the walk finished
    pub cancelled: bool,
}

impl BatchResult {
    /// True when no task failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed tasks
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Successful tasks that produced or consumed `payload_type`
    pub fn count_for(&self, payload_type: PayloadType) -> usize {
        self.by_payload_type[payload_type.as_u32() as usize]
    }

    /// One-line count summary
    pub fn summary_line(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped",
            self.succeeded,
            self.failed(),
            self.skipped
        )
    }

    pub(crate) fn record_outcome(&mut self, outcome: &TaskOutcome) {
        self.succeeded += 1;
        self.bytes_read += outcome.bytes_in;
        self.bytes_written += outcome.bytes_out;
        self.by_payload_type[outcome.payload_type.as_u32() as usize] += 1;
    }
}
