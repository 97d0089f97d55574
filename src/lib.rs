//! # dvpl - DVPL container packing for whole directory trees
//!
//! A library for converting files to and from the DVPL container format, and
//! for applying that conversion across directory trees concurrently.
//!
//! ## Overview
//!
//! A DVPL container wraps one payload with an optional LZ4 compression pass
//! and a 20-byte integrity footer. This crate provides:
//! - A pure container codec with CRC-32 verification
//! - LZ4 and LZ4HC block compression with fallback to raw storage
//! - Glob-based admission rules for batch runs
//! - A bounded worker pool that packs or unpacks many files in parallel,
//!   isolating every file's failure from the rest of the batch
//!
//! ## Quick Start
//!
//! ```rust
//! use dvpl::codec::{pack, unpack};
//! use dvpl::types::{CompressionChoice, PayloadType};
//!
//! let data = b"some file contents, some file contents, some file contents".to_vec();
//! let packed = pack(&data, CompressionChoice::new(PayloadType::Lz4Hc)).unwrap();
//! let unpacked = unpack(&packed.bytes, false).unwrap();
//! assert_eq!(unpacked.bytes, data);
//! ```
//!
//! ### Packing a Directory
//!
//! ```rust,no_run
//! use dvpl::{BatchConfigBuilder, BatchScheduler, Mode, PayloadType};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfigBuilder::new(Mode::Pack, "./Data")
//!     .payload_type(PayloadType::Lz4Hc)
//!     .ignore_patterns(vec!["*.exe".to_string(), "*.dll".to_string()])
//!     .no_compress_patterns(vec!["*.webp".to_string()])
//!     .workers(8)
//!     .build()?;
//!
//! let result = BatchScheduler::new(config).run()?;
//! println!("{}", result.summary_line());
//! for failure in &result.failures {
//!     eprintln!("{:?}: {}", failure.path, failure.error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Container Format
//!
//! ```text
//! [payload][u32 uncompressed][u32 stored][u32 crc32][u32 type]["DVPL"]
//! ```
//!
//! All integers are little-endian. Payload types: 0 none, 1 LZ4HC, 2 LZ4,
//! 3 raw deflate (read only).
//!
//! ## Error Handling
//!
//! All operations return `Result<T, DvplError>`. Inside a batch, per-file
//! errors are collected into [`BatchResult::failures`] and never abort the
//! remaining files; only setup errors are returned from
//! [`BatchScheduler::run`].
//!
//! ## Module Organization
//!
//! - [`codec`]: Container and footer encoding
//! - [`compression`]: LZ4 compressors and legacy decoders
//! - [`filter`]: Per-file admission and compression overrides
//! - [`scheduler`]: Directory walking and the worker pool
//! - [`config`]: Batch configuration and the YAML overlay
//! - [`types`]: Shared types
//! - [`error`]: Error types

pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod filter;
pub mod scheduler;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use codec::{ContainerCodec, FallbackPolicy, Footer};
pub use config::{BatchConfig, BatchConfigBuilder, ConfigFile};
pub use error::{DvplError, Result};
pub use filter::FilterEngine;
pub use scheduler::{detect_mode, BatchScheduler, CancelHandle};
pub use types::*;
