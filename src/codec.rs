//! DVPL container codec
//!
//! Transforms a payload into its on-disk container and back. The codec is
//! pure: it never touches storage, and a container is built and torn down
//! within a single call.
//!
//! ## Format
//!
//! ```text
//! [stored bytes][u32 uncompressed_size][u32 stored_size][u32 crc32][u32 payload_type]["DVPL"]
//!               \_____________________________ footer, 20 bytes, LE ______________________/
//! ```
//!
//! The CRC-32/IEEE covers the stored bytes as written, after compression.
//!
//! ## Compression decisions
//!
//! Packing asks the [`compression`](crate::compression) module for the
//! requested algorithm, then keeps the result only if it is worth keeping
//! under the codec's [`FallbackPolicy`]. Empty payloads are always stored
//! as type `none`. A forced choice keeps compressed output even when it grew.
//!
//! Payload type 3 (raw deflate) is a deliberate asymmetry: it can be decoded
//! for old containers but `pack` refuses to produce it.
//!
//! ## Examples
//!
//! ```rust
//! use dvpl::codec::{pack, unpack};
//! use dvpl::types::{CompressionChoice, PayloadType};
//!
//! let data = b"hello hello hello hello hello hello hello hello".to_vec();
//! let packed = pack(&data, CompressionChoice::new(PayloadType::Lz4Hc)).unwrap();
//! assert_eq!(&packed.bytes[packed.bytes.len() - 4..], b"DVPL");
//!
//! let unpacked = unpack(&packed.bytes, false).unwrap();
//! assert_eq!(unpacked.bytes, data);
//! assert_eq!(unpacked.payload_type, packed.payload_type);
//! ```

use crate::compression::{self, Compressor, DEFAULT_HC_LEVEL};
use crate::error::{DvplError, Result};
use crate::types::{CompressionChoice, PayloadType};
use tracing::trace;

/// Size of the trailing footer in bytes
pub const FOOTER_SIZE: usize = 20;

/// Marker closing every container
pub const MARKER: [u8; 4] = *b"DVPL";

/// When a compressed result is discarded in favour of raw storage
///
/// Older writers disagreed on the boundary case where compression saves
/// nothing, so it is a policy rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fall back when compressed size >= original size
    #[default]
    NotSmaller,
    /// Fall back only when compressed size > original size
    Larger,
}

impl FallbackPolicy {
    /// Whether a compressed result of `compressed` bytes should be discarded
    pub fn should_fall_back(self, compressed: usize, original: usize) -> bool {
        match self {
            FallbackPolicy::NotSmaller => compressed >= original,
            FallbackPolicy::Larger => compressed > original,
        }
    }

    /// Comparison that triggers the fallback, for log lines
    pub fn comparison(self) -> &'static str {
        match self {
            FallbackPolicy::NotSmaller => ">=",
            FallbackPolicy::Larger => ">",
        }
    }
}

/// The fixed 20-byte trailer of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Length of the original payload
    pub uncompressed_size: u32,
    /// Length of the stored bytes preceding the footer
    pub stored_size: u32,
    /// CRC-32/IEEE of the stored bytes
    pub crc32: u32,
    /// Raw payload type, validated at dispatch time
    pub payload_type: u32,
    /// Trailing marker, `DVPL` when valid
    pub marker: [u8; 4],
}

impl Footer {
    /// Serialize to the 20-byte little-endian wire form
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut out = [0u8; FOOTER_SIZE];
        out[0..4].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out[4..8].copy_from_slice(&self.stored_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.crc32.to_le_bytes());
        out[12..16].copy_from_slice(&self.payload_type.to_le_bytes());
        out[16..20].copy_from_slice(&self.marker);
        out
    }

    /// Read the footer from the tail of `container`
    ///
    /// Checks length and marker only; checksum and payload type are the
    /// caller's concern.
    pub fn parse(container: &[u8]) -> Result<Self> {
        if container.len() < FOOTER_SIZE {
            return Err(DvplError::ContainerTooSmall {
                len: container.len(),
            });
        }
        let tail = &container[container.len() - FOOTER_SIZE..];
        let word = |i: usize| u32::from_le_bytes([tail[i], tail[i + 1], tail[i + 2], tail[i + 3]]);

        let footer = Footer {
            uncompressed_size: word(0),
            stored_size: word(4),
            crc32: word(8),
            payload_type: word(12),
            marker: [tail[16], tail[17], tail[18], tail[19]],
        };
        if footer.marker != MARKER {
            return Err(DvplError::BadMarker {
                found: footer.marker,
            });
        }
        Ok(footer)
    }
}

/// Tunables for [`ContainerCodec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Boundary for keeping compressed output
    pub fallback: FallbackPolicy,
    /// Level passed to the LZ4HC encoder
    pub hc_level: i32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            hc_level: DEFAULT_HC_LEVEL,
        }
    }
}

/// Result of [`ContainerCodec::pack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    /// Full container: stored bytes followed by the footer
    pub bytes: Vec<u8>,
    /// Payload type actually written
    pub payload_type: PayloadType,
}

impl Packed {
    /// Length of the stored region
    pub fn stored_size(&self) -> usize {
        self.bytes.len() - FOOTER_SIZE
    }
}

/// Result of [`ContainerCodec::unpack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    /// Original payload
    pub bytes: Vec<u8>,
    /// Payload type the container declared
    pub payload_type: PayloadType,
}

/// Stateless container codec
///
/// Cheap to copy and safe to share between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerCodec {
    options: CodecOptions,
}

impl ContainerCodec {
    /// Create a codec with the given options
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Wrap `payload` into a container
    ///
    /// # Errors
    ///
    /// - [`DvplError::UnsupportedPayloadType`] for raw deflate
    /// - [`DvplError::PayloadTooLarge`] past `u32::MAX`, or past the LZ4
    ///   block limit when an LZ4 type is requested
    /// - [`DvplError::CompressionFailed`] if the compressor fails
    pub fn pack(&self, payload: &[u8], choice: CompressionChoice) -> Result<Packed> {
        if !choice.algorithm.is_writable() {
            return Err(DvplError::UnsupportedPayloadType(choice.algorithm.as_u32()));
        }
        if payload.len() as u64 > u64::from(u32::MAX) {
            return Err(DvplError::PayloadTooLarge {
                size: payload.len() as u64,
                limit: u64::from(u32::MAX),
            });
        }

        let compressor = if payload.is_empty() {
            None
        } else {
            self.compressor_for(choice.algorithm)
        };

        let compressed = match compressor {
            Some(c) => Some((compression::compress(payload, c)?, c.payload_type())),
            None => None,
        };

        let (stored, payload_type): (&[u8], PayloadType) = match &compressed {
            Some((bytes, _))
                if !choice.forced
                    && self.options.fallback.should_fall_back(bytes.len(), payload.len()) =>
            {
                trace!(
                    "{} output {} {} {} bytes, storing raw",
                    choice.algorithm,
                    bytes.len(),
                    self.options.fallback.comparison(),
                    payload.len()
                );
                (payload, PayloadType::None)
            }
            Some((bytes, t)) => (bytes.as_slice(), *t),
            None => (payload, PayloadType::None),
        };

        let footer = Footer {
            uncompressed_size: payload.len() as u32,
            stored_size: stored.len() as u32,
            crc32: crc32fast::hash(stored),
            payload_type: payload_type.as_u32(),
            marker: MARKER,
        };

        let mut bytes = Vec::with_capacity(stored.len() + FOOTER_SIZE);
        bytes.extend_from_slice(stored);
        bytes.extend_from_slice(&footer.to_bytes());

        Ok(Packed {
            bytes,
            payload_type,
        })
    }

    /// Recover the payload from a container
    ///
    /// With `skip_integrity_check` the CRC and stored-size checks are
    /// bypassed and every byte before the footer is treated as stored data.
    ///
    /// # Errors
    ///
    /// - [`DvplError::ContainerTooSmall`], [`DvplError::BadMarker`]
    /// - [`DvplError::StoredSizeMismatch`], [`DvplError::ChecksumMismatch`]
    ///   unless skipped
    /// - [`DvplError::UnsupportedPayloadType`] for unknown types
    /// - [`DvplError::DecompressionFailed`] if decoding fails
    pub fn unpack(&self, container: &[u8], skip_integrity_check: bool) -> Result<Unpacked> {
        let footer = Footer::parse(container)?;
        let stored = &container[..container.len() - FOOTER_SIZE];

        if !skip_integrity_check {
            if footer.stored_size as usize != stored.len() {
                return Err(DvplError::StoredSizeMismatch {
                    declared: footer.stored_size,
                    actual: stored.len(),
                });
            }
            let actual = crc32fast::hash(stored);
            if actual != footer.crc32 {
                return Err(DvplError::ChecksumMismatch {
                    expected: footer.crc32,
                    actual,
                });
            }
        }

        let payload_type = PayloadType::try_from(footer.payload_type)?;
        let size = footer.uncompressed_size as usize;
        let bytes = match payload_type {
            PayloadType::None => stored.to_vec(),
            PayloadType::Lz4Hc | PayloadType::Lz4 => compression::decompress_block(stored, size)?,
            PayloadType::RawDeflate => compression::inflate_legacy(stored, size)?,
        };

        Ok(Unpacked {
            bytes,
            payload_type,
        })
    }

    fn compressor_for(&self, algorithm: PayloadType) -> Option<Compressor> {
        match Compressor::for_payload_type(algorithm)? {
            Compressor::Lz4Hc if self.options.hc_level != DEFAULT_HC_LEVEL => {
                Some(Compressor::Lz4HcLevel(self.options.hc_level))
            }
            c => Some(c),
        }
    }
}

/// Pack with default options
pub fn pack(payload: &[u8], choice: CompressionChoice) -> Result<Packed> {
    ContainerCodec::default().pack(payload, choice)
}

/// Unpack with default options
pub fn unpack(container: &[u8], skip_integrity_check: bool) -> Result<Unpacked> {
    ContainerCodec::default().unpack(container, skip_integrity_check)
}

/// Read a container's footer without decoding the payload
pub fn inspect(container: &[u8]) -> Result<Footer> {
    Footer::parse(container)
}
