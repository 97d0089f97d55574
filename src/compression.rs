//! LZ4 block compression for DVPL payloads
//!
//! This module holds the compressors the container codec consults when
//! packing, and the matching decoders it dispatches to when unpacking.
//!
//! ## Overview
//!
//! Two writable algorithms are available:
//!
//! - **LZ4** (payload type 2): the generic block encoder from `lz4_flex`
//! - **LZ4HC** (payload type 1): liblz4's high-compression block encoder at
//!   level 9, producing standard LZ4 blocks that the same decoder reads
//!
//! Both write into a buffer sized by the LZ4 worst-case expansion bound, and
//! both reject inputs above [`LZ4_MAX_INPUT_SIZE`], the largest buffer the
//! block API can address in one shot.
//!
//! Raw deflate (payload type 3) is decode-only. It appears in old containers
//! and is never produced by [`compress`].
//!
//! ## Thread Safety
//!
//! Every function here is stateless; scratch buffers are allocated per call,
//! so they may be invoked concurrently from any number of workers.
//!
//! ## Examples
//!
//! ```rust
//! use dvpl::compression::{compress, decompress_block, Compressor};
//!
//! let data = b"abcabcabcabcabcabcabcabcabcabcabcabc".to_vec();
//! let packed = compress(&data, Compressor::Lz4Hc).unwrap();
//! assert!(packed.len() < data.len());
//!
//! let unpacked = decompress_block(&packed, data.len()).unwrap();
//! assert_eq!(unpacked, data);
//! ```

use crate::error::{DvplError, Result};
use crate::types::PayloadType;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;
use tracing::trace;

/// Largest input the LZ4 block API accepts (`LZ4_MAX_INPUT_SIZE`)
pub const LZ4_MAX_INPUT_SIZE: usize = 0x7E00_0000;

/// Compression level used for LZ4HC payloads
pub const DEFAULT_HC_LEVEL: i32 = 9;

/// A writable block compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    /// Generic LZ4 block encoder
    Lz4,
    /// High-compression encoder at [`DEFAULT_HC_LEVEL`]
    Lz4Hc,
    /// High-compression encoder at an explicit level (1..=12)
    Lz4HcLevel(i32),
}

impl Compressor {
    /// Compressor for a payload type, if that type is compressed and writable
    pub fn for_payload_type(payload_type: PayloadType) -> Option<Self> {
        match payload_type {
            PayloadType::Lz4 => Some(Compressor::Lz4),
            PayloadType::Lz4Hc => Some(Compressor::Lz4Hc),
            PayloadType::None | PayloadType::RawDeflate => None,
        }
    }

    /// Payload type recorded in the footer for this compressor's output
    pub fn payload_type(self) -> PayloadType {
        match self {
            Compressor::Lz4 => PayloadType::Lz4,
            Compressor::Lz4Hc | Compressor::Lz4HcLevel(_) => PayloadType::Lz4Hc,
        }
    }
}

/// Worst-case LZ4 output size for `input_len` bytes
///
/// Mirrors `LZ4_compressBound`: `n + n/255 + 16`.
pub fn compress_bound(input_len: usize) -> usize {
    input_len + input_len / 255 + 16
}

/// Compress `payload` as a single LZ4 block
///
/// # Errors
///
/// - [`DvplError::PayloadTooLarge`] above [`LZ4_MAX_INPUT_SIZE`]
/// - [`DvplError::CompressionFailed`] if the encoder errors or yields
///   nothing for non-empty input
pub fn compress(payload: &[u8], compressor: Compressor) -> Result<Vec<u8>> {
    if payload.len() > LZ4_MAX_INPUT_SIZE {
        return Err(DvplError::PayloadTooLarge {
            size: payload.len() as u64,
            limit: LZ4_MAX_INPUT_SIZE as u64,
        });
    }
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let bound = match compressor {
        Compressor::Lz4 => compress_bound(payload.len())
            .max(lz4_flex::block::get_maximum_output_size(payload.len())),
        _ => compress_bound(payload.len()),
    };
    let mut out = vec![0u8; bound];
    let written = match compressor {
        Compressor::Lz4 => lz4_flex::block::compress_into(payload, &mut out)
            .map_err(|e| DvplError::compression(format!("lz4: {}", e)))?,
        Compressor::Lz4Hc => compress_hc(payload, DEFAULT_HC_LEVEL, &mut out)?,
        Compressor::Lz4HcLevel(level) => compress_hc(payload, level, &mut out)?,
    };

    if written == 0 {
        return Err(DvplError::compression(format!(
            "{:?} produced no output for {} input bytes",
            compressor,
            payload.len()
        )));
    }

    out.truncate(written);
    trace!(
        "{:?}: {} -> {} bytes",
        compressor,
        payload.len(),
        written
    );
    Ok(out)
}

fn compress_hc(payload: &[u8], level: i32, out: &mut [u8]) -> Result<usize> {
    let mode = lz4::block::CompressionMode::HIGHCOMPRESSION(level);
    lz4::block::compress_to_buffer(payload, Some(mode), false, out)
        .map_err(|e| DvplError::compression(format!("lz4hc: {}", e)))
}

/// Decode one LZ4 block into exactly `uncompressed_size` bytes
///
/// Serves both LZ4 payload types; HC only changes the encoder.
///
/// # Errors
///
/// [`DvplError::DecompressionFailed`] if the size is beyond what the block
/// could expand to, the block is malformed or overflows the buffer, or it
/// decodes to fewer bytes than expected.
pub fn decompress_block(stored: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let limit = max_decompressed_size(stored.len());
    if uncompressed_size > limit {
        return Err(DvplError::decompression(format!(
            "lz4: footer declares {} bytes, {} stored bytes can expand to at most {}",
            uncompressed_size,
            stored.len(),
            limit
        )));
    }

    let mut out = vec![0u8; uncompressed_size];
    let written = lz4_flex::block::decompress_into(stored, &mut out)
        .map_err(|e| DvplError::decompression(format!("lz4: {}", e)))?;

    if written != uncompressed_size {
        return Err(DvplError::decompression(format!(
            "lz4: decoded {} bytes, footer declares {}",
            written, uncompressed_size
        )));
    }
    Ok(out)
}

/// Largest output an LZ4 block of `stored_len` bytes can decode to
pub fn max_decompressed_size(stored_len: usize) -> usize {
    stored_len.saturating_mul(255).saturating_add(16)
}

/// Inflate a legacy deflate payload to completion
///
/// Old writers were inconsistent about framing, so a stream starting with a
/// valid zlib header is read as zlib and anything else as raw deflate.
/// `size_hint` only pre-sizes the output buffer.
pub fn inflate_legacy(stored: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size_hint);
    let read = if has_zlib_header(stored) {
        ZlibDecoder::new(stored).read_to_end(&mut out)
    } else {
        DeflateDecoder::new(stored).read_to_end(&mut out)
    };
    read.map_err(|e| DvplError::decompression(format!("deflate: {}", e)))?;
    Ok(out)
}

fn has_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => {
            cmf & 0x0F == 8 && (cmf >> 4) <= 7 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
        }
        _ => false,
    }
}
