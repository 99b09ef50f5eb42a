//! Lossless text compression codecs.
//!
//! This module provides the three whole-file text codecs:
//! - Huffman entropy coding with a self-describing codebook header
//! - LZW dictionary coding with fixed-width 6-byte codes
//! - Run-length encoding with a never-expand fallback
//!
//! Every codec works on the complete input held in memory and builds its
//! tables from scratch on each call.
//!
//! # Examples
//!
//! ```rust
//! use mediapress::compression::{Compression, Lzw};
//!
//! let artifact = Lzw.compress(b"TOBEORNOTTOBEORTOBEORNOT").unwrap();
//! assert_eq!(Lzw.decompress(&artifact).unwrap(), b"TOBEORNOTTOBEORTOBEORNOT");
//! ```

use crate::error::Error;

pub use crate::error::Result;

/// Trait for whole-buffer compression algorithms
pub trait Compression {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the compressed data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Whether `decompress` is part of this codec's workflow.
    fn supports_decompression(&self) -> bool {
        true
    }
}

/// Interpret raw file contents as text for the character based codecs.
pub(crate) fn as_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data)
        .map_err(|e| Error::InvalidInput(format!("source is not valid UTF-8: {e}")))
}

pub mod huffman;
pub mod lzw;
pub mod rle;

pub use huffman::{
    build_code_table, build_frequency_table, build_huffman_tree, huffman_decode, huffman_encode,
    Codebook, Huffman, HuffmanNode,
};
pub use lzw::{lzw_compress, lzw_decompress, Lzw, CODE_WIDTH, INITIAL_CODES};
pub use rle::{rle_compress, rle_decompress, Rle};
