//! Lossy block-transform compression.
//!
//! This module provides the DCT codec family:
//! - 8×8 two-dimensional DCT-II and its inverse
//! - Quality-scaled quantization matrices
//! - Plane tiling with zero-padded edge blocks
//! - The still image codec and its serialized container
//! - The batched, parallel video codec over YUV4MPEG2 streams
//!
//! # Examples
//!
//! ```rust
//! use mediapress::transform::{forward, inverse, QuantizationMatrix};
//!
//! let block = [[128.0; 8]; 8];
//! let matrix = QuantizationMatrix::with_quality(50).unwrap();
//! let restored = inverse(&matrix.dequantize(&matrix.quantize(&forward(&block))));
//! assert!((restored[3][5] - 128.0).abs() < 1e-9);
//! ```

pub mod blocks;
pub mod dct;
pub mod image;
pub mod quantize;
pub mod video;
pub mod y4m;

pub use blocks::{block_count, merge_blocks, split_into_blocks, to_samples};
pub use dct::{forward, inverse, Block, BLOCK_SIZE};
pub use quantize::{QuantizationMatrix, QuantizedBlock};
pub use self::image::{CompressedImage, DctImage, ImageOptions};
pub use video::{compress_video, CancelFlag, DctVideo, VideoOptions, VideoSummary};
pub use y4m::{Colorspace, GrayFrame, StreamHeader, Y4mReader, Y4mWriter};
