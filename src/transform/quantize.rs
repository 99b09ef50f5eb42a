//! Quality-scaled quantization of DCT coefficients.

use crate::error::{Error, Result};
use crate::transform::dct::{Block, BLOCK_SIZE};

/// Standard JPEG luminance quantization table.
const STD_LUMINANCE_TABLE: [[u32; BLOCK_SIZE]; BLOCK_SIZE] = [
    [16, 11, 10, 16, 24, 40, 51, 61],
    [12, 12, 14, 19, 26, 58, 60, 55],
    [14, 13, 16, 24, 40, 57, 69, 56],
    [14, 17, 22, 29, 51, 87, 80, 62],
    [18, 22, 37, 56, 68, 109, 103, 77],
    [24, 35, 55, 64, 81, 104, 113, 92],
    [49, 64, 78, 87, 103, 121, 120, 101],
    [72, 92, 95, 98, 112, 100, 103, 99],
];

/// Coefficients after quantization.
pub type QuantizedBlock = [[i32; BLOCK_SIZE]; BLOCK_SIZE];

/// Quantization matrix derived from a quality factor in `1..=100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationMatrix {
    quality: u8,
    table: [[u32; BLOCK_SIZE]; BLOCK_SIZE],
}

impl QuantizationMatrix {
    /// Scale the luminance table for `quality` (same curve as libjpeg).
    pub fn with_quality(quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(Error::QualityOutOfRange(quality));
        }
        let scale = if quality < 50 {
            5000.0 / f64::from(quality)
        } else {
            f64::from(200 - 2 * u32::from(quality))
        };

        let mut table = [[0u32; BLOCK_SIZE]; BLOCK_SIZE];
        for (row, base_row) in table.iter_mut().zip(STD_LUMINANCE_TABLE.iter()) {
            for (entry, &base) in row.iter_mut().zip(base_row.iter()) {
                let scaled = ((f64::from(base) * scale + 50.0) / 100.0).floor();
                // Zero entries would divide by zero.
                *entry = (scaled as u32).max(1);
            }
        }
        Ok(QuantizationMatrix { quality, table })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn entries(&self) -> &[[u32; BLOCK_SIZE]; BLOCK_SIZE] {
        &self.table
    }

    /// Divide each coefficient by its table entry and round to the nearest integer.
    pub fn quantize(&self, coefficients: &Block) -> QuantizedBlock {
        let mut out = [[0i32; BLOCK_SIZE]; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            for j in 0..BLOCK_SIZE {
                out[i][j] = (coefficients[i][j] / f64::from(self.table[i][j])).round() as i32;
            }
        }
        out
    }

    /// Multiply each quantized coefficient by its table entry.
    pub fn dequantize(&self, quantized: &QuantizedBlock) -> Block {
        let mut out = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            for j in 0..BLOCK_SIZE {
                out[i][j] = f64::from(quantized[i][j]) * f64::from(self.table[i][j]);
            }
        }
        out
    }
}
