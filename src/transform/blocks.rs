//! Tiling of sample planes into transform blocks and back.

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::transform::dct::{Block, BLOCK_SIZE};

/// Number of blocks needed to tile a `height` × `width` plane, or `None` on overflow.
pub fn block_count(height: usize, width: usize) -> Option<usize> {
    height.div_ceil(BLOCK_SIZE).checked_mul(width.div_ceil(BLOCK_SIZE))
}

/// Split a plane into blocks in row-major tile order, zero padding the edge tiles.
pub fn split_into_blocks(plane: ArrayView2<'_, u8>) -> Vec<Block> {
    let (height, width) = plane.dim();
    let mut blocks = Vec::with_capacity(block_count(height, width).unwrap_or_default());
    for top in (0..height).step_by(BLOCK_SIZE) {
        for left in (0..width).step_by(BLOCK_SIZE) {
            let mut block = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
            for (i, row) in block.iter_mut().enumerate().take(height - top) {
                for (j, value) in row.iter_mut().enumerate().take(width - left) {
                    *value = f64::from(plane[[top + i, left + j]]);
                }
            }
            blocks.push(block);
        }
    }
    blocks
}

/// Reassemble blocks produced by [`split_into_blocks`], dropping the padding.
pub fn merge_blocks(blocks: &[Block], height: usize, width: usize) -> Result<Array2<f64>> {
    if block_count(height, width) != Some(blocks.len())
        || height.checked_mul(width).map_or(true, |len| len > isize::MAX as usize)
    {
        return Err(Error::malformed(format!(
            "{} blocks cannot tile a {height}x{width} plane",
            blocks.len()
        )));
    }

    let mut plane = Array2::zeros((height, width));
    let mut tiles = blocks.iter();
    for top in (0..height).step_by(BLOCK_SIZE) {
        for left in (0..width).step_by(BLOCK_SIZE) {
            let Some(block) = tiles.next() else {
                break;
            };
            for (i, row) in block.iter().enumerate().take(height - top) {
                for (j, &value) in row.iter().enumerate().take(width - left) {
                    plane[[top + i, left + j]] = value;
                }
            }
        }
    }
    Ok(plane)
}

/// Clip to `0..=255` and round to the nearest integer sample.
pub fn to_samples(plane: &Array2<f64>) -> Array2<u8> {
    plane.mapv(|value| value.clamp(0.0, 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_count() {
        assert_eq!(block_count(8, 8), Some(1));
        assert_eq!(block_count(9, 8), Some(2));
        assert_eq!(block_count(17, 10), Some(6));
        assert_eq!(block_count(0, 10), Some(0));
        assert_eq!(block_count(usize::MAX, usize::MAX), None);
    }

    #[test]
    fn test_edge_tiles_are_zero_padded() {
        let plane = Array2::from_elem((10, 9), 200u8);
        let blocks = split_into_blocks(plane.view());
        assert_eq!(blocks.len(), 4);
        // Bottom-right tile covers a single column of two rows.
        let corner = &blocks[3];
        assert_eq!(corner[0][0], 200.0);
        assert_eq!(corner[1][0], 200.0);
        assert_eq!(corner[0][1], 0.0);
        assert_eq!(corner[2][0], 0.0);
    }

    #[test]
    fn test_split_merge_identity() {
        let plane = Array2::from_shape_fn((13, 21), |(i, j)| ((i * 31 + j * 7) % 256) as u8);
        let blocks = split_into_blocks(plane.view());
        let merged = merge_blocks(&blocks, 13, 21).unwrap();
        assert_eq!(to_samples(&merged), plane);
    }

    #[test]
    fn test_merge_rejects_wrong_count() {
        let blocks = vec![[[0.0; BLOCK_SIZE]; BLOCK_SIZE]; 3];
        assert!(matches!(
            merge_blocks(&blocks, 16, 16),
            Err(Error::MalformedArtifact(_))
        ));
        assert!(matches!(
            merge_blocks(&[], 1 << 40, 1 << 30),
            Err(Error::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_to_samples_clips_and_rounds() {
        let plane = Array2::from_shape_vec((1, 4), vec![-12.0, 12.4, 12.6, 300.0]).unwrap();
        let samples: Vec<u8> = to_samples(&plane).iter().copied().collect();
        assert_eq!(samples, vec![0, 12, 13, 255]);
    }
}
