//! Orthonormal 8×8 discrete cosine transform.
//!
//! The transform is the matrix product `D · B · Dᵗ` where row `k` of the
//! basis `D` is `sqrt(1/N)` for `k = 0` and
//! `sqrt(2/N) · cos(π (2n + 1) k / 2N)` otherwise. Since `D` is orthogonal
//! the inverse is `Dᵗ · C · D`.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// Side length of a transform block.
pub const BLOCK_SIZE: usize = 8;

/// A square block of samples or coefficients.
pub type Block = [[f64; BLOCK_SIZE]; BLOCK_SIZE];

/// The DCT basis matrix, computed on first use.
pub fn basis() -> &'static Block {
    static BASIS: OnceLock<Block> = OnceLock::new();
    BASIS.get_or_init(build_basis)
}

fn build_basis() -> Block {
    let n = BLOCK_SIZE as f64;
    let dc = (1.0 / n).sqrt();
    let ac = (2.0 / n).sqrt();
    let mut basis = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
    for (k, row) in basis.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            *value = if k == 0 {
                dc
            } else {
                ac * (PI * (2 * i + 1) as f64 * k as f64 / (2.0 * n)).cos()
            };
        }
    }
    basis
}

fn multiply(a: &Block, b: &Block) -> Block {
    let mut out = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            *value = (0..BLOCK_SIZE).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn transpose(a: &Block) -> Block {
    let mut out = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
    for (i, row) in a.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            out[j][i] = value;
        }
    }
    out
}

/// Forward 2-D DCT of a block of samples.
pub fn forward(block: &Block) -> Block {
    let d = basis();
    multiply(&multiply(d, block), &transpose(d))
}

/// Inverse 2-D DCT of a block of coefficients.
pub fn inverse(coefficients: &Block) -> Block {
    let d = basis();
    multiply(&multiply(&transpose(d), coefficients), d)
}
