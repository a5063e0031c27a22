use std::fmt::Debug;
use std::ops::Range;

use crate::element::Element;
use crate::error::Result;
use crate::matrix::OperandView;

/// Position of one result tile inside a core's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    /// Linear tile index in traversal order.
    pub index: usize,
    /// First row of the tile, relative to the core's block.
    pub row0: usize,
    /// First column of the tile, relative to the core's block.
    pub col0: usize,
    /// Rows that hold real data; the rest of the tile is zero padding.
    pub rows: usize,
    /// Columns that hold real data.
    pub cols: usize,
    /// Row stride of the tile buffer (`base_n`).
    pub stride: usize,
}

/// Dense multiply-accumulate unit.
///
/// Implementations accumulate in f32; operands are widened from `T`.
pub trait MatrixMultiplyEngine<T: Element>: Send + Sync + Debug {
    /// Returns the name of this engine (e.g., "cpu").
    fn name(&self) -> &str;

    /// Accumulate one K slab into a tile: `acc += A[rows, k] @ B[k, cols]`.
    ///
    /// - `a`: logical `M x K` view of the core's left operand
    /// - `b`: logical `K x N` view of the core's right operand
    /// - `tile`: the output window; only `tile.rows x tile.cols` is touched
    /// - `k`: the K slab to accumulate
    /// - `acc`: row-major accumulator with row stride `tile.stride`
    fn mma(
        &self,
        a: &OperandView<'_, T>,
        b: &OperandView<'_, T>,
        tile: &TileWindow,
        k: Range<usize>,
        acc: &mut [f32],
    ) -> Result<()>;
}

/// Elementwise vector unit.
pub trait ElementwiseEngine<T: Element>: Send + Sync + Debug {
    /// Returns the name of this engine (e.g., "cpu").
    fn name(&self) -> &str;

    /// SwiGLU: `out[i] = up[i] * silu(alpha * gate[i])`.
    ///
    /// `tmp` holds at least `out.len()` f32 intermediates.
    fn swiglu(&self, out: &mut [T], up: &[T], gate: &[T], alpha: f32, tmp: &mut [f32])
        -> Result<()>;
}
