pub mod matmul;
pub mod unary;

use std::ops::Range;

use crate::element::Element;
use crate::engine::{ElementwiseEngine, MatrixMultiplyEngine, TileWindow};
use crate::error::{KernelError, Result};
use crate::matrix::OperandView;

/// Pure-Rust CPU compute engine.
///
/// Implements both engine traits with straightforward loops optimized for
/// correctness rather than peak performance. Intended as a reference
/// implementation and fallback.
#[derive(Debug, Clone)]
pub struct CpuEngine;

impl CpuEngine {
    pub fn new() -> Self {
        CpuEngine
    }
}

impl Default for CpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> MatrixMultiplyEngine<T> for CpuEngine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn mma(
        &self,
        a: &OperandView<'_, T>,
        b: &OperandView<'_, T>,
        tile: &TileWindow,
        k: Range<usize>,
        acc: &mut [f32],
    ) -> Result<()> {
        if tile.cols > tile.stride {
            return Err(KernelError::Other(format!(
                "mma: tile has {} cols but stride {}",
                tile.cols, tile.stride
            )));
        }
        let needed = tile.rows.saturating_sub(1) * tile.stride + tile.cols;
        if tile.rows > 0 && acc.len() < needed {
            return Err(KernelError::BufferMismatch {
                stage: "mma",
                expected: needed,
                got: acc.len(),
            });
        }
        matmul::mma_tile(a, b, tile, k, acc);
        Ok(())
    }
}

impl<T: Element> ElementwiseEngine<T> for CpuEngine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn swiglu(
        &self,
        out: &mut [T],
        up: &[T],
        gate: &[T],
        alpha: f32,
        tmp: &mut [f32],
    ) -> Result<()> {
        if up.len() != out.len() || gate.len() != out.len() {
            return Err(KernelError::BufferMismatch {
                stage: "swiglu",
                expected: out.len(),
                got: up.len().min(gate.len()),
            });
        }
        if tmp.len() < out.len() {
            return Err(KernelError::BufferMismatch {
                stage: "swiglu scratch",
                expected: out.len(),
                got: tmp.len(),
            });
        }
        let tmp = &mut tmp[..out.len()];
        unary::sigmoid_into(tmp, gate, alpha);
        unary::swiglu_into(out, up, gate, tmp, alpha);
        Ok(())
    }
}
