// Tile-level multiply-accumulate for the CPU engine.

use std::ops::Range;

use crate::element::Element;
use crate::engine::TileWindow;
use crate::matrix::OperandView;

/// `acc[i, j] += sum_p a[row0 + i, p] * b[p, col0 + j]` over `p in k`.
///
/// Loop order is i-p-j so the inner loop walks a row of B; for every output
/// element the K terms are added in ascending order.
pub(crate) fn mma_tile<T: Element>(
    a: &OperandView<'_, T>,
    b: &OperandView<'_, T>,
    tile: &TileWindow,
    k: Range<usize>,
    acc: &mut [f32],
) {
    for i in 0..tile.rows {
        let row = &mut acc[i * tile.stride..i * tile.stride + tile.cols];
        for p in k.clone() {
            let av = a.at(tile.row0 + i, p).to_f32();
            for (j, out) in row.iter_mut().enumerate() {
                *out += av * b.at(p, tile.col0 + j).to_f32();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_offsets() {
        // A = 3x2, B = 2x3; compute the bottom-right 2x2 window of A @ B.
        let a = [1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
        let b = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let av = OperandView::new(&a, 0, 2, false);
        let bv = OperandView::new(&b, 0, 3, false);
        let tile = TileWindow { index: 0, row0: 1, col0: 1, rows: 2, cols: 2, stride: 2 };
        let mut acc = vec![0.0f32; 4];
        mma_tile(&av, &bv, &tile, 0..2, &mut acc);
        assert_eq!(acc, vec![5.0, 6.0, 7.0, 9.0]);
    }
}
