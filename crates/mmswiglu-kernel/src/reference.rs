//! Unfused golden computation used to validate launches.

use mmswiglu_tiling::MatmulShape;

use crate::cpu::unary::silu;
use crate::element::Element;

/// `C = (A @ B_up) * silu(alpha * (A @ B_gate))`, computed without tiling.
///
/// Both matmul results are accumulated in f32 and rounded to `T` before the
/// activation, matching the rounding points of the fused kernel. `b` uses the
/// combined layout: `K x 2N` with gate in columns `[0, N)`, or `2N x K` with
/// gate in rows `[0, N)` when `trans_b` is set.
pub fn matmul_swiglu<T: Element>(
    a: &[T],
    b: &[T],
    shape: MatmulShape,
    trans_a: bool,
    trans_b: bool,
    alpha: f32,
) -> Vec<T> {
    let MatmulShape { m, k, n } = shape;
    let a_at = |i: usize, p: usize| {
        if trans_a {
            a[p * m + i]
        } else {
            a[i * k + p]
        }
    };
    let b_at = |p: usize, j: usize| {
        if trans_b {
            b[j * k + p]
        } else {
            b[p * 2 * n + j]
        }
    };

    let mut out = Vec::with_capacity(m * n);
    for i in 0..m {
        for j in 0..n {
            let mut gate = 0.0f32;
            let mut up = 0.0f32;
            for p in 0..k {
                let x = a_at(i, p).to_f32();
                gate += x * b_at(p, j).to_f32();
                up += x * b_at(p, j + n).to_f32();
            }
            let gate = T::from_f32(gate).to_f32();
            let up = T::from_f32(up).to_f32();
            out.push(T::from_f32(up * silu(alpha * gate)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use half::f16;

    #[test]
    fn test_reference_small() {
        // A = [1 2], B = [[1, 3], [0, 1]] -> gate = 1, up = 5.
        let a = [1.0f32, 2.0];
        let b = [1.0f32, 3.0, 0.0, 1.0];
        let out = matmul_swiglu(&a, &b, MatmulShape::new(1, 2, 1), false, false, 1.0);
        assert_relative_eq!(out[0], 5.0 * 0.7310586, epsilon = 1e-5);
    }

    #[test]
    fn test_reference_layouts_agree() {
        let shape = MatmulShape::new(3, 2, 2);
        let a: Vec<f32> = (0..6).map(|v| v as f32 * 0.25).collect();
        let b: Vec<f32> = (0..8).map(|v| 1.0 - v as f32 * 0.125).collect();
        // Transposed copies: A as K x M, B as 2N x K.
        let mut at = vec![0.0f32; 6];
        for i in 0..3 {
            for p in 0..2 {
                at[p * 3 + i] = a[i * 2 + p];
            }
        }
        let mut bt = vec![0.0f32; 8];
        for p in 0..2 {
            for j in 0..4 {
                bt[j * 2 + p] = b[p * 4 + j];
            }
        }
        let plain = matmul_swiglu(&a, &b, shape, false, false, 1.0);
        assert_eq!(plain, matmul_swiglu(&at, &b, shape, true, false, 1.0));
        assert_eq!(plain, matmul_swiglu(&a, &bt, shape, false, true, 1.0));
        assert_eq!(plain, matmul_swiglu(&at, &bt, shape, true, true, 1.0));
    }

    #[test]
    fn test_reference_rounds_to_element() {
        let a = [f16::from_f32(1.0), f16::from_f32(1.0)];
        let b = [
            f16::from_f32(0.1),
            f16::from_f32(0.3),
            f16::from_f32(0.2),
            f16::from_f32(0.4),
        ];
        let out = matmul_swiglu(&a, &b, MatmulShape::new(1, 2, 1), false, false, 2.0);
        let gate = f16::from_f32(f16::from_f32(0.1).to_f32() + f16::from_f32(0.2).to_f32());
        let up = f16::from_f32(f16::from_f32(0.3).to_f32() + f16::from_f32(0.4).to_f32());
        let want = f16::from_f32(up.to_f32() * silu(2.0 * gate.to_f32()));
        assert_eq!(out[0], want);
    }
}
