// Elementwise activation helpers for the CPU engine.

use crate::element::Element;

/// `tmp[i] = sigmoid(alpha * gate[i])`.
///
/// Written as `1 / (1 + exp(-x))`: large negative inputs saturate to 0 and
/// large positive inputs to 1 without producing NaN.
pub(crate) fn sigmoid_into<T: Element>(tmp: &mut [f32], gate: &[T], alpha: f32) {
    for (t, &g) in tmp.iter_mut().zip(gate) {
        let x = alpha * g.to_f32();
        *t = 1.0 / (1.0 + (-x).exp());
    }
}

/// `x * s` where `s = sigmoid(x)`. A sigmoid that underflowed to 0 yields 0,
/// so `x = -inf` gives 0 rather than NaN.
#[inline]
fn gated(x: f32, s: f32) -> f32 {
    if s == 0.0 {
        0.0
    } else {
        x * s
    }
}

/// `out[i] = up[i] * (alpha * gate[i]) * sig[i]`, with `sig` from
/// [`sigmoid_into`].
pub(crate) fn swiglu_into<T: Element>(out: &mut [T], up: &[T], gate: &[T], sig: &[f32], alpha: f32) {
    for (((o, &u), &g), &s) in out.iter_mut().zip(up).zip(gate).zip(sig) {
        let x = alpha * g.to_f32();
        *o = T::from_f32(u.to_f32() * gated(x, s));
    }
}

/// SiLU of a single value, `x * sigmoid(x)`.
#[inline]
pub fn silu(x: f32) -> f32 {
    gated(x, 1.0 / (1.0 + (-x).exp()))
}
