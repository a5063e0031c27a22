use std::fmt::Debug;

use half::f16;
use mmswiglu_tiling::DType;

/// Storage type of the operands and of the output.
///
/// Compute always happens in f32; elements are widened on load and rounded
/// on store.
pub trait Element: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The plan dtype this element type runs.
    const DTYPE: DType;

    fn to_f32(self) -> f32;

    fn from_f32(v: f32) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}
