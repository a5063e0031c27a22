use crate::dtype::DType;
use crate::shape::MatmulShape;

/// Number of row bands each result tile is split into before activation.
pub const DEFAULT_SPLIT_ROW_NUMS: usize = 2;

/// Gain applied to the gate branch inside SiLU.
pub const DEFAULT_ALPHA: f32 = 1.0;

/// On-chip resources of the target core that bound the sub-tile shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Unified scratch buffer (bytes) shared by the staging queues.
    pub ub_bytes: usize,
    /// Left-operand staging buffer of the multiply unit (bytes).
    pub l0a_bytes: usize,
    /// Right-operand staging buffer of the multiply unit (bytes).
    pub l0b_bytes: usize,
    /// f32 accumulator buffer of the multiply unit (bytes).
    pub l0c_bytes: usize,
    /// Native edge length of the multiply unit; base sizes are multiples of it.
    pub fractal: usize,
    /// Granularity (bytes) of strided copies to global memory.
    pub block_bytes: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            ub_bytes: 192 * 1024,
            l0a_bytes: 64 * 1024,
            l0b_bytes: 64 * 1024,
            l0c_bytes: 128 * 1024,
            fractal: 16,
            block_bytes: 32,
        }
    }
}

impl PlatformConfig {
    /// Override the scratch budget.
    pub fn with_ub_bytes(mut self, ub_bytes: usize) -> Self {
        self.ub_bytes = ub_bytes;
        self
    }
}

/// Everything the planner needs to know about one problem instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingRequest {
    pub shape: MatmulShape,
    /// Desired number of cores; the plan may use fewer.
    pub core_num: usize,
    pub dtype: DType,
    /// A is stored as `K x M`.
    pub trans_a: bool,
    /// B is stored as `2N x K` (gate rows first, then up rows).
    pub trans_b: bool,
    pub bias: bool,
    /// Force `(base_m, base_n)` instead of searching.
    pub fixed_base: Option<(usize, usize)>,
    pub split_row_nums: usize,
    pub alpha: f32,
}

impl TilingRequest {
    /// Create a request with f16 elements, no transposes, no bias and the
    /// default band split and gain.
    pub fn new(shape: MatmulShape, core_num: usize) -> Self {
        TilingRequest {
            shape,
            core_num,
            dtype: DType::F16,
            trans_a: false,
            trans_b: false,
            bias: false,
            fixed_base: None,
            split_row_nums: DEFAULT_SPLIT_ROW_NUMS,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_transpose(mut self, trans_a: bool, trans_b: bool) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Pin the sub-tile shape, as a caller would with a fixed split.
    pub fn with_fixed_split(mut self, base_m: usize, base_n: usize) -> Self {
        self.fixed_base = Some((base_m, base_n));
        self
    }

    pub fn with_split_row_nums(mut self, split_row_nums: usize) -> Self {
        self.split_row_nums = split_row_nums;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}
