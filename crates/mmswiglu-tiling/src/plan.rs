use crate::assignment::CoreAssignment;
use crate::dtype::DType;
use crate::error::{Result, TilingError};
use crate::shape::{ceil_div, MatmulShape};

/// Order in which a core walks its result tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraverseOrder {
    /// Walk down M first, then step along N.
    FirstM,
    /// Walk along N first, then step down M.
    FirstN,
}

impl TraverseOrder {
    pub fn from_word(word: u32) -> Option<TraverseOrder> {
        match word {
            0 => Some(TraverseOrder::FirstM),
            1 => Some(TraverseOrder::FirstN),
            _ => None,
        }
    }

    pub fn to_word(&self) -> u32 {
        match self {
            TraverseOrder::FirstM => 0,
            TraverseOrder::FirstN => 1,
        }
    }
}

/// Shape decomposition and buffer sizing shared by every core.
///
/// Created once per problem shape by the planner (or decoded from its blob)
/// and read-only afterwards. All sizes are in elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingPlan {
    /// Number of cores the plan was made for.
    pub used_core_num: usize,
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub single_core_m: usize,
    pub single_core_n: usize,
    pub single_core_k: usize,
    pub base_m: usize,
    pub base_n: usize,
    pub base_k: usize,
    /// Base tiles along M returned per fetch.
    pub step_m: usize,
    /// Base tiles along N returned per fetch.
    pub step_n: usize,
    /// `base_k` slabs of A accumulated before a result flush.
    pub step_ka: usize,
    /// `base_k` slabs of B accumulated before a result flush.
    pub step_kb: usize,
    pub traverse: TraverseOrder,
    pub trans_a: bool,
    pub trans_b: bool,
    pub bias: bool,
    /// Row bands per result tile.
    pub split_row_nums: usize,
    pub dtype: DType,
    /// SiLU gain.
    pub alpha: f32,
}

impl TilingPlan {
    pub fn shape(&self) -> MatmulShape {
        MatmulShape::new(self.m, self.k, self.n)
    }

    /// Number of core blocks along M (`ceil(M / singleCoreM)`).
    pub fn m_blocks(&self) -> usize {
        ceil_div(self.m, self.single_core_m)
    }

    /// Number of core blocks along N.
    pub fn n_blocks(&self) -> usize {
        ceil_div(self.n, self.single_core_n)
    }

    /// Cores that own a region of C. Cores past this index idle.
    pub fn grid_cores(&self) -> usize {
        self.m_blocks() * self.n_blocks()
    }

    /// Result tiles each core produces.
    pub fn tile_count(&self) -> usize {
        (self.single_core_m * self.single_core_n) / (self.base_m * self.base_n)
    }

    /// Tiles stacked along M within one core.
    pub fn m_tiles_per_core(&self) -> usize {
        self.single_core_m / self.base_m
    }

    pub fn tile_len(&self) -> usize {
        self.base_m * self.base_n
    }

    /// Rows in one activation band (`baseM / splitRowNums`).
    pub fn split_row_size(&self) -> usize {
        self.base_m / self.split_row_nums
    }

    pub fn band_len(&self) -> usize {
        self.split_row_size() * self.base_n
    }

    /// Bands stacked along M within one core (`singleCoreM / splitRowSize`).
    pub fn round_m(&self) -> usize {
        self.single_core_m / self.split_row_size()
    }

    /// Total bands each core writes.
    pub fn bands_per_core(&self) -> usize {
        self.tile_count() * self.split_row_nums
    }

    /// Elements of f32 workspace a launch needs: a gate and an up accumulator
    /// for every element of C. Each core owns `2 * rows * cols` of it.
    pub fn workspace_len(&self) -> usize {
        2 * self.m * self.n
    }

    /// Scratch bytes reserved per core: gate and up queues, the activation
    /// output queue (all double-buffered) and one f32 band of temporaries.
    pub fn scratch_bytes(&self) -> usize {
        let elem = self.dtype.size_in_bytes();
        let slots = 2;
        2 * slots * self.tile_len() * elem + slots * self.band_len() * elem + self.band_len() * 4
    }

    /// Offsets of core `core_index`, or `None` if it owns no part of C.
    pub fn assignment(&self, core_index: usize) -> Option<CoreAssignment> {
        CoreAssignment::new(self, core_index)
    }

    /// Check every invariant the kernel relies on.
    pub fn validate(&self) -> Result<()> {
        if self.shape().is_empty() {
            return Err(TilingError::InvalidShape {
                m: self.m,
                k: self.k,
                n: self.n,
            });
        }
        if self.used_core_num == 0 {
            return Err(TilingError::InvalidCoreNum(self.used_core_num));
        }
        let fits = self
            .shape()
            .checked_lens()
            .and_then(|(_, _, c)| c.checked_mul(2))
            .is_some()
            && self.single_core_m.checked_mul(self.single_core_n).is_some()
            && self
                .base_m
                .checked_mul(self.base_n)
                .and_then(|t| t.checked_mul(32))
                .is_some();
        if !fits {
            return Err(TilingError::Invariant(format!(
                "m={} k={} n={} with {}x{} blocks overflows the address space",
                self.m,
                self.k,
                self.n,
                self.single_core_m,
                self.single_core_n
            )));
        }
        let sizes = [
            ("single_core_m", self.single_core_m),
            ("single_core_n", self.single_core_n),
            ("base_m", self.base_m),
            ("base_n", self.base_n),
            ("base_k", self.base_k),
            ("step_m", self.step_m),
            ("step_n", self.step_n),
            ("step_ka", self.step_ka),
            ("step_kb", self.step_kb),
            ("split_row_nums", self.split_row_nums),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(TilingError::Invariant(format!("{} must be non-zero", name)));
        }
        if self.single_core_k != self.k {
            return Err(TilingError::Invariant(format!(
                "single_core_k={} must equal k={}",
                self.single_core_k, self.k
            )));
        }
        if self.single_core_m % self.base_m != 0 || self.single_core_n % self.base_n != 0 {
            return Err(TilingError::Invariant(format!(
                "per-core block {}x{} is not a whole number of {}x{} tiles",
                self.single_core_m, self.single_core_n, self.base_m, self.base_n
            )));
        }
        if self.base_m % self.split_row_nums != 0 {
            return Err(TilingError::InvalidSplit {
                base_m: self.base_m,
                split_row_nums: self.split_row_nums,
            });
        }
        if self.step_m != 1 || self.step_n != 1 {
            return Err(TilingError::Unsupported(format!(
                "step_m={} step_n={} (one tile per fetch is required)",
                self.step_m, self.step_n
            )));
        }
        if self.step_ka.saturating_mul(self.base_k) < self.k
            || self.step_kb.saturating_mul(self.base_k) < self.k
        {
            return Err(TilingError::Invariant(format!(
                "k steps {}/{} of {} do not cover k={}",
                self.step_ka, self.step_kb, self.base_k, self.k
            )));
        }
        if self.traverse != TraverseOrder::FirstM {
            return Err(TilingError::Unsupported(
                "only M-first traversal is implemented".to_string(),
            ));
        }
        if self.bias {
            return Err(TilingError::Unsupported(
                "bias is not supported by the fused kernel".to_string(),
            ));
        }
        if !self.alpha.is_finite() {
            return Err(TilingError::Invariant(format!("alpha={} is not finite", self.alpha)));
        }
        if self.grid_cores() > self.used_core_num {
            return Err(TilingError::Invariant(format!(
                "grid needs {} cores but plan has {}",
                self.grid_cores(),
                self.used_core_num
            )));
        }
        Ok(())
    }
}
