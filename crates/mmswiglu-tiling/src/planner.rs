use tracing::{debug, trace};

use crate::config::{PlatformConfig, TilingRequest};
use crate::error::{Result, TilingError};
use crate::plan::{TilingPlan, TraverseOrder};
use crate::shape::{ceil_div, round_up, MatmulShape};

/// Sub-tile edge lengths tried by the planner, largest first.
const BASE_SIZES: [usize; 5] = [256, 128, 64, 32, 16];

/// Host-side planner that turns a [`TilingRequest`] into a [`TilingPlan`].
///
/// Planning is a pure function of the request and the platform: identical
/// inputs always produce a byte-identical blob.
#[derive(Debug, Clone, Default)]
pub struct TilePlanner {
    platform: PlatformConfig,
}

impl TilePlanner {
    pub fn new(platform: PlatformConfig) -> Self {
        TilePlanner { platform }
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Plan the request and serialize the result.
    pub fn plan_blob(&self, request: &TilingRequest) -> Result<Vec<u8>> {
        self.plan(request)?.to_bytes()
    }

    /// Choose the core grid, sub-tile shape and step counts for `request`.
    ///
    /// # Errors
    /// Fails on degenerate requests and when no `(base_m, base_n)` candidate
    /// satisfies the divisibility and buffer-budget constraints.
    pub fn plan(&self, request: &TilingRequest) -> Result<TilingPlan> {
        let shape = request.shape;
        if shape.is_empty() {
            return Err(TilingError::InvalidShape {
                m: shape.m,
                k: shape.k,
                n: shape.n,
            });
        }
        if request.core_num == 0 {
            return Err(TilingError::InvalidCoreNum(request.core_num));
        }
        if request.split_row_nums == 0 {
            return Err(TilingError::Unsupported(
                "split_row_nums must be non-zero".to_string(),
            ));
        }
        if request.bias {
            return Err(TilingError::Unsupported(
                "bias is not supported by the fused kernel".to_string(),
            ));
        }
        if !request.alpha.is_finite() {
            return Err(TilingError::Unsupported(format!(
                "alpha={} is not finite",
                request.alpha
            )));
        }

        let candidates = match request.fixed_base {
            Some(base) => vec![base],
            None => self.base_candidates(&shape),
        };

        let mut last_reason = String::from("no base candidates");
        for (base_m, base_n) in candidates {
            if let Err(reason) = self.check_base(request, base_m, base_n) {
                trace!(base_m, base_n, %reason, "rejected base tile");
                last_reason = reason;
                continue;
            }

            let Some(base_k) = self.pick_base_k(request, base_m, base_n) else {
                last_reason = format!("no base_k fits L0 for {}x{}", base_m, base_n);
                trace!(base_m, base_n, %last_reason, "rejected base tile");
                continue;
            };
            let (single_core_m, single_core_n) =
                partition(&shape, request.core_num, base_m, base_n);
            let k_steps = ceil_div(shape.k, base_k);

            let mut plan = TilingPlan {
                used_core_num: 0,
                m: shape.m,
                k: shape.k,
                n: shape.n,
                single_core_m,
                single_core_n,
                single_core_k: shape.k,
                base_m,
                base_n,
                base_k,
                step_m: 1,
                step_n: 1,
                step_ka: k_steps,
                step_kb: k_steps,
                traverse: TraverseOrder::FirstM,
                trans_a: request.trans_a,
                trans_b: request.trans_b,
                bias: false,
                split_row_nums: request.split_row_nums,
                dtype: request.dtype,
                alpha: request.alpha,
            };
            plan.used_core_num = plan.grid_cores();
            plan.validate()?;

            debug!(
                shape = %shape,
                cores = plan.used_core_num,
                single_core_m,
                single_core_n,
                base_m,
                base_n,
                base_k,
                tiles_per_core = plan.tile_count(),
                scratch_bytes = plan.scratch_bytes(),
                "tiling plan selected"
            );
            return Ok(plan);
        }

        Err(TilingError::Unsatisfiable {
            shape: shape.to_string(),
            core_num: request.core_num,
            reason: last_reason,
        })
    }

    /// All `(base_m, base_n)` pairs that do not overshoot the problem, by
    /// area descending, then `base_m` descending.
    fn base_candidates(&self, shape: &MatmulShape) -> Vec<(usize, usize)> {
        let max_m = round_up(shape.m, self.platform.fractal);
        let max_n = round_up(shape.n, self.platform.fractal);
        let mut pairs: Vec<(usize, usize)> = BASE_SIZES
            .iter()
            .filter(|&&bm| bm <= max_m)
            .flat_map(|&bm| {
                BASE_SIZES
                    .iter()
                    .filter(move |&&bn| bn <= max_n)
                    .map(move |&bn| (bm, bn))
            })
            .collect();
        pairs.sort_by(|a, b| (b.0 * b.1, b.0).cmp(&(a.0 * a.1, a.0)));
        pairs
    }

    /// Returns why `(base_m, base_n)` cannot be used, if it cannot.
    fn check_base(
        &self,
        request: &TilingRequest,
        base_m: usize,
        base_n: usize,
    ) -> std::result::Result<(), String> {
        let p = &self.platform;
        let elem = request.dtype.size_in_bytes();

        if base_m == 0 || base_n == 0 {
            return Err(format!("base {}x{} is empty", base_m, base_n));
        }
        if base_m % p.fractal != 0 || base_n % p.fractal != 0 {
            return Err(format!(
                "base {}x{} is not a multiple of the {} fractal",
                base_m, base_n, p.fractal
            ));
        }
        if base_m % request.split_row_nums != 0 {
            return Err(format!(
                "base_m={} is not divisible into {} bands",
                base_m, request.split_row_nums
            ));
        }
        if (base_n * elem) % p.block_bytes != 0 {
            return Err(format!(
                "band row of {} bytes is not a whole number of {}-byte blocks",
                base_n * elem,
                p.block_bytes
            ));
        }
        if base_m * base_n * 4 > p.l0c_bytes {
            return Err(format!(
                "accumulator tile {}x{} exceeds {} bytes",
                base_m, base_n, p.l0c_bytes
            ));
        }
        if 2 * base_m * p.fractal * elem > p.l0a_bytes
            || 2 * p.fractal * base_n * elem > p.l0b_bytes
        {
            return Err(format!(
                "double-buffered operand slabs for {}x{} exceed L0",
                base_m, base_n
            ));
        }

        let band = (base_m / request.split_row_nums) * base_n;
        let scratch = 2 * 2 * base_m * base_n * elem + 2 * band * elem + band * 4;
        if scratch > p.ub_bytes {
            return Err(format!(
                "double-buffered scratch of {} bytes exceeds budget of {}",
                scratch, p.ub_bytes
            ));
        }
        Ok(())
    }

    /// Largest `base_k` whose double-buffered A and B slabs fit L0A / L0B,
    /// if any does.
    fn pick_base_k(&self, request: &TilingRequest, base_m: usize, base_n: usize) -> Option<usize> {
        let p = &self.platform;
        let elem = request.dtype.size_in_bytes();
        let max_k = round_up(request.shape.k, p.fractal);
        BASE_SIZES
            .iter()
            .copied()
            .filter(|&bk| bk <= max_k)
            .chain(std::iter::once(p.fractal))
            .find(|&bk| 2 * base_m * bk * elem <= p.l0a_bytes && 2 * bk * base_n * elem <= p.l0b_bytes)
    }
}

/// Split the tile grid of C over at most `core_num` cores, M-blocks first.
///
/// Minimizes the tiles any one core must produce, then the number of cores
/// used, then the number of row blocks.
fn partition(shape: &MatmulShape, core_num: usize, base_m: usize, base_n: usize) -> (usize, usize) {
    let m_tiles = ceil_div(shape.m, base_m);
    let n_tiles = ceil_div(shape.n, base_n);

    let mut best: Option<((usize, usize, usize), (usize, usize))> = None;
    for mb in 1..=core_num.min(m_tiles) {
        let nb = (core_num / mb).min(n_tiles);
        let single_core_m = ceil_div(m_tiles, mb) * base_m;
        let single_core_n = ceil_div(n_tiles, nb) * base_n;
        let tiles = (single_core_m / base_m) * (single_core_n / base_n);
        let used = ceil_div(shape.m, single_core_m) * ceil_div(shape.n, single_core_n);
        let key = (tiles, used, mb);
        if best.map_or(true, |(k, _)| key < k) {
            best = Some((key, (single_core_m, single_core_n)));
        }
    }
    // m_tiles and core_num are both >= 1, so the loop ran at least once.
    best.map(|(_, sizes)| sizes).unwrap_or((round_up(shape.m, base_m), round_up(shape.n, base_n)))
}
