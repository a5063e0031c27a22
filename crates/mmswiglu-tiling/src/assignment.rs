use crate::plan::TilingPlan;

/// Where one core reads and writes, derived from a plan and the core's
/// linear index. Never stored; recomputed wherever it is needed.
///
/// Offsets are element offsets into the global operands:
/// - A: `M x K` row-major, or `K x M` when `trans_a`
/// - B: `K x 2N` row-major with the gate half in columns `[0, N)` and the up
///   half in `[N, 2N)`, or `2N x K` when `trans_b` with gate rows first
/// - C: `M x N` row-major
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    pub core_index: usize,
    pub row_core: usize,
    pub col_core: usize,
    pub a_offset: usize,
    pub gate_b_offset: usize,
    pub up_b_offset: usize,
    pub c_offset: usize,
    /// Start of this core's private region in the f32 workspace.
    pub workspace_offset: usize,
    /// Valid rows of this core's C block (short for the last row of cores).
    pub rows: usize,
    /// Valid columns of this core's C block (short for the last column of cores).
    pub cols: usize,
}

impl CoreAssignment {
    /// Compute the assignment of `core_index`, or `None` when the core falls
    /// outside the `m_blocks x n_blocks` grid.
    pub fn new(plan: &TilingPlan, core_index: usize) -> Option<CoreAssignment> {
        let m_blocks = plan.m_blocks();
        if core_index >= plan.grid_cores() {
            return None;
        }
        let row_core = core_index % m_blocks;
        let col_core = core_index / m_blocks;

        let a_offset = if plan.trans_a {
            row_core * plan.single_core_m
        } else {
            row_core * plan.k * plan.single_core_m
        };
        let gate_b_offset = if plan.trans_b {
            col_core * plan.k * plan.single_core_n
        } else {
            col_core * plan.single_core_n
        };
        // The up half is a fixed-stride sibling of the gate half: N columns to
        // the right, or N rows of K further down when B is transposed.
        let up_b_offset = if plan.trans_b {
            gate_b_offset + plan.k * plan.n
        } else {
            gate_b_offset + plan.n
        };
        let c_offset = row_core * plan.n * plan.single_core_m + col_core * plan.single_core_n;

        let rows = plan
            .single_core_m
            .min(plan.m - row_core * plan.single_core_m);
        let cols = plan
            .single_core_n
            .min(plan.n - col_core * plan.single_core_n);

        // Core regions are packed in core order: every column block to the
        // left is full width and spans all M rows.
        let workspace_offset =
            2 * (plan.m * col_core * plan.single_core_n + row_core * plan.single_core_m * cols);

        Some(CoreAssignment {
            core_index,
            row_core,
            col_core,
            a_offset,
            gate_b_offset,
            up_b_offset,
            c_offset,
            workspace_offset,
            rows,
            cols,
        })
    }

    /// Elements of f32 workspace owned by this core, gate then up.
    pub fn workspace_len(&self) -> usize {
        2 * self.rows * self.cols
    }

    /// First row of C owned by this core.
    pub fn row_start(&self, plan: &TilingPlan) -> usize {
        self.row_core * plan.single_core_m
    }

    /// First column of C owned by this core.
    pub fn col_start(&self, plan: &TilingPlan) -> usize {
        self.col_core * plan.single_core_n
    }
}
