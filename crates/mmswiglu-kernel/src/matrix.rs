use mmswiglu_tiling::{CoreAssignment, TilingPlan};

use crate::element::Element;
use crate::error::{KernelError, Result};

/// Read-only window onto an operand in global memory.
///
/// `at(row, col)` addresses the logical (untransposed) matrix; a transposed
/// view reads the stored matrix column-wise. `ld` is the row stride of the
/// stored layout.
#[derive(Debug, Clone, Copy)]
pub struct OperandView<'a, T> {
    data: &'a [T],
    offset: usize,
    ld: usize,
    transposed: bool,
}

impl<'a, T: Element> OperandView<'a, T> {
    pub fn new(data: &'a [T], offset: usize, ld: usize, transposed: bool) -> Self {
        OperandView {
            data,
            offset,
            ld,
            transposed,
        }
    }

    /// View of this core's slice of A (logical `M x K`).
    pub fn left(data: &'a [T], plan: &TilingPlan, assignment: &CoreAssignment) -> Self {
        let ld = if plan.trans_a { plan.m } else { plan.k };
        OperandView::new(data, assignment.a_offset, ld, plan.trans_a)
    }

    /// View of this core's slice of the gate half of B (logical `K x N`).
    pub fn gate(data: &'a [T], plan: &TilingPlan, assignment: &CoreAssignment) -> Self {
        OperandView::new(data, assignment.gate_b_offset, Self::b_ld(plan), plan.trans_b)
    }

    /// View of this core's slice of the up half of B (logical `K x N`).
    pub fn up(data: &'a [T], plan: &TilingPlan, assignment: &CoreAssignment) -> Self {
        OperandView::new(data, assignment.up_b_offset, Self::b_ld(plan), plan.trans_b)
    }

    fn b_ld(plan: &TilingPlan) -> usize {
        if plan.trans_b {
            plan.k
        } else {
            plan.n * 2
        }
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> T {
        let idx = if self.transposed {
            self.offset + col * self.ld + row
        } else {
            self.offset + row * self.ld + col
        };
        self.data[idx]
    }
}

/// One core's exclusive share of C: a mutable row segment for each valid
/// row of its block.
///
/// Destination offsets are expressed exactly as on the global matrix,
/// relative to the core's C-offset with row stride `ld` (= N), and are
/// translated to the owned segments on copy.
#[derive(Debug)]
pub struct CoreOutput<'a, T> {
    rows: Vec<&'a mut [T]>,
    ld: usize,
}

impl<'a, T: Copy> CoreOutput<'a, T> {
    /// Valid rows owned by this core.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Valid columns owned by this core.
    pub fn cols(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    /// Copy `rows` rows of `cols` elements from `src` (row stride
    /// `src_stride`) to `dst_offset` with destination row stride `ld`.
    ///
    /// Anything falling outside the owned block is clipped. Returns the number
    /// of elements written.
    pub fn copy_strided(
        &mut self,
        dst_offset: usize,
        src: &[T],
        src_stride: usize,
        rows: usize,
        cols: usize,
    ) -> Result<usize> {
        if rows > 0 && src.len() < (rows - 1) * src_stride + cols {
            return Err(KernelError::BufferMismatch {
                stage: "copy_strided",
                expected: (rows - 1) * src_stride + cols,
                got: src.len(),
            });
        }

        let mut written = 0;
        for r in 0..rows {
            let dst = dst_offset + r * self.ld;
            let (row, col) = (dst / self.ld, dst % self.ld);
            let Some(segment) = self.rows.get_mut(row) else {
                break;
            };
            if col >= segment.len() {
                continue;
            }
            let len = cols.min(segment.len() - col);
            let start = r * src_stride;
            segment[col..col + len].copy_from_slice(&src[start..start + len]);
            written += len;
        }
        Ok(written)
    }
}

/// Split C into per-core outputs, indexed by linear core index.
///
/// Every element of C lands in exactly one core's output; the borrow checker
/// enforces that cores cannot overlap.
pub fn split_output<'a, T>(c: &'a mut [T], plan: &TilingPlan) -> Vec<CoreOutput<'a, T>> {
    let m_blocks = plan.m_blocks();
    let n_blocks = plan.n_blocks();
    let mut cores: Vec<CoreOutput<'a, T>> = (0..m_blocks * n_blocks)
        .map(|_| CoreOutput {
            rows: Vec::with_capacity(plan.single_core_m),
            ld: plan.n,
        })
        .collect();

    for (r, row) in c.chunks_mut(plan.n).take(plan.m).enumerate() {
        let row_core = r / plan.single_core_m;
        let mut rest = row;
        for col_core in 0..n_blocks {
            let width = plan.single_core_n.min(rest.len());
            let (segment, tail) = std::mem::take(&mut rest).split_at_mut(width);
            cores[row_core + col_core * m_blocks].rows.push(segment);
            rest = tail;
        }
    }
    cores
}

/// One core's private accumulation space, one region per branch.
///
/// Each region holds `rows * cols` f32 accumulators laid out with row stride
/// `cols`, the valid extent of the core's C block.
#[derive(Debug)]
pub struct CoreWorkspace<'a> {
    pub gate: &'a mut [f32],
    pub up: &'a mut [f32],
}

/// Split the workspace into per-core gate/up regions, indexed by linear core
/// index. Regions are sized by each core's clipped extent, so the whole
/// launch needs exactly `2 * M * N` elements.
pub fn split_workspace<'a>(
    workspace: &'a mut [f32],
    plan: &TilingPlan,
) -> Result<Vec<CoreWorkspace<'a>>> {
    if workspace.len() < plan.workspace_len() {
        return Err(KernelError::OperandTooSmall {
            name: "workspace",
            expected: plan.workspace_len(),
            got: workspace.len(),
        });
    }
    let mut rest = workspace;
    let mut regions = Vec::with_capacity(plan.grid_cores());
    for assignment in (0..plan.grid_cores()).filter_map(|core| plan.assignment(core)) {
        let half = assignment.rows * assignment.cols;
        let (region, tail) = std::mem::take(&mut rest).split_at_mut(2 * half);
        let (gate, up) = region.split_at_mut(half);
        regions.push(CoreWorkspace { gate, up });
        rest = tail;
    }
    Ok(regions)
}
