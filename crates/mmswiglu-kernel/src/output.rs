use mmswiglu_tiling::TilingPlan;
use tracing::trace;

use crate::error::Result;
use crate::matrix::CoreOutput;
use crate::queue::SlotConsumer;

/// Where band `count` of a core lands in C, relative to the core's C-offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandPlacement {
    pub row_block: usize,
    pub col_block: usize,
    pub start_offset: usize,
}

impl BandPlacement {
    pub fn for_band(plan: &TilingPlan, count: usize) -> Self {
        let split_row_size = plan.split_row_size();
        let round_m = plan.round_m();
        let row_block = count % round_m;
        let col_block = count / round_m;
        BandPlacement {
            row_block,
            col_block,
            start_offset: row_block * split_row_size * plan.n + col_block * plan.base_n,
        }
    }
}

/// Strided copy of activated bands from their slots into C.
#[derive(Debug, Clone, Copy)]
pub struct OutputStage<'a> {
    plan: &'a TilingPlan,
}

impl<'a> OutputStage<'a> {
    pub fn new(plan: &'a TilingPlan) -> Self {
        OutputStage { plan }
    }

    /// Dequeue the next activated band, write it as band `count` and release
    /// its slot. Returns the number of elements written after clipping.
    pub fn copy_out<T: Copy>(
        &self,
        count: usize,
        queue: &SlotConsumer<T>,
        dst: &mut CoreOutput<'_, T>,
    ) -> Result<usize> {
        let slot = queue.dequeue()?;
        let place = BandPlacement::for_band(self.plan, count);
        let written = dst.copy_strided(
            place.start_offset,
            slot.as_slice(),
            self.plan.base_n,
            self.plan.split_row_size(),
            self.plan.base_n,
        );
        queue.release(slot);
        let written = written?;
        trace!(count, row_block = place.row_block, col_block = place.col_block, written, "band copied");
        Ok(written)
    }
}
