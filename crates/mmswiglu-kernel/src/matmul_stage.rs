use mmswiglu_tiling::TilingPlan;
use tracing::trace;

use crate::element::Element;
use crate::engine::{MatrixMultiplyEngine, TileWindow};
use crate::error::{KernelError, Result};
use crate::matrix::OperandView;
use crate::queue::SlotProducer;

/// One tiled matrix multiply bound to a core's operands.
///
/// Operands and workspace are bound once; each [`TiledMatmul::fetch`] then
/// yields the next `base_m x base_n` tile in M-first order, accumulating the
/// whole K dimension in `base_k` slabs inside the private workspace. The
/// workspace mirrors the core's valid block (`rows x cols`, row stride
/// `cols`), so padding never occupies it.
#[derive(Debug)]
pub struct TiledMatmul<'a, T, E> {
    name: &'static str,
    engine: &'a E,
    a: OperandView<'a, T>,
    b: OperandView<'a, T>,
    workspace: &'a mut [f32],
    plan: &'a TilingPlan,
    rows: usize,
    cols: usize,
    cursor: usize,
    ended: bool,
}

impl<'a, T: Element, E: MatrixMultiplyEngine<T>> TiledMatmul<'a, T, E> {
    /// Bind A, B and the workspace region and begin iterating.
    ///
    /// `rows x cols` is the valid extent of the core's block; tiles reaching
    /// past it are zero-padded.
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        name: &'static str,
        engine: &'a E,
        a: OperandView<'a, T>,
        b: OperandView<'a, T>,
        workspace: &'a mut [f32],
        plan: &'a TilingPlan,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let needed = rows * cols;
        if workspace.len() < needed {
            return Err(KernelError::OperandTooSmall {
                name: "branch workspace",
                expected: needed,
                got: workspace.len(),
            });
        }
        Ok(TiledMatmul {
            name,
            engine,
            a,
            b,
            workspace,
            plan,
            rows,
            cols,
            cursor: 0,
            ended: false,
        })
    }

    /// Tiles not yet fetched.
    pub fn remaining(&self) -> usize {
        self.plan.tile_count() - self.cursor
    }

    /// Window of tile `index` in M-first order.
    pub fn window(&self, index: usize) -> TileWindow {
        let m_tiles = self.plan.m_tiles_per_core();
        let row0 = (index % m_tiles) * self.plan.base_m;
        let col0 = (index / m_tiles) * self.plan.base_n;
        TileWindow {
            index,
            row0,
            col0,
            rows: self.plan.base_m.min(self.rows.saturating_sub(row0)),
            cols: self.plan.base_n.min(self.cols.saturating_sub(col0)),
            stride: self.plan.base_n,
        }
    }

    /// Compute the next tile into `out` (`base_m * base_n` elements).
    ///
    /// Returns `None` once every tile of the core has been produced.
    pub fn fetch(&mut self, out: &mut [T]) -> Result<Option<TileWindow>> {
        if self.ended {
            return Err(KernelError::EngineFinished(self.name));
        }
        if self.remaining() == 0 {
            return Ok(None);
        }
        let tile_len = self.plan.tile_len();
        if out.len() != tile_len {
            return Err(KernelError::BufferMismatch {
                stage: self.name,
                expected: tile_len,
                got: out.len(),
            });
        }

        let tile = self.window(self.cursor);
        out.fill(T::default());
        if tile.rows > 0 && tile.cols > 0 {
            let start = tile.row0 * self.cols + tile.col0;
            let acc = &mut self.workspace[start..];
            for r in 0..tile.rows {
                acc[r * self.cols..r * self.cols + tile.cols].fill(0.0);
            }
            let window = TileWindow {
                stride: self.cols,
                ..tile
            };
            let k = self.plan.k;
            for step in 0..self.plan.step_ka {
                let start = step * self.plan.base_k;
                if start >= k {
                    break;
                }
                let end = (start + self.plan.base_k).min(k);
                self.engine.mma(&self.a, &self.b, &window, start..end, acc)?;
            }
            for r in 0..tile.rows {
                let src = &acc[r * self.cols..r * self.cols + tile.cols];
                let dst = &mut out[r * tile.stride..r * tile.stride + tile.cols];
                for (o, &v) in dst.iter_mut().zip(src) {
                    *o = T::from_f32(v);
                }
            }
        }

        trace!(branch = self.name, tile = tile.index, row0 = tile.row0, col0 = tile.col0, "tile computed");
        self.cursor += 1;
        Ok(Some(tile))
    }

    /// Signal that no further tiles will be requested. One-way.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// The gate and up multiplies, sharing A, driven from one control loop.
#[derive(Debug)]
pub struct MatmulStage<'a, T, E> {
    gate: TiledMatmul<'a, T, E>,
    up: TiledMatmul<'a, T, E>,
}

impl<'a, T: Element, E: MatrixMultiplyEngine<T>> MatmulStage<'a, T, E> {
    pub fn new(gate: TiledMatmul<'a, T, E>, up: TiledMatmul<'a, T, E>) -> Self {
        MatmulStage { gate, up }
    }

    pub fn remaining(&self) -> usize {
        self.gate.remaining().min(self.up.remaining())
    }

    /// Produce the next gate and up tiles into freshly allocated slots and
    /// enqueue them. Blocks while both slots of a queue are in flight.
    pub fn produce(
        &mut self,
        gate_queue: &SlotProducer<T>,
        up_queue: &SlotProducer<T>,
    ) -> Result<TileWindow> {
        let gate_tile = Self::produce_one(&mut self.gate, gate_queue)?;
        let up_tile = Self::produce_one(&mut self.up, up_queue)?;
        if gate_tile != up_tile {
            return Err(KernelError::Other(format!(
                "gate tile {} and up tile {} out of step",
                gate_tile.index, up_tile.index
            )));
        }
        Ok(gate_tile)
    }

    fn produce_one(
        branch: &mut TiledMatmul<'a, T, E>,
        queue: &SlotProducer<T>,
    ) -> Result<TileWindow> {
        let mut slot = queue.alloc()?;
        let tile = branch
            .fetch(slot.as_mut_slice())?
            .ok_or(KernelError::EngineFinished(branch.name))?;
        queue.enqueue(slot)?;
        Ok(tile)
    }

    /// Finalize both multiplies.
    pub fn finalize(&mut self) {
        self.gate.end();
        self.up.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuEngine;
    use crate::queue::slot_queue;
    use mmswiglu_tiling::{DType, TraverseOrder};

    fn plan() -> TilingPlan {
        TilingPlan {
            used_core_num: 1,
            m: 4,
            k: 3,
            n: 4,
            single_core_m: 4,
            single_core_n: 4,
            single_core_k: 3,
            base_m: 2,
            base_n: 2,
            base_k: 2,
            step_m: 1,
            step_n: 1,
            step_ka: 2,
            step_kb: 2,
            traverse: TraverseOrder::FirstM,
            trans_a: false,
            trans_b: false,
            bias: false,
            split_row_nums: 2,
            dtype: DType::F32,
            alpha: 1.0,
        }
    }

    #[test]
    fn test_tiles_follow_m_first_order() {
        let p = plan();
        let a: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let b: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let mut ws = vec![0.0f32; 16];
        let engine = CpuEngine::new();
        let mut mm = TiledMatmul::bind(
            "gate",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&b, 0, 4, false),
            &mut ws,
            &p,
            4,
            4,
        )
        .unwrap();

        let mut out = vec![0.0f32; 4];
        let mut origins = Vec::new();
        while let Some(tile) = mm.fetch(&mut out).unwrap() {
            origins.push((tile.row0, tile.col0));
            // Spot-check the tile's top-left element against a direct dot product.
            let expected: f32 = (0..3).map(|p| a[tile.row0 * 3 + p] * b[p * 4 + tile.col0]).sum();
            assert_eq!(out[0], expected);
        }
        assert_eq!(origins, vec![(0, 0), (2, 0), (0, 2), (2, 2)]);
        assert_eq!(mm.remaining(), 0);
    }

    #[test]
    fn test_padded_tile_is_zero() {
        let p = plan();
        let a = vec![1.0f32; 12];
        let b = vec![1.0f32; 12];
        let mut ws = vec![0.0f32; 16];
        let engine = CpuEngine::new();
        let mut mm = TiledMatmul::bind(
            "up",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&b, 0, 4, false),
            &mut ws,
            &p,
            3,
            4,
        )
        .unwrap();
        let mut out = vec![0.0f32; 4];
        mm.fetch(&mut out).unwrap();
        assert_eq!(out, vec![3.0; 4]);
        // Second tile covers rows 2..4 but only row 2 is valid.
        mm.fetch(&mut out).unwrap();
        assert_eq!(out, vec![3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fetch_after_end_fails() {
        let p = plan();
        let a = vec![1.0f32; 12];
        let mut ws = vec![0.0f32; 16];
        let engine = CpuEngine::new();
        let mut mm = TiledMatmul::bind(
            "gate",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&a, 0, 4, false),
            &mut ws,
            &p,
            4,
            4,
        )
        .unwrap();
        mm.end();
        assert!(mm.is_ended());
        let mut out = vec![0.0f32; 4];
        assert!(matches!(mm.fetch(&mut out), Err(KernelError::EngineFinished("gate"))));
    }

    #[test]
    fn test_bind_rejects_small_workspace() {
        let p = plan();
        let a = vec![1.0f32; 12];
        let mut ws = vec![0.0f32; 15];
        let engine = CpuEngine::new();
        let res = TiledMatmul::bind(
            "gate",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&a, 0, 4, false),
            &mut ws,
            &p,
            4,
            4,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_stage_enqueues_both_branches() {
        let p = plan();
        let a = vec![1.0f32; 12];
        let b = vec![2.0f32; 24];
        let (mut ws_gate, mut ws_up) = (vec![0.0f32; 16], vec![0.0f32; 16]);
        let engine = CpuEngine::new();
        let gate = TiledMatmul::bind(
            "gate",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&b, 0, 8, false),
            &mut ws_gate,
            &p,
            4,
            4,
        )
        .unwrap();
        let up = TiledMatmul::bind(
            "up",
            &engine,
            OperandView::new(&a, 0, 3, false),
            OperandView::new(&b, 4, 8, false),
            &mut ws_up,
            &p,
            4,
            4,
        )
        .unwrap();
        let mut stage = MatmulStage::new(gate, up);
        let (gate_tx, gate_rx) = slot_queue::<f32>("gate", 4);
        let (up_tx, up_rx) = slot_queue::<f32>("up", 4);

        let tile = stage.produce(&gate_tx, &up_tx).unwrap();
        assert_eq!(tile.index, 0);
        assert_eq!(stage.remaining(), 3);
        assert_eq!(gate_rx.dequeue().unwrap().as_slice(), &[6.0; 4]);
        assert_eq!(up_rx.dequeue().unwrap().as_slice(), &[6.0; 4]);
        stage.finalize();
    }
}
