use std::thread;

use mmswiglu_tiling::{CoreAssignment, TilingPlan};
use tracing::{debug, trace};

use crate::activation::ActivationStage;
use crate::element::Element;
use crate::engine::{ElementwiseEngine, MatrixMultiplyEngine};
use crate::error::{KernelError, Result};
use crate::matmul_stage::{MatmulStage, TiledMatmul};
use crate::matrix::{CoreOutput, CoreWorkspace, OperandView};
use crate::output::OutputStage;
use crate::queue::{slot_queue, SlotConsumer, SlotProducer};

/// How a core schedules its multiply relative to activation and copy-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Multiply runs on a scoped producer thread, one tile ahead of the
    /// activation and output stages.
    #[default]
    Pipelined,
    /// Everything runs on the calling thread, one tile at a time.
    Sequential,
}

/// Position of a core in its control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Init,
    Produce { tile: usize },
    Consume { tile: usize, band: usize },
    Finalize,
}

/// Per-core summary returned by [`KernelOrchestrator::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreReport {
    pub core_index: usize,
    pub tiles: usize,
    pub bands: usize,
    pub elements_written: usize,
}

/// Forward-only tracker of [`CoreState`].
#[derive(Debug)]
struct Progress {
    core: usize,
    state: CoreState,
    tiles: usize,
    bands: usize,
}

impl Progress {
    fn advance(&mut self, to: CoreState) -> Result<()> {
        let legal = match (self.state, to) {
            (CoreState::Init, CoreState::Produce { tile }) => tile == 0,
            (CoreState::Produce { tile: t }, CoreState::Consume { tile, band }) => {
                tile == t && band == 0
            }
            (CoreState::Consume { tile: t, band: b }, CoreState::Consume { tile, band }) => {
                tile == t && band == b + 1 && band < self.bands
            }
            (CoreState::Consume { tile: t, band: b }, CoreState::Produce { tile }) => {
                b + 1 == self.bands && tile == t + 1 && tile < self.tiles
            }
            (CoreState::Consume { tile: t, band: b }, CoreState::Finalize) => {
                b + 1 == self.bands && t + 1 == self.tiles
            }
            _ => false,
        };
        if !legal {
            return Err(KernelError::InvalidTransition {
                core: self.core,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// The three staging queues of a core, reserved at init.
#[derive(Debug)]
struct CoreQueues<T> {
    gate: (SlotProducer<T>, SlotConsumer<T>),
    up: (SlotProducer<T>, SlotConsumer<T>),
    out: (SlotProducer<T>, SlotConsumer<T>),
}

/// Consumer half of the core loop: activation and copy-out of each tile.
///
/// Owns the consumer ends of the gate and up queues, so dropping it
/// disconnects a producer that is still waiting on a slot.
struct Drain<'s, 'a, T, V> {
    progress: &'s mut Progress,
    activation: &'s mut ActivationStage<'a, V>,
    output: &'s OutputStage<'a>,
    dst: &'s mut CoreOutput<'a, T>,
    gate: SlotConsumer<T>,
    up: SlotConsumer<T>,
    out_tx: SlotProducer<T>,
    out_rx: SlotConsumer<T>,
}

impl<T: Element, V: ElementwiseEngine<T>> Drain<'_, '_, T, V> {
    fn tile(&mut self, tile: usize) -> Result<usize> {
        self.progress.advance(CoreState::Produce { tile })?;
        let gate = self.gate.dequeue()?;
        let up = self.up.dequeue()?;

        let bands = self.progress.bands;
        let mut written = 0;
        for band in 0..bands {
            self.progress.advance(CoreState::Consume { tile, band })?;
            self.activation.compute(&gate, &up, band, &self.out_tx)?;
            written += self
                .output
                .copy_out(tile * bands + band, &self.out_rx, &mut *self.dst)?;
        }
        self.gate.release(gate);
        self.up.release(up);
        trace!(core = self.progress.core, tile, written, "tile drained");
        Ok(written)
    }

    fn tiles(&mut self, tiles: usize) -> Result<usize> {
        let mut written = 0;
        for tile in 0..tiles {
            written += self.tile(tile)?;
        }
        Ok(written)
    }
}

fn run_sequential<T, M, V>(
    matmul: &mut MatmulStage<'_, T, M>,
    mut drain: Drain<'_, '_, T, V>,
    gate_tx: SlotProducer<T>,
    up_tx: SlotProducer<T>,
    tiles: usize,
) -> Result<usize>
where
    T: Element,
    M: MatrixMultiplyEngine<T>,
    V: ElementwiseEngine<T>,
{
    let mut written = 0;
    for tile in 0..tiles {
        matmul.produce(&gate_tx, &up_tx)?;
        written += drain.tile(tile)?;
    }
    Ok(written)
}

fn run_pipelined<T, M, V>(
    core: usize,
    matmul: &mut MatmulStage<'_, T, M>,
    mut drain: Drain<'_, '_, T, V>,
    gate_tx: SlotProducer<T>,
    up_tx: SlotProducer<T>,
    tiles: usize,
) -> Result<usize>
where
    T: Element,
    M: MatrixMultiplyEngine<T>,
    V: ElementwiseEngine<T>,
{
    thread::scope(|s| {
        let producer = s.spawn(move || -> Result<()> {
            for _ in 0..tiles {
                matmul.produce(&gate_tx, &up_tx)?;
            }
            Ok(())
        });

        let consumed = drain.tiles(tiles);
        drop(drain);
        let produced = producer
            .join()
            .unwrap_or(Err(KernelError::WorkerPanicked(core)));

        // A failed consumer closes the queues under the producer; report the
        // consumer's error rather than the resulting disconnect.
        match (produced, consumed) {
            (Err(KernelError::QueueClosed(_)), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
            (Ok(()), consumed) => consumed,
        }
    })
}

/// Drives one core through the fused matmul + SwiGLU loop.
///
/// `init` derives the core's offsets from the plan, binds the multiply
/// engines and reserves every buffer; `process` then runs the loop to
/// completion.
#[derive(Debug)]
pub struct KernelOrchestrator<'a, T, M, V> {
    plan: &'a TilingPlan,
    assignment: CoreAssignment,
    mode: ExecutionMode,
    matmul: MatmulStage<'a, T, M>,
    activation: ActivationStage<'a, V>,
    output: OutputStage<'a>,
    dst: CoreOutput<'a, T>,
    queues: Option<CoreQueues<T>>,
    progress: Progress,
}

impl<'a, T, M, V> KernelOrchestrator<'a, T, M, V>
where
    T: Element,
    M: MatrixMultiplyEngine<T>,
    V: ElementwiseEngine<T>,
{
    /// Prepare core `core_index` of a validated plan.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        plan: &'a TilingPlan,
        core_index: usize,
        a: &'a [T],
        b: &'a [T],
        dst: CoreOutput<'a, T>,
        workspace: CoreWorkspace<'a>,
        matmul_engine: &'a M,
        elementwise_engine: &'a V,
        mode: ExecutionMode,
    ) -> Result<Self> {
        let assignment = plan.assignment(core_index).ok_or_else(|| {
            KernelError::Other(format!(
                "core {} is outside the {}-core grid",
                core_index,
                plan.grid_cores()
            ))
        })?;
        if dst.rows() != assignment.rows || dst.cols() != assignment.cols {
            return Err(KernelError::BufferMismatch {
                stage: "core output",
                expected: assignment.rows * assignment.cols,
                got: dst.rows() * dst.cols(),
            });
        }
        debug!(
            core = core_index,
            row_core = assignment.row_core,
            col_core = assignment.col_core,
            a_offset = assignment.a_offset,
            gate_b_offset = assignment.gate_b_offset,
            up_b_offset = assignment.up_b_offset,
            c_offset = assignment.c_offset,
            rows = assignment.rows,
            cols = assignment.cols,
            "core assigned"
        );

        let left = OperandView::left(a, plan, &assignment);
        let gate = TiledMatmul::bind(
            "gate",
            matmul_engine,
            left,
            OperandView::gate(b, plan, &assignment),
            workspace.gate,
            plan,
            assignment.rows,
            assignment.cols,
        )?;
        let up = TiledMatmul::bind(
            "up",
            matmul_engine,
            left,
            OperandView::up(b, plan, &assignment),
            workspace.up,
            plan,
            assignment.rows,
            assignment.cols,
        )?;

        let queues = CoreQueues {
            gate: slot_queue("gate", plan.tile_len()),
            up: slot_queue("up", plan.tile_len()),
            out: slot_queue("activation", plan.band_len()),
        };

        Ok(KernelOrchestrator {
            plan,
            assignment,
            mode,
            matmul: MatmulStage::new(gate, up),
            activation: ActivationStage::new(elementwise_engine, plan),
            output: OutputStage::new(plan),
            dst,
            queues: Some(queues),
            progress: Progress {
                core: core_index,
                state: CoreState::Init,
                tiles: plan.tile_count(),
                bands: plan.split_row_nums,
            },
        })
    }

    pub fn state(&self) -> CoreState {
        self.progress.state
    }

    /// Run every tile of the core and finalize the multiply engines.
    pub fn process(&mut self) -> Result<CoreReport> {
        let core = self.assignment.core_index;
        let queues = self.queues.take().ok_or(KernelError::InvalidTransition {
            core,
            from: self.progress.state,
            to: CoreState::Init,
        })?;
        let tiles = self.plan.tile_count();

        let KernelOrchestrator {
            mode,
            matmul,
            activation,
            output,
            dst,
            progress,
            ..
        } = &mut *self;
        let CoreQueues {
            gate: (gate_tx, gate_rx),
            up: (up_tx, up_rx),
            out: (out_tx, out_rx),
        } = queues;
        let drain = Drain {
            progress,
            activation,
            output,
            dst,
            gate: gate_rx,
            up: up_rx,
            out_tx,
            out_rx,
        };

        let written = match *mode {
            ExecutionMode::Sequential => run_sequential(matmul, drain, gate_tx, up_tx, tiles)?,
            ExecutionMode::Pipelined => run_pipelined(core, matmul, drain, gate_tx, up_tx, tiles)?,
        };

        self.progress.advance(CoreState::Finalize)?;
        self.matmul.finalize();
        debug!(core, tiles, written, "core finished");
        Ok(CoreReport {
            core_index: core,
            tiles,
            bands: tiles * self.plan.split_row_nums,
            elements_written: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuEngine;
    use crate::matrix::{split_output, split_workspace};
    use mmswiglu_tiling::{DType, TraverseOrder};

    fn plan(m: usize, k: usize, n: usize, scm: usize, scn: usize, base: usize) -> TilingPlan {
        let mut p = TilingPlan {
            used_core_num: 0,
            m,
            k,
            n,
            single_core_m: scm,
            single_core_n: scn,
            single_core_k: k,
            base_m: base,
            base_n: base,
            base_k: 2,
            step_m: 1,
            step_n: 1,
            step_ka: k.div_ceil(2),
            step_kb: k.div_ceil(2),
            traverse: TraverseOrder::FirstM,
            trans_a: false,
            trans_b: false,
            bias: false,
            split_row_nums: 2,
            dtype: DType::F32,
            alpha: 1.0,
        };
        p.used_core_num = p.grid_cores();
        p
    }

    fn run_core0(p: &TilingPlan, a: &[f32], b: &[f32], mode: ExecutionMode) -> (Vec<f32>, CoreReport) {
        let mut c = vec![f32::NAN; p.m * p.n];
        let mut ws = vec![0.0f32; p.workspace_len()];
        let engine = CpuEngine::new();
        let report = {
            let dst = split_output(&mut c, p).into_iter().next().unwrap();
            let work = split_workspace(&mut ws, p).unwrap().into_iter().next().unwrap();
            let mut core =
                KernelOrchestrator::init(p, 0, a, b, dst, work, &engine, &engine, mode).unwrap();
            assert_eq!(core.state(), CoreState::Init);
            let report = core.process().unwrap();
            assert_eq!(core.state(), CoreState::Finalize);
            report
        };
        (c, report)
    }

    #[test]
    fn test_modes_agree() {
        let p = plan(4, 3, 4, 4, 4, 2);
        let a: Vec<f32> = (0..12).map(|v| v as f32 * 0.1 - 0.5).collect();
        let b: Vec<f32> = (0..24).map(|v| (v % 7) as f32 * 0.2 - 0.6).collect();
        let (seq, seq_report) = run_core0(&p, &a, &b, ExecutionMode::Sequential);
        let (pipe, pipe_report) = run_core0(&p, &a, &b, ExecutionMode::Pipelined);
        assert_eq!(seq, pipe);
        assert_eq!(seq_report, pipe_report);
        assert_eq!(
            seq_report,
            CoreReport { core_index: 0, tiles: 4, bands: 8, elements_written: 16 }
        );
        assert!(seq.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_single_tile_core() {
        let p = plan(2, 2, 2, 2, 2, 2);
        let a = vec![1.0f32; 4];
        let b = vec![0.0f32, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        let (c, report) = run_core0(&p, &a, &b, ExecutionMode::Pipelined);
        assert_eq!(report.tiles, 1);
        // gate = 0 everywhere, so SwiGLU is 0.
        assert_eq!(c, vec![0.0; 4]);
    }

    #[test]
    fn test_process_twice_fails() {
        let p = plan(2, 2, 2, 2, 2, 2);
        let a = vec![1.0f32; 4];
        let b = vec![1.0f32; 8];
        let mut c = vec![0.0f32; 4];
        let mut ws = vec![0.0f32; p.workspace_len()];
        let engine = CpuEngine::new();
        let dst = split_output(&mut c, &p).into_iter().next().unwrap();
        let work = split_workspace(&mut ws, &p).unwrap().into_iter().next().unwrap();
        let mut core = KernelOrchestrator::init(
            &p,
            0,
            &a,
            &b,
            dst,
            work,
            &engine,
            &engine,
            ExecutionMode::Sequential,
        )
        .unwrap();
        core.process().unwrap();
        assert!(matches!(
            core.process(),
            Err(KernelError::InvalidTransition { core: 0, from: CoreState::Finalize, .. })
        ));
    }

    #[test]
    fn test_init_rejects_core_outside_grid() {
        let p = plan(2, 2, 2, 2, 2, 2);
        let a = vec![1.0f32; 4];
        let mut c = vec![0.0f32; 4];
        let mut ws = vec![0.0f32; p.workspace_len()];
        let engine = CpuEngine::new();
        let dst = split_output(&mut c, &p).into_iter().next().unwrap();
        let work = split_workspace(&mut ws, &p).unwrap().into_iter().next().unwrap();
        let res = KernelOrchestrator::init(
            &p,
            1,
            &a,
            &a,
            dst,
            work,
            &engine,
            &engine,
            ExecutionMode::Pipelined,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut progress = Progress { core: 3, state: CoreState::Init, tiles: 2, bands: 2 };
        assert!(progress.advance(CoreState::Consume { tile: 0, band: 0 }).is_err());
        progress.advance(CoreState::Produce { tile: 0 }).unwrap();
        progress.advance(CoreState::Consume { tile: 0, band: 0 }).unwrap();
        // Cannot leave a tile before its last band.
        assert!(progress.advance(CoreState::Produce { tile: 1 }).is_err());
        progress.advance(CoreState::Consume { tile: 0, band: 1 }).unwrap();
        assert!(progress.advance(CoreState::Finalize).is_err());
        progress.advance(CoreState::Produce { tile: 1 }).unwrap();
        progress.advance(CoreState::Consume { tile: 1, band: 0 }).unwrap();
        progress.advance(CoreState::Consume { tile: 1, band: 1 }).unwrap();
        assert!(progress.advance(CoreState::Produce { tile: 2 }).is_err());
        let err = progress.advance(CoreState::Init).unwrap_err();
        assert!(matches!(err, KernelError::InvalidTransition { core: 3, .. }));
        progress.advance(CoreState::Finalize).unwrap();
    }
}
