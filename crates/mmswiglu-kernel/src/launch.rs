use mmswiglu_tiling::TilingPlan;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cpu::CpuEngine;
use crate::element::Element;
use crate::engine::{ElementwiseEngine, MatrixMultiplyEngine};
use crate::error::{KernelError, Result};
use crate::matrix::{split_output, split_workspace};
use crate::orchestrator::{CoreReport, ExecutionMode, KernelOrchestrator};

/// Global-memory arguments of one launch.
///
/// - `a`: left operand, `M x K` (or `K x M` when transposed)
/// - `b`: combined gate/up operand, `K x 2N` (or `2N x K` when transposed)
/// - `c`: output, `M x N` row-major
/// - `workspace`: f32 accumulators, at least `TilingPlan::workspace_len()`
/// - `tiling`: encoded [`TilingPlan`] blob
#[derive(Debug)]
pub struct KernelArgs<'a, T> {
    pub a: &'a [T],
    pub b: &'a [T],
    pub c: &'a mut [T],
    pub workspace: &'a mut [f32],
    pub tiling: &'a [u8],
}

/// Outcome of a launch: the decoded plan and one report per active core.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReport {
    pub plan: TilingPlan,
    pub cores: Vec<CoreReport>,
}

impl LaunchReport {
    /// Returns the total number of C elements written across all cores.
    pub fn elements_written(&self) -> usize {
        self.cores.iter().map(|c| c.elements_written).sum()
    }

    pub fn tiles(&self) -> usize {
        self.cores.iter().map(|c| c.tiles).sum()
    }
}

/// The fused matmul + SwiGLU kernel over a pair of compute engines.
#[derive(Debug, Clone)]
pub struct Kernel<M, V> {
    matmul: M,
    elementwise: V,
    mode: ExecutionMode,
}

impl Kernel<CpuEngine, CpuEngine> {
    /// Kernel backed by the reference CPU engines.
    pub fn cpu() -> Self {
        Kernel::new(CpuEngine::new(), CpuEngine::new())
    }
}

impl Default for Kernel<CpuEngine, CpuEngine> {
    fn default() -> Self {
        Self::cpu()
    }
}

impl<M, V> Kernel<M, V> {
    pub fn new(matmul: M, elementwise: V) -> Self {
        Kernel {
            matmul,
            elementwise,
            mode: ExecutionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every core of the plan encoded in `args.tiling`.
    ///
    /// The plan, the element type and all operand sizes are checked before
    /// any core starts. Cores run in parallel, each over its own share of C
    /// and of the workspace. If any core fails the launch fails and the
    /// contents of C are unspecified.
    pub fn launch<T>(&self, args: KernelArgs<'_, T>) -> Result<LaunchReport>
    where
        T: Element,
        M: MatrixMultiplyEngine<T>,
        V: ElementwiseEngine<T>,
    {
        let plan = TilingPlan::from_bytes(args.tiling)?;
        plan.validate()?;
        if plan.dtype != T::DTYPE {
            return Err(KernelError::DTypeMismatch {
                expected: plan.dtype,
                got: T::DTYPE,
            });
        }
        let shape = plan.shape();
        for (name, expected, got) in [
            ("a", shape.a_len(), args.a.len()),
            ("b", shape.b_len(), args.b.len()),
            ("c", shape.c_len(), args.c.len()),
        ] {
            if got < expected {
                return Err(KernelError::OperandTooSmall { name, expected, got });
            }
        }

        let outputs = split_output(args.c, &plan);
        let workspaces = split_workspace(args.workspace, &plan)?;
        debug!(
            shape = %shape,
            grid_cores = plan.grid_cores(),
            used_core_num = plan.used_core_num,
            mode = ?self.mode,
            matmul_engine = MatrixMultiplyEngine::<T>::name(&self.matmul),
            elementwise_engine = ElementwiseEngine::<T>::name(&self.elementwise),
            "launching"
        );

        let (a, b) = (args.a, args.b);
        let cores = outputs
            .into_iter()
            .zip(workspaces)
            .enumerate()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(core_index, (dst, workspace))| {
                KernelOrchestrator::init(
                    &plan,
                    core_index,
                    a,
                    b,
                    dst,
                    workspace,
                    &self.matmul,
                    &self.elementwise,
                    self.mode,
                )?
                .process()
            })
            .collect::<Result<Vec<_>>>()?;

        let report = LaunchReport { plan, cores };
        info!(
            shape = %shape,
            cores = report.cores.len(),
            tiles = report.tiles(),
            elements = report.elements_written(),
            "launch complete"
        );
        Ok(report)
    }
}
