//! `mmswiglu-kernel` - Per-core fused matmul + SwiGLU pipeline.
//!
//! This crate provides:
//! - `MatrixMultiplyEngine` / `ElementwiseEngine` traits for pluggable compute
//! - A reference `CpuEngine` implementing both
//! - The double-buffered stages (`MatmulStage`, `ActivationStage`, `OutputStage`)
//! - `KernelOrchestrator`, the per-core driver, and `Kernel::launch`
//! - A golden `reference` computation for validation

pub mod activation;
pub mod cpu;
pub mod element;
pub mod engine;
pub mod error;
pub mod launch;
pub mod matmul_stage;
pub mod matrix;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod reference;

// Re-export primary types at the crate root for convenience.
pub use activation::ActivationStage;
pub use cpu::CpuEngine;
pub use element::Element;
pub use engine::{ElementwiseEngine, MatrixMultiplyEngine, TileWindow};
pub use error::{KernelError, Result};
pub use launch::{Kernel, KernelArgs, LaunchReport};
pub use matmul_stage::{MatmulStage, TiledMatmul};
pub use matrix::{split_output, split_workspace, CoreOutput, CoreWorkspace, OperandView};
pub use orchestrator::{CoreReport, CoreState, ExecutionMode, KernelOrchestrator};
pub use output::{BandPlacement, OutputStage};
pub use queue::{slot_queue, Slot, SlotConsumer, SlotProducer, BUFFER_NUM};
