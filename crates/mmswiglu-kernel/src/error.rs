use mmswiglu_tiling::{DType, TilingError};
use thiserror::Error;

use crate::orchestrator::CoreState;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("tiling error: {0}")]
    Tiling(#[from] TilingError),
    #[error("operand {name} too small: need {expected} elements, got {got}")]
    OperandTooSmall {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("dtype mismatch: plan is for {expected}, kernel runs {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("buffer queue '{0}' closed")]
    QueueClosed(&'static str),
    #[error("{stage}: buffer length mismatch, expected {expected}, got {got}")]
    BufferMismatch {
        stage: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("core {core}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        core: usize,
        from: CoreState,
        to: CoreState,
    },
    #[error("{0} engine already finalized")]
    EngineFinished(&'static str),
    #[error("pipeline worker panicked on core {0}")]
    WorkerPanicked(usize),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
