//! `mmswiglu-tiling` - Host-side planning for the fused matmul + SwiGLU kernel.
//!
//! This crate provides:
//! - A `TilePlanner` that decomposes a problem shape over a grid of cores
//! - The immutable `TilingPlan` shared by every core, and its fixed-width blob
//! - `CoreAssignment`, the per-core offsets derived from a plan
//! - Data type and shape definitions shared with the kernel

pub mod assignment;
pub mod blob;
pub mod config;
pub mod dtype;
pub mod error;
pub mod plan;
pub mod planner;
pub mod shape;

// Re-export primary types at the crate root for convenience.
pub use assignment::CoreAssignment;
pub use blob::{PLAN_WORDS, TILING_MAX_LEN};
pub use config::{PlatformConfig, TilingRequest, DEFAULT_ALPHA, DEFAULT_SPLIT_ROW_NUMS};
pub use dtype::DType;
pub use error::{Result, TilingError};
pub use plan::{TilingPlan, TraverseOrder};
pub use planner::TilePlanner;
pub use shape::MatmulShape;
