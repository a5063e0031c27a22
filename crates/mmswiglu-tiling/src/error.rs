use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TilingError {
    #[error("invalid shape: m={m}, k={k}, n={n} (all dimensions must be non-zero)")]
    InvalidShape { m: usize, k: usize, n: usize },
    #[error("invalid core count: {0}")]
    InvalidCoreNum(usize),
    #[error("base_m={base_m} cannot be split into {split_row_nums} row bands")]
    InvalidSplit { base_m: usize, split_row_nums: usize },
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
    #[error("no tiling satisfies {shape} on {core_num} cores: {reason}")]
    Unsatisfiable {
        shape: String,
        core_num: usize,
        reason: String,
    },
    #[error("invalid tiling blob size {size} (expected 1..={max} bytes)")]
    BlobSize { size: usize, max: usize },
    #[error("tiling field {field}={value} does not fit in a 32-bit word")]
    BlobField { field: &'static str, value: usize },
    #[error("unknown value {value} for tiling field {field}")]
    UnknownWord { field: &'static str, value: u32 },
    #[error("tiling invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TilingError>;
