use crate::dtype::DType;
use crate::error::{Result, TilingError};
use crate::plan::{TilingPlan, TraverseOrder};

/// Upper bound on the serialized size of a tiling blob.
pub const TILING_MAX_LEN: usize = 32 * 1024;

/// Number of 32-bit words in a serialized `TilingPlan`.
pub const PLAN_WORDS: usize = 21;

const WORD_BYTES: usize = 4;

fn to_word(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| TilingError::BlobField { field, value })
}

fn to_flag(field: &'static str, word: u32) -> Result<bool> {
    match word {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(TilingError::UnknownWord { field, value }),
    }
}

impl TilingPlan {
    /// Size in bytes of the serialized plan.
    pub fn encoded_len(&self) -> usize {
        PLAN_WORDS * WORD_BYTES
    }

    /// Serialize the plan into its flat little-endian word layout.
    ///
    /// Word order: m, k, n, single_core_{m,n,k}, base_{m,n,k},
    /// step_{m,n,ka,kb}, trans_a, trans_b, bias, traverse, used_core_num,
    /// split_row_nums, dtype, alpha (f32 bits).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.encoded_len();
        if size == 0 || size > TILING_MAX_LEN {
            return Err(TilingError::BlobSize {
                size,
                max: TILING_MAX_LEN,
            });
        }

        let words: [u32; PLAN_WORDS] = [
            to_word("m", self.m)?,
            to_word("k", self.k)?,
            to_word("n", self.n)?,
            to_word("single_core_m", self.single_core_m)?,
            to_word("single_core_n", self.single_core_n)?,
            to_word("single_core_k", self.single_core_k)?,
            to_word("base_m", self.base_m)?,
            to_word("base_n", self.base_n)?,
            to_word("base_k", self.base_k)?,
            to_word("step_m", self.step_m)?,
            to_word("step_n", self.step_n)?,
            to_word("step_ka", self.step_ka)?,
            to_word("step_kb", self.step_kb)?,
            self.trans_a as u32,
            self.trans_b as u32,
            self.bias as u32,
            self.traverse.to_word(),
            to_word("used_core_num", self.used_core_num)?,
            to_word("split_row_nums", self.split_row_nums)?,
            self.dtype.to_word(),
            self.alpha.to_bits(),
        ];

        let mut buf = Vec::with_capacity(size);
        for word in words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        Ok(buf)
    }

    /// Reconstruct a plan from bytes produced by [`TilingPlan::to_bytes`].
    ///
    /// Only the layout is checked here; call [`TilingPlan::validate`] before
    /// executing the plan.
    pub fn from_bytes(bytes: &[u8]) -> Result<TilingPlan> {
        if bytes.is_empty() || bytes.len() > TILING_MAX_LEN || bytes.len() != PLAN_WORDS * WORD_BYTES
        {
            return Err(TilingError::BlobSize {
                size: bytes.len(),
                max: TILING_MAX_LEN,
            });
        }

        let mut words = [0u32; PLAN_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_BYTES)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let w = |i: usize| words[i] as usize;

        let traverse = TraverseOrder::from_word(words[16]).ok_or(TilingError::UnknownWord {
            field: "traverse",
            value: words[16],
        })?;
        let dtype = DType::from_word(words[19]).ok_or(TilingError::UnknownWord {
            field: "dtype",
            value: words[19],
        })?;

        Ok(TilingPlan {
            m: w(0),
            k: w(1),
            n: w(2),
            single_core_m: w(3),
            single_core_n: w(4),
            single_core_k: w(5),
            base_m: w(6),
            base_n: w(7),
            base_k: w(8),
            step_m: w(9),
            step_n: w(10),
            step_ka: w(11),
            step_kb: w(12),
            trans_a: to_flag("trans_a", words[13])?,
            trans_b: to_flag("trans_b", words[14])?,
            bias: to_flag("bias", words[15])?,
            traverse,
            used_core_num: w(17),
            split_row_nums: w(18),
            dtype,
            alpha: f32::from_bits(words[20]),
        })
    }
}
