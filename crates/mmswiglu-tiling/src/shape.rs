use std::fmt;

/// Full problem shape of `C[M, N] = swiglu(A[M, K] @ B[K, 2N])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatmulShape {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

impl MatmulShape {
    pub fn new(m: usize, k: usize, n: usize) -> Self {
        MatmulShape { m, k, n }
    }

    /// Returns true if any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.m == 0 || self.k == 0 || self.n == 0
    }

    /// Number of elements in the left operand A.
    pub fn a_len(&self) -> usize {
        self.m * self.k
    }

    /// Number of elements in the combined gate/up operand B (`K x 2N`).
    pub fn b_len(&self) -> usize {
        self.k * self.n * 2
    }

    /// Number of elements in the output C.
    pub fn c_len(&self) -> usize {
        self.m * self.n
    }

    /// `(a_len, b_len, c_len)`, or `None` if any of them overflows `usize`.
    pub fn checked_lens(&self) -> Option<(usize, usize, usize)> {
        let a = self.m.checked_mul(self.k)?;
        let b = self.k.checked_mul(self.n)?.checked_mul(2)?;
        let c = self.m.checked_mul(self.n)?;
        Some((a, b, c))
    }
}

impl fmt::Display for MatmulShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}x{}] @ [{}x{}] -> [{}x{}]",
            self.m,
            self.k,
            self.k,
            self.n * 2,
            self.m,
            self.n
        )
    }
}

/// Integer division rounding up. `b` must be non-zero.
#[inline]
pub fn ceil_div(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

/// Rounds `a` up to the next multiple of `b`. `b` must be non-zero.
#[inline]
pub fn round_up(a: usize, b: usize) -> usize {
    ceil_div(a, b) * b
}
