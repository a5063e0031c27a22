use std::fmt;

/// Element types the fused kernel can be planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
        }
    }

    /// Converts a tiling-blob word to a `DType`.
    ///
    /// Word values:
    /// - 0 => F32
    /// - 1 => F16
    pub fn from_word(word: u32) -> Option<DType> {
        match word {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            _ => None,
        }
    }

    /// Returns the tiling-blob word for this `DType`.
    pub fn to_word(&self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F16.size_in_bytes(), 2);
    }

    #[test]
    fn test_word_roundtrip() {
        for dtype in &[DType::F32, DType::F16] {
            let back = DType::from_word(dtype.to_word()).unwrap();
            assert_eq!(*dtype, back);
        }
    }

    #[test]
    fn test_word_unknown() {
        assert!(DType::from_word(7).is_none());
    }
}
