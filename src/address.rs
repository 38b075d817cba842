//! Virtual address decomposition.
//!
//! A virtual address is read as `D` table indices of `b` bits each, most
//! significant first, followed by a `b`-bit in-page offset. Everything above
//! the offset is the virtual page number.

use crate::config::MemoryConfig;
use crate::error::{Result, VmError};

/// Low `count` bits of `word >> shift`.
#[inline]
pub fn grab_bits(word: u64, shift: u32, count: u32) -> u64 {
    if count == 0 || shift >= u64::BITS {
        return 0;
    }
    let mask = if count >= u64::BITS { u64::MAX } else { (1 << count) - 1 };
    (word >> shift) & mask
}

/// Number of bits needed to write `word` (0 for 0).
#[inline]
pub fn count_bits(word: u64) -> u32 {
    u64::BITS - word.leading_zeros()
}

/// Binary rendering padded to `width`; a width of 0 uses the minimal width.
pub fn display_bits(word: u64, width: u32) -> String {
    let width = if width == 0 { count_bits(word).max(1) } else { width };
    format!("{:0width$b}", word, width = width as usize)
}

/// Decomposed components of a virtual address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u64,
    /// Virtual page number (address without its offset bits)
    pub page: u64,
    pub offset: u64,
    indices: Vec<u64>,
}

impl VirtualAddress {
    /// Split `va` under `config`. Fails for addresses past the end of
    /// virtual memory.
    pub fn decompose(va: u64, config: &MemoryConfig) -> Result<Self> {
        let limit = config.virtual_memory_size();
        if va >= limit {
            return Err(VmError::OutOfRange { address: va, limit });
        }

        let width = config.offset_width;
        let depth = config.tables_depth();
        let indices = (0..depth)
            .map(|level| grab_bits(va, (depth - level) * width, width))
            .collect();

        Ok(VirtualAddress {
            va,
            page: va >> width,
            offset: grab_bits(va, 0, width),
            indices,
        })
    }

    /// Table index consumed at `level` (0 is the root).
    #[inline]
    pub fn level_index(&self, level: usize) -> u64 {
        self.indices[level]
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn depth(&self) -> usize {
        self.indices.len()
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VA({}) = (path=", self.va)?;
        for (level, index) in self.indices.iter().enumerate() {
            if level > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", index)?;
        }
        write!(f, ", offset={}, page={})", self.offset, self.page)
    }
}
