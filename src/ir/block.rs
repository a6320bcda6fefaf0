//! Code and data blocks.

use super::IntervalId;

/// Whether a block holds instructions or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Code,
    Data,
}

/// An `offset + size` region inside exactly one byte interval.
///
/// Blocks may be zero-length; those act as address markers for symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// The owning byte interval.
    pub interval: IntervalId,
    /// Offset of the first byte within the interval.
    pub offset: u64,
    pub size: u64,
}

impl Block {
    /// Offset one past the last byte, relative to the interval.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_code(&self) -> bool {
        self.kind == BlockKind::Code
    }
}
