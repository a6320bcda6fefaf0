//! Byte intervals.

use std::collections::BTreeMap;

use super::{BlockId, SectionId, SymbolicExpression};

/// A contiguous run of bytes within a section, optionally placed at an address.
///
/// Only the first `bytes.len()` bytes are initialized; the rest of `size` reads as
/// zero, which is how uninitialized storage such as `.bss` is represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteInterval {
    /// Owning section, set when the interval is added to a module.
    pub section: SectionId,
    pub address: Option<u64>,
    pub size: u64,
    pub bytes: Vec<u8>,
    /// Blocks sorted by offset.
    pub blocks: Vec<BlockId>,
    /// Symbolic expressions keyed by offset.
    pub symbolic_expressions: BTreeMap<u64, SymbolicExpression>,
    /// Width in bytes of the field each symbolic expression replaces, when known.
    pub symbolic_expression_sizes: BTreeMap<u64, u64>,
}

impl ByteInterval {
    /// Creates a fully initialized interval.
    pub fn new(address: Option<u64>, bytes: Vec<u8>) -> Self {
        Self {
            section: SectionId(0),
            address,
            size: bytes.len() as u64,
            bytes,
            blocks: Vec::new(),
            symbolic_expressions: BTreeMap::new(),
            symbolic_expression_sizes: BTreeMap::new(),
        }
    }

    /// Creates an interval of `size` bytes with no initialized contents.
    pub fn uninitialized(address: Option<u64>, size: u64) -> Self {
        Self {
            size,
            ..Self::new(address, Vec::new())
        }
    }

    /// Address one past the last byte, when laid out.
    pub fn end(&self) -> Option<u64> {
        self.address.map(|a| a + self.size)
    }

    /// Whether the laid-out range `[address, address + size)` contains `addr`.
    pub fn contains(&self, addr: u64) -> bool {
        match self.address {
            Some(start) => addr >= start && addr < start + self.size,
            None => false,
        }
    }

    /// Reads `len` bytes at `offset`, zero-filling past the initialized prefix.
    pub fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        (offset..offset + len)
            .map(|i| self.bytes.get(i as usize).copied().unwrap_or(0))
            .collect()
    }

    /// Symbolic expressions attached within `[offset, offset + len)`.
    pub fn symbolic_expressions_in(
        &self,
        offset: u64,
        len: u64,
    ) -> impl Iterator<Item = (u64, &SymbolicExpression)> {
        self.symbolic_expressions
            .range(offset..offset + len)
            .map(|(off, expr)| (*off, expr))
    }

    /// Recorded field width of the symbolic expression at `offset`.
    pub fn symbolic_expression_size(&self, offset: u64) -> Option<u64> {
        self.symbolic_expression_sizes.get(&offset).copied()
    }
}
