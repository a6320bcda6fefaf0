//! Typed auxiliary side tables.
//!
//! Each table has a fixed schema and is keyed by stable ids, never by addresses,
//! so layout can move blocks without rewriting the tables.

use std::collections::{BTreeMap, BTreeSet};

use super::{BlockId, SectionId, SymbolId};

/// A position inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    pub block: BlockId,
    pub displacement: u64,
}

impl Offset {
    pub fn new(block: BlockId, displacement: u64) -> Self {
        Self { block, displacement }
    }
}

/// ELF section header type and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionProperties {
    pub section_type: u32,
    pub flags: u64,
}

/// A call frame information directive, e.g. `.cfi_def_cfa_offset 16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiDirective {
    pub directive: String,
    pub operands: Vec<i64>,
    pub symbol: Option<SymbolId>,
}

/// Declared interpretation of a data block's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Character data, normally NUL-terminated.
    String,
    /// Character data without an implied terminator.
    Ascii,
    /// Little-endian integers of `width` bytes.
    Integer { width: u8 },
}

/// The side tables a module may carry.
#[derive(Debug, Clone, Default)]
pub struct AuxTables {
    /// Entry blocks of functions.
    pub function_entries: BTreeSet<BlockId>,
    /// References to the key symbol are printed using the value symbol's name.
    pub symbol_forwarding: BTreeMap<SymbolId, SymbolId>,
    pub section_properties: BTreeMap<SectionId, SectionProperties>,
    pub cfi_directives: BTreeMap<Offset, Vec<CfiDirective>>,
    /// Free-form annotations.
    pub comments: BTreeMap<Offset, String>,
    pub encodings: BTreeMap<BlockId, DataType>,
    /// Required alignment of a block's start, in bytes.
    pub alignment: BTreeMap<BlockId, u64>,
}
