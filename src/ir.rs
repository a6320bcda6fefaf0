//! Symbolic table model.
//!
//! This module defines the in-memory representation of a disassembled binary that
//! the layout and printing engines operate on. A `Module` owns arenas of sections,
//! byte intervals, blocks and symbols; everything else refers to them through the
//! small copyable ids defined here, so blocks can be re-parented during layout
//! without invalidating control-flow edges or side tables.

use object::SectionKind;

pub mod block;
pub mod cfg;
pub mod interval;
pub mod symbol;
pub mod tables;

pub use block::{Block, BlockKind};
pub use cfg::{Cfg, CfgNode, Edge, EdgeKind};
pub use interval::ByteInterval;
pub use symbol::{Payload, Symbol, SymbolicExpression};
pub use tables::{AuxTables, CfiDirective, DataType, Offset, SectionProperties};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);
    };
}

arena_id!(
    /// Index of a section in its module.
    SectionId
);
arena_id!(
    /// Index of a byte interval in its module.
    IntervalId
);
arena_id!(
    /// Index of a code or data block in its module.
    BlockId
);
arena_id!(
    /// Index of a symbol in its module.
    SymbolId
);
arena_id!(
    /// Index of a proxy block (an external call target stand-in).
    ProxyId
);

/// A named, ordered collection of byte intervals.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    /// Semantic kind (code, data, bss...), reusing the object crate's classification.
    pub kind: SectionKind,
    /// Intervals in section order. Absorbed intervals are removed from this list.
    pub intervals: Vec<IntervalId>,
}

/// A disassembled module: sections, symbols, control flow and side tables.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// Binary file format of the module, e.g. "elf".
    pub file_format: String,
    sections: Vec<Section>,
    intervals: Vec<Option<ByteInterval>>,
    blocks: Vec<Block>,
    symbols: Vec<Symbol>,
    proxies: usize,
    pub cfg: Cfg,
    pub tables: AuxTables,
}

impl Module {
    /// Creates an empty ELF module.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            file_format: "elf".to_string(),
            sections: Vec::new(),
            intervals: Vec::new(),
            blocks: Vec::new(),
            symbols: Vec::new(),
            proxies: 0,
            cfg: Cfg::default(),
            tables: AuxTables::default(),
        }
    }

    pub fn add_section(&mut self, name: &str, kind: SectionKind) -> SectionId {
        self.sections.push(Section {
            name: name.to_string(),
            kind,
            intervals: Vec::new(),
        });
        SectionId(self.sections.len() - 1)
    }

    /// Appends a byte interval to the end of `section`.
    pub fn add_byte_interval(&mut self, section: SectionId, mut interval: ByteInterval) -> IntervalId {
        let id = IntervalId(self.intervals.len());
        interval.section = section;
        interval.blocks.clear();
        self.intervals.push(Some(interval));
        self.sections[section.0].intervals.push(id);
        id
    }

    /// Adds a block at `offset` of `interval`, keeping the interval's blocks sorted.
    pub fn add_block(&mut self, interval: IntervalId, kind: BlockKind, offset: u64, size: u64) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block { kind, interval, offset, size });
        self.attach_block(interval, id);
        id
    }

    pub fn add_code_block(&mut self, interval: IntervalId, offset: u64, size: u64) -> BlockId {
        self.add_block(interval, BlockKind::Code, offset, size)
    }

    pub fn add_data_block(&mut self, interval: IntervalId, offset: u64, size: u64) -> BlockId {
        self.add_block(interval, BlockKind::Data, offset, size)
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol);
        SymbolId(self.symbols.len() - 1)
    }

    pub fn add_proxy_block(&mut self) -> ProxyId {
        self.proxies += 1;
        ProxyId(self.proxies - 1)
    }

    /// Attaches a symbolic expression at `offset` of `interval`, replacing any previous one.
    pub fn add_symbolic_expression(&mut self, interval: IntervalId, offset: u64, expr: SymbolicExpression) {
        self.interval_mut(interval).symbolic_expressions.insert(offset, expr);
    }

    /// Records that the symbolic expression at `offset` of `interval` fills `size` bytes.
    pub fn set_symbolic_expression_size(&mut self, interval: IntervalId, offset: u64, size: u64) {
        self.interval_mut(interval).symbolic_expression_sizes.insert(offset, size);
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.0]
    }

    /// Sections in their original order.
    pub fn sections(&self) -> impl Iterator<Item = (SectionId, &Section)> {
        self.sections.iter().enumerate().map(|(i, s)| (SectionId(i), s))
    }

    /// Returns a live interval. Panics if the interval was absorbed by a merge.
    pub fn interval(&self, id: IntervalId) -> &ByteInterval {
        self.intervals[id.0].as_ref().expect("byte interval was merged away")
    }

    pub fn interval_mut(&mut self, id: IntervalId) -> &mut ByteInterval {
        self.intervals[id.0].as_mut().expect("byte interval was merged away")
    }

    /// Whether `id` still names an interval (it has not been absorbed by a merge).
    pub fn is_live(&self, id: IntervalId) -> bool {
        self.intervals.get(id.0).map_or(false, Option::is_some)
    }

    /// Live intervals in section order.
    pub fn intervals(&self) -> impl Iterator<Item = (IntervalId, &ByteInterval)> {
        self.sections
            .iter()
            .flat_map(|s| s.intervals.iter())
            .map(move |id| (*id, self.interval(*id)))
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().enumerate().map(|(i, s)| (SymbolId(i), s))
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Symbols whose referent is `block`.
    pub fn symbols_referring_to(&self, block: BlockId) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols()
            .filter(move |(_, s)| s.payload == Payload::Referent(block))
            .map(|(id, _)| id)
    }

    /// The section owning `interval`.
    pub fn section_of(&self, interval: IntervalId) -> SectionId {
        self.interval(interval).section
    }

    /// Address of a block: interval address plus offset.
    pub fn block_address(&self, id: BlockId) -> Option<u64> {
        let block = self.block(id);
        self.interval(block.interval).address.map(|a| a + block.offset)
    }

    /// Address of a symbol, through its referent when it has one.
    pub fn symbol_address(&self, id: SymbolId) -> Option<u64> {
        match self.symbol(id).payload {
            Payload::None => None,
            Payload::Address(addr) => Some(addr),
            Payload::Referent(block) => self.block_address(block),
        }
    }

    /// Section a symbol belongs to, if its referent or address places it in one.
    pub fn symbol_section(&self, id: SymbolId) -> Option<SectionId> {
        match self.symbol(id).payload {
            Payload::None => None,
            Payload::Referent(block) => Some(self.section_of(self.block(block).interval)),
            Payload::Address(addr) => self.section_containing(addr),
        }
    }

    /// Derived section address: the lowest interval address when every interval has one.
    pub fn section_address(&self, id: SectionId) -> Option<u64> {
        let section = self.section(id);
        if section.intervals.is_empty() {
            return None;
        }
        section
            .intervals
            .iter()
            .map(|i| self.interval(*i).address)
            .collect::<Option<Vec<_>>>()
            .and_then(|addrs| addrs.into_iter().min())
    }

    /// Derived module address: the lowest section address.
    pub fn address(&self) -> Option<u64> {
        self.sections().filter_map(|(id, _)| self.section_address(id)).min()
    }

    /// Section whose laid-out range contains `addr`. Sections are assumed not to overlap.
    pub fn section_containing(&self, addr: u64) -> Option<SectionId> {
        self.intervals()
            .find(|(_, bi)| bi.contains(addr))
            .map(|(_, bi)| bi.section)
    }

    /// Intervals whose laid-out range contains `addr`, in address order.
    pub fn intervals_on(&self, addr: u64) -> Vec<IntervalId> {
        let mut found: Vec<(u64, IntervalId)> = self
            .intervals()
            .filter(|(_, bi)| bi.contains(addr))
            .filter_map(|(id, bi)| bi.address.map(|a| (a, id)))
            .collect();
        found.sort_by_key(|(a, _)| *a);
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Blocks of `interval` starting exactly at `addr`.
    pub fn blocks_at(&self, interval: IntervalId, addr: u64) -> Vec<BlockId> {
        self.blocks_starting_in(interval, addr, addr + 1)
    }

    /// Blocks of `interval` whose start address lies in `[lo, hi)`.
    pub fn blocks_starting_in(&self, interval: IntervalId, lo: u64, hi: u64) -> Vec<BlockId> {
        let bi = self.interval(interval);
        let Some(base) = bi.address else {
            return Vec::new();
        };
        bi.blocks
            .iter()
            .copied()
            .filter(|b| {
                let addr = base + self.block(*b).offset;
                addr >= lo && addr < hi
            })
            .collect()
    }

    /// Blocks of `interval` whose range contains `addr` (zero-length blocks never do).
    pub fn blocks_on(&self, interval: IntervalId, addr: u64) -> Vec<BlockId> {
        let bi = self.interval(interval);
        let Some(base) = bi.address else {
            return Vec::new();
        };
        bi.blocks
            .iter()
            .copied()
            .filter(|b| {
                let block = self.block(*b);
                let start = base + block.offset;
                addr >= start && addr < start + block.size
            })
            .collect()
    }

    /// All blocks in address order: by interval address, then section order, then offset.
    /// Unaddressed intervals follow the addressed ones in section order.
    pub fn blocks_in_address_order(&self) -> Vec<BlockId> {
        let mut intervals: Vec<(Option<u64>, usize, IntervalId)> = self
            .intervals()
            .enumerate()
            .map(|(order, (id, bi))| (bi.address, order, id))
            .collect();
        intervals.sort_by_key(|(addr, order, _)| (addr.is_none(), *addr, *order));
        intervals
            .into_iter()
            .flat_map(|(_, _, id)| self.interval(id).blocks.iter().copied())
            .collect()
    }

    /// Blocks of one section sorted by address, ties kept in interval and block order.
    pub fn section_blocks_in_address_order(&self, section: SectionId) -> Vec<BlockId> {
        let mut blocks: Vec<(u64, usize, BlockId)> = self
            .section(section)
            .intervals
            .iter()
            .flat_map(|i| self.interval(*i).blocks.iter().copied())
            .enumerate()
            .map(|(order, b)| (self.block_address(b).unwrap_or(u64::MAX), order, b))
            .collect();
        blocks.sort_by_key(|(addr, order, _)| (*addr, *order));
        blocks.into_iter().map(|(_, _, b)| b).collect()
    }

    /// The code block of `interval` with the greatest end offset, preferring non-empty
    /// blocks and later blocks on ties.
    pub fn last_code_block(&self, interval: IntervalId) -> Option<BlockId> {
        self.interval(interval)
            .blocks
            .iter()
            .copied()
            .filter(|b| self.block(*b).kind == BlockKind::Code)
            .max_by_key(|b| {
                let block = self.block(*b);
                (block.end(), block.size > 0)
            })
    }

    /// Moves `block` into `interval` at `offset`, keeping block order sorted.
    pub(crate) fn reparent_block(&mut self, block: BlockId, interval: IntervalId, offset: u64) {
        let old = self.blocks[block.0].interval;
        if self.is_live(old) {
            self.interval_mut(old).blocks.retain(|b| *b != block);
        }
        let b = &mut self.blocks[block.0];
        b.interval = interval;
        b.offset = offset;
        self.attach_block(interval, block);
    }

    /// Detaches an absorbed interval from its section and frees its arena slot.
    pub(crate) fn remove_interval(&mut self, id: IntervalId) -> Option<ByteInterval> {
        let removed = self.intervals.get_mut(id.0)?.take()?;
        self.sections[removed.section.0].intervals.retain(|i| *i != id);
        Some(removed)
    }

    fn attach_block(&mut self, interval: IntervalId, id: BlockId) {
        let offset = self.blocks[id.0].offset;
        let position = {
            let bi = self.interval(interval);
            bi.blocks
                .iter()
                .position(|b| self.blocks[b.0].offset > offset)
                .unwrap_or(bi.blocks.len())
        };
        self.interval_mut(interval).blocks.insert(position, id);
    }
}
