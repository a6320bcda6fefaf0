//! Layout management.
//!
//! This module gives every byte interval of a module a unique, non-overlapping
//! address and repairs the symbol/block graph so that printing is well defined:
//! - `fix_integral_symbols`: turns address-only symbols into block referents.
//! - `merge_fallthrough_intervals`: joins intervals connected by fallthrough edges.
//! - `assign_addresses`: packs intervals section by section from a base address.
//! - `add_overlap_disambiguation_symbols`: names addresses shared by several blocks.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::error::LayoutError;
use crate::ir::{
    BlockId, BlockKind, CfgNode, EdgeKind, IntervalId, Module, Payload, SectionId, Symbol,
    SymbolId,
};

/// Prefix of symbols synthesized for addresses shared by several blocks.
pub const DISAMBIGUATION_PREFIX: &str = ".L_overlap_";

/// An address-only symbol that matched no block or interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedSymbol {
    pub symbol: SymbolId,
    pub address: u64,
}

/// What a layout pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutReport {
    pub unresolved_symbols: Vec<UnresolvedSymbol>,
    pub merged_intervals: usize,
    pub disambiguation_symbols: Vec<SymbolId>,
}

/// Whether the module, one of its sections, or one of its intervals lacks an address.
///
/// Section and module addresses are derived from their intervals, so a section
/// without intervals never has one. Such sections are ignored, and a module with no
/// intervals at all needs no layout: `layout_module` could not give them an address,
/// and reporting them would keep this true forever. Only checks for missing
/// addresses, not for overlaps.
pub fn layout_required(module: &Module) -> bool {
    let has_bytes = module.intervals().next().is_some();
    if has_bytes && module.address().is_none() {
        return true;
    }
    module.sections().any(|(id, section)| {
        !section.intervals.is_empty()
            && (module.section_address(id).is_none()
                || section.intervals.iter().any(|bi| module.interval(*bi).address.is_none()))
    })
}

/// Lays out `module` starting at address 0.
pub fn layout_module(module: &mut Module) -> Result<LayoutReport, LayoutError> {
    layout_module_at(module, 0)
}

/// Lays out `module` starting at `base`.
///
/// Runs `fix_integral_symbols`, merges fallthrough intervals section by section,
/// assigns addresses and finally adds disambiguation symbols. Running it again on a
/// laid-out module changes nothing.
pub fn layout_module_at(module: &mut Module, base: u64) -> Result<LayoutReport, LayoutError> {
    let unresolved_symbols = fix_integral_symbols(module);

    let mut merged_intervals = 0;
    let sections: Vec<SectionId> = module.sections().map(|(id, _)| id).collect();
    for section in sections {
        merged_intervals += merge_fallthrough_intervals(module, section)?;
    }

    let end = assign_addresses(module, base);
    let disambiguation_symbols = add_overlap_disambiguation_symbols(module);

    info!(
        "Laid out module {} at [{:#x}, {:#x}): {} merged intervals, {} disambiguation symbols, {} unresolved symbols",
        module.name,
        base,
        end,
        merged_intervals,
        disambiguation_symbols.len(),
        unresolved_symbols.len()
    );

    Ok(LayoutReport {
        unresolved_symbols,
        merged_intervals,
        disambiguation_symbols,
    })
}

/// Clears every interval address. Merges and added symbols are kept.
pub fn remove_module_layout(module: &mut Module) {
    let intervals: Vec<IntervalId> = module.intervals().map(|(id, _)| id).collect();
    for id in intervals {
        module.interval_mut(id).address = None;
    }
}

/// Assigns consecutive addresses to the intervals of every section, in section order.
///
/// Returns the address one past the last interval.
pub fn assign_addresses(module: &mut Module, base: u64) -> u64 {
    let mut addr = base;
    let sections: Vec<SectionId> = module.sections().map(|(id, _)| id).collect();
    for section in sections {
        let intervals = module.section(section).intervals.clone();
        for id in intervals {
            let interval = module.interval_mut(id);
            interval.address = Some(addr);
            addr += interval.size;
        }
    }
    addr
}

/// Merges intervals of `section` whose last code block falls through into another
/// interval, until no fallthrough crosses an interval boundary.
///
/// Returns the number of intervals absorbed.
pub fn merge_fallthrough_intervals(module: &mut Module, section: SectionId) -> Result<usize, LayoutError> {
    let mut worklist: VecDeque<IntervalId> = module.section(section).intervals.iter().copied().collect();
    let mut merged = 0;

    while let Some(source) = worklist.pop_front() {
        if !module.is_live(source) {
            continue;
        }
        if let Some(target) = find_fallthrough_target(module, section, source)? {
            absorb_interval(module, source, target);
            merged += 1;
            // The absorbed interval's last block may fall through again.
            worklist.push_front(source);
        }
    }
    Ok(merged)
}

fn find_fallthrough_target(
    module: &Module,
    section: SectionId,
    source: IntervalId,
) -> Result<Option<IntervalId>, LayoutError> {
    let Some(last) = module.last_code_block(source) else {
        return Ok(None);
    };

    for edge in module.cfg.out_edges(CfgNode::Block(last)) {
        if edge.kind != EdgeKind::Fallthrough {
            continue;
        }
        let target = match edge.target {
            CfgNode::Block(target) => target,
            CfgNode::Proxy(_) => return Err(LayoutError::FallthroughIntoProxy { block: last }),
        };

        let target_interval = module.block(target).interval;
        if target_interval == source {
            continue;
        }
        if module.section_of(target_interval) != section {
            return Err(LayoutError::CrossSectionFallthrough { block: last, target });
        }

        let end = module.block(last).end();
        let size = module.interval(source).size;
        if end != size {
            return Err(LayoutError::SourceNotAtIntervalEnd { block: last, end, size });
        }
        let offset = module.block(target).offset;
        if offset != 0 {
            return Err(LayoutError::TargetNotAtIntervalStart { block: target, offset });
        }
        return Ok(Some(target_interval));
    }
    Ok(None)
}

/// Appends `target` to the end of `source` and removes `target` from its section.
fn absorb_interval(module: &mut Module, source: IntervalId, target: IntervalId) {
    let Some(absorbed) = module.remove_interval(target) else {
        return;
    };
    let base = module.interval(source).size;
    debug!(
        "Merging interval {:?} ({} bytes) into {:?} at offset {:#x}",
        target, absorbed.size, source, base
    );

    let interval = module.interval_mut(source);
    if !absorbed.bytes.is_empty() {
        interval.bytes.resize(base as usize, 0);
        interval.bytes.extend_from_slice(&absorbed.bytes);
    }
    interval.size += absorbed.size;
    for (offset, expr) in absorbed.symbolic_expressions {
        interval.symbolic_expressions.insert(base + offset, expr);
    }
    for (offset, size) in absorbed.symbolic_expression_sizes {
        interval.symbolic_expression_sizes.insert(base + offset, size);
    }

    for block in absorbed.blocks {
        let offset = module.block(block).offset;
        module.reparent_block(block, source, base + offset);
    }
}

/// Attaches every address-only symbol to a block, creating zero-length blocks where
/// needed. Symbols that land nowhere are left untouched and returned.
pub fn fix_integral_symbols(module: &mut Module) -> Vec<UnresolvedSymbol> {
    let integral: Vec<(SymbolId, u64)> = module
        .symbols()
        .filter_map(|(id, sym)| match sym.payload {
            Payload::Address(addr) => Some((id, addr)),
            _ => None,
        })
        .collect();

    let mut unresolved = Vec::new();
    for (symbol, address) in integral {
        match referent_for_address(module, address) {
            Some(block) => {
                debug!("Attached symbol {} at {:#x} to block {:?}", module.symbol(symbol).name, address, block);
                module.symbol_mut(symbol).payload = Payload::Referent(block);
            }
            None => {
                warn!(
                    "Symbol {} at {:#x} matches no block or byte interval; it will be printed as a number",
                    module.symbol(symbol).name,
                    address
                );
                unresolved.push(UnresolvedSymbol { symbol, address });
            }
        }
    }
    unresolved
}

fn referent_for_address(module: &mut Module, addr: u64) -> Option<BlockId> {
    if let Some(&interval) = module.intervals_on(addr).first() {
        let base = module.interval(interval).address?;

        if let Some(&exact) = module.blocks_at(interval, addr).first() {
            return Some(exact);
        }
        let kind = module
            .blocks_on(interval, addr)
            .first()
            .map(|b| module.block(*b).kind)
            .unwrap_or(BlockKind::Data);
        return Some(module.add_block(interval, kind, addr - base, 0));
    }

    // One past the end of an interval.
    let interval = addr
        .checked_sub(1)
        .and_then(|prev| module.intervals_on(prev).first().copied())?;
    let base = module.interval(interval).address?;
    Some(module.add_data_block(interval, addr - base, 0))
}

/// Adds one symbol per address where blocks overlap and no block starting there is
/// named yet, attached to the first such block in address order.
pub fn add_overlap_disambiguation_symbols(module: &mut Module) -> Vec<SymbolId> {
    let mut named: HashSet<BlockId> = module.symbols().filter_map(|(_, s)| s.referent()).collect();
    let mut added = Vec::new();
    let mut anchored_at = None;

    for block in module.blocks_in_address_order() {
        let Some(addr) = module.block_address(block) else {
            continue;
        };
        if anchored_at == Some(addr) {
            continue;
        }

        let (interval, size) = {
            let b = module.block(block);
            (b.interval, b.size)
        };
        let overlapping = module.blocks_starting_in(interval, addr, addr + size.max(1));
        if overlapping.len() < 2 {
            continue;
        }
        if module.blocks_at(interval, addr).iter().any(|b| named.contains(b)) {
            continue;
        }

        let name = format!("{DISAMBIGUATION_PREFIX}{addr}");
        debug!("Adding {} for {} blocks overlapping at {:#x}", name, overlapping.len(), addr);
        added.push(module.add_symbol(Symbol::with_referent(&name, block)));
        named.insert(block);
        anchored_at = Some(addr);
    }
    added
}
