//! ELF input.
//!
//! Builds a `Module` from an x86-64 ELF file using the `object` crate. Every
//! loadable section becomes one byte interval, split into blocks at symbol
//! boundaries. Relocations become symbolic expressions, so relocatable objects
//! round-trip with their references intact. Relocatable objects are left without
//! addresses, which makes layout mandatory before printing.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Context, Result};
use object::elf::{SHT_FINI_ARRAY, SHT_INIT_ARRAY, SHT_NOBITS, SHT_PROGBITS};
use object::read::{Object, ObjectSection, RelocationTarget, SectionIndex, SymbolIndex};
use object::{Architecture as ObjArch, ObjectKind, ObjectSymbol, RelocationKind, SectionFlags, SectionKind, SymbolKind};
use tracing::{debug, info, warn};

use crate::decode::{Decoder, IcedDecoder, MnemonicStyle};
use crate::ir::{
    BlockId, ByteInterval, IntervalId, Module, SectionId, SectionProperties, Symbol, SymbolId, SymbolicExpression,
};

/// Where an input section ended up in the module.
struct LoadedSection {
    id: SectionId,
    interval: IntervalId,
    /// Address of the input section; symbol values in executables are absolute.
    base: u64,
    /// Blocks by start offset.
    blocks: Vec<(u64, BlockId)>,
}

impl LoadedSection {
    /// The block starting at `offset`, or the last block before it.
    fn block_at(&self, offset: u64) -> Option<BlockId> {
        self.blocks
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, b)| *b)
    }

    fn block_starting_at(&self, offset: u64) -> Option<BlockId> {
        self.blocks.iter().find(|(start, _)| *start == offset).map(|(_, b)| *b)
    }
}

/// Maps an input section kind to the kind used in the module, or `None` to drop it.
fn module_section_kind(kind: SectionKind) -> Option<SectionKind> {
    match kind {
        SectionKind::Text
        | SectionKind::Data
        | SectionKind::ReadOnlyData
        | SectionKind::ReadOnlyDataWithRel
        | SectionKind::ReadOnlyString
        | SectionKind::UninitializedData
        | SectionKind::Tls
        | SectionKind::UninitializedTls => Some(kind),
        SectionKind::Elf(SHT_INIT_ARRAY) | SectionKind::Elf(SHT_FINI_ARRAY) => Some(SectionKind::Data),
        _ => None,
    }
}

fn section_type(kind: SectionKind) -> u32 {
    match kind {
        SectionKind::UninitializedData | SectionKind::UninitializedTls => SHT_NOBITS,
        SectionKind::Elf(sh_type) => sh_type,
        _ => SHT_PROGBITS,
    }
}

/// Parses `data` as an x86-64 ELF file and converts it into a module named `name`.
pub fn load_elf(data: &[u8], name: &str) -> Result<Module> {
    let obj = object::File::parse(data).context("failed to parse object file")?;
    if obj.architecture() != ObjArch::X86_64 {
        bail!("Unsupported architecture in {}: {:?}. Only X86_64 is supported.", name, obj.architecture());
    }
    if obj.format() != object::BinaryFormat::Elf {
        bail!("{} is not an ELF file", name);
    }
    let relocatable = obj.kind() == ObjectKind::Relocatable;

    let mut module = Module::new(name);
    let mut sections: HashMap<SectionIndex, LoadedSection> = HashMap::new();

    // Block boundaries: section start plus every symbol start and object end.
    let mut boundaries: HashMap<SectionIndex, BTreeSet<u64>> = HashMap::new();
    for sym in obj.symbols() {
        if sym.is_undefined() || matches!(sym.kind(), SymbolKind::Section | SymbolKind::File) {
            continue;
        }
        if let Some(index) = sym.section_index() {
            let base = obj.section_by_index(index).map(|s| s.address()).unwrap_or(0);
            let offset = sym.address().wrapping_sub(base);
            let set = boundaries.entry(index).or_default();
            set.insert(offset);
            if sym.kind() == SymbolKind::Data && sym.size() > 0 {
                set.insert(offset + sym.size());
            }
        }
    }

    for section in obj.sections() {
        let size = section.size();
        let section_name = section.name()?;
        let Some(kind) = module_section_kind(section.kind()).filter(|_| section_name != ".eh_frame") else {
            debug!("Skipping section {} (kind: {:?}, size: {})", section_name, section.kind(), size);
            continue;
        };
        if size == 0 {
            continue;
        }

        let address = (!relocatable).then(|| section.address());
        let interval = if matches!(kind, SectionKind::UninitializedData | SectionKind::UninitializedTls) {
            ByteInterval::uninitialized(address, size)
        } else {
            ByteInterval::new(address, section.data()?.to_vec())
        };

        let id = module.add_section(section_name, kind);
        let interval_id = module.add_byte_interval(id, interval);
        let flags = match section.flags() {
            SectionFlags::Elf { sh_flags } => sh_flags,
            _ => 0,
        };
        module.tables.section_properties.insert(
            id,
            SectionProperties {
                section_type: section_type(section.kind()),
                flags,
            },
        );

        let mut starts: Vec<u64> = std::iter::once(0)
            .chain(boundaries.get(&section.index()).into_iter().flatten().copied())
            .filter(|offset| *offset <= size)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut blocks = Vec::with_capacity(starts.len());
        starts.push(size);
        for pair in starts.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start == end && start < size {
                continue;
            }
            let block = if kind == SectionKind::Text && start < size {
                module.add_code_block(interval_id, start, end - start)
            } else {
                module.add_data_block(interval_id, start, end - start)
            };
            blocks.push((start, block));
        }

        sections.insert(
            section.index(),
            LoadedSection {
                id,
                interval: interval_id,
                base: section.address(),
                blocks,
            },
        );
    }

    let mut symbols: HashMap<SymbolIndex, SymbolId> = HashMap::new();
    let mut externals: HashMap<String, SymbolId> = HashMap::new();
    for sym in obj.symbols() {
        let sym_name = sym.name()?;
        if sym_name.is_empty() || matches!(sym.kind(), SymbolKind::Section | SymbolKind::File) {
            continue;
        }
        if sym.is_undefined() {
            let id = *externals
                .entry(sym_name.to_string())
                .or_insert_with(|| module.add_symbol(Symbol::external(sym_name)));
            symbols.insert(sym.index(), id);
            continue;
        }
        match sym.section_index().and_then(|index| sections.get(&index)) {
            Some(loaded) => {
                let offset = sym.address().wrapping_sub(loaded.base);
                let Some(block) = loaded.block_starting_at(offset) else {
                    warn!("No block for symbol {} at offset {:#x}", sym_name, offset);
                    continue;
                };
                let id = module.add_symbol(Symbol::with_referent(sym_name, block));
                if sym.kind() == SymbolKind::Text && module.block(block).is_code() {
                    module.tables.function_entries.insert(block);
                }
                symbols.insert(sym.index(), id);
            }
            None if sym.section_index().is_none() && !relocatable => {
                let id = module.add_symbol(Symbol::with_address(sym_name, sym.address()));
                symbols.insert(sym.index(), id);
            }
            None => debug!("Dropping symbol {} of an unloaded section", sym_name),
        }
    }

    let mut anchors: HashMap<SectionIndex, SymbolId> = HashMap::new();
    let mut expressions = 0;
    for section in obj.sections() {
        let Some(loaded) = sections.get(&section.index()) else {
            continue;
        };
        for (offset, reloc) in section.relocations() {
            let target = match reloc.target() {
                RelocationTarget::Symbol(index) => {
                    let target_sym = obj.symbol_by_index(index)?;
                    if target_sym.kind() == SymbolKind::Section {
                        target_sym.section_index().and_then(|s| anchor(&mut module, &sections, &mut anchors, s))
                    } else {
                        symbols.get(&index).copied()
                    }
                }
                RelocationTarget::Section(index) => anchor(&mut module, &sections, &mut anchors, index),
                _ => None,
            };
            let Some(target) = target else {
                warn!("Relocation at {}+{:#x} has no usable target", section.name()?, offset);
                continue;
            };

            let in_code = module.section(loaded.id).kind == SectionKind::Text;
            let interval_offset = offset.wrapping_sub(loaded.base);
            let addend = match reloc.kind() {
                RelocationKind::Absolute => reloc.addend(),
                RelocationKind::Relative | RelocationKind::PltRelative if in_code => {
                    // The assembler measures from the end of the instruction.
                    reloc.addend() + pc_bias(&module, loaded, interval_offset, reloc.size())
                }
                kind if in_code => {
                    warn!(
                        "Relocation {:?} at {}+{:#x} is printed as a direct reference",
                        kind,
                        section.name()?,
                        offset
                    );
                    reloc.addend() + pc_bias(&module, loaded, interval_offset, reloc.size().max(32))
                }
                kind => {
                    warn!("Dropping relocation {:?} at {}+{:#x} in data", kind, section.name()?, offset);
                    continue;
                }
            };
            module.add_symbolic_expression(loaded.interval, interval_offset, SymbolicExpression::addr_const(target, addend));
            if reloc.size() > 0 {
                module.set_symbolic_expression_size(loaded.interval, interval_offset, u64::from(reloc.size() / 8));
            }
            expressions += 1;
        }
    }

    info!(
        "Loaded {}: {} sections, {} blocks, {} symbols, {} symbolic expressions",
        name,
        module.sections().count(),
        module.block_count(),
        module.symbol_count(),
        expressions
    );
    Ok(module)
}

/// Distance from a PC-relative field to the end of its instruction, which is where
/// the processor, and the assembler, measure from.
fn pc_bias(module: &Module, loaded: &LoadedSection, offset: u64, bits: u8) -> i64 {
    let field = i64::from(bits / 8);
    let Some(block) = loaded.block_at(offset) else {
        return field;
    };
    let b = module.block(block);
    let bytes = module.interval(b.interval).read(b.offset, b.size);
    IcedDecoder::new(MnemonicStyle::Gas)
        .decode(&bytes, b.offset)
        .iter()
        .find(|insn| offset >= insn.address && offset < insn.address + insn.len as u64)
        .map_or(field, |insn| (insn.address + insn.len as u64 - offset) as i64)
}

/// A symbol naming the start of an input section, for section-relative relocations.
fn anchor(
    module: &mut Module,
    sections: &HashMap<SectionIndex, LoadedSection>,
    anchors: &mut HashMap<SectionIndex, SymbolId>,
    index: SectionIndex,
) -> Option<SymbolId> {
    if let Some(id) = anchors.get(&index) {
        return Some(*id);
    }
    let loaded = sections.get(&index)?;
    let block = loaded.block_at(0)?;
    let name = format!(".L_section_{}_{}", loaded.id.0, index.0);
    let id = module.add_symbol(Symbol::with_referent(&name, block));
    anchors.insert(index, id);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{layout_module, layout_required};
    use crate::registry::TargetRegistry;
    use object::write::{self, Relocation, StandardSection, SymbolSection};
    use object::{BinaryFormat, Endianness, RelocationEncoding, RelocationFlags, SymbolFlags, SymbolScope};

    fn symbol(name: &str, value: u64, size: u64, kind: SymbolKind, section: SymbolSection) -> write::Symbol {
        write::Symbol {
            name: name.as_bytes().to_vec(),
            value,
            size,
            kind,
            scope: SymbolScope::Linkage,
            weak: false,
            section,
            flags: SymbolFlags::None,
        }
    }

    fn reloc(offset: u64, symbol: write::SymbolId, addend: i64, kind: RelocationKind, size: u8) -> Relocation {
        Relocation {
            offset,
            symbol,
            addend,
            flags: RelocationFlags::Generic {
                kind,
                encoding: RelocationEncoding::Generic,
                size,
            },
        }
    }

    /// `main: push %rbp; call foo; pop %rbp; ret`, `helper: ret`, and a `.data`
    /// section with a section-relative pointer `table` and a 32-bit `counter`.
    fn relocatable_object() -> Vec<u8> {
        let mut obj = write::Object::new(BinaryFormat::Elf, ObjArch::X86_64, Endianness::Little);
        let text = obj.section_id(StandardSection::Text);
        obj.append_section_data(text, &[0x55, 0xe8, 0, 0, 0, 0, 0x5d, 0xc3, 0xc3], 16);
        obj.add_symbol(symbol("main", 0, 8, SymbolKind::Text, SymbolSection::Section(text)));
        let helper = obj.add_symbol(symbol("helper", 8, 1, SymbolKind::Text, SymbolSection::Section(text)));
        let foo = obj.add_symbol(symbol("foo", 0, 0, SymbolKind::Text, SymbolSection::Undefined));
        obj.add_relocation(text, reloc(2, foo, -4, RelocationKind::PltRelative, 32)).unwrap();

        let data = obj.section_id(StandardSection::Data);
        obj.append_section_data(data, &[0; 12], 8);
        obj.add_symbol(symbol("table", 0, 8, SymbolKind::Data, SymbolSection::Section(data)));
        obj.add_symbol(symbol("counter", 8, 4, SymbolKind::Data, SymbolSection::Section(data)));
        let text_sym = obj.section_symbol(text);
        obj.add_relocation(data, reloc(0, text_sym, 8, RelocationKind::Absolute, 64)).unwrap();
        obj.add_relocation(data, reloc(8, helper, 0, RelocationKind::Absolute, 32)).unwrap();
        obj.write().unwrap()
    }

    fn section_named<'a>(m: &'a Module, name: &str) -> &'a crate::ir::Section {
        m.sections().find(|(_, s)| s.name == name).unwrap().1
    }

    fn symbol_named(m: &Module, name: &str) -> SymbolId {
        m.symbols().find(|(_, s)| s.name == name).unwrap().0
    }

    fn block_extents(m: &Module, interval: IntervalId) -> Vec<(u64, u64)> {
        m.interval(interval)
            .blocks
            .iter()
            .map(|b| (m.block(*b).offset, m.block(*b).size))
            .collect()
    }

    #[test]
    fn relocatable_sections_are_split_at_symbols() {
        let m = load_elf(&relocatable_object(), "test.o").unwrap();
        assert!(layout_required(&m));

        let text = section_named(&m, ".text").intervals[0];
        assert_eq!(m.interval(text).address, None);
        assert_eq!(block_extents(&m, text), vec![(0, 8), (8, 1)]);
        for block in &m.interval(text).blocks {
            assert!(m.block(*block).is_code());
            assert!(m.tables.function_entries.contains(block));
        }

        let data = section_named(&m, ".data").intervals[0];
        assert_eq!(block_extents(&m, data), vec![(0, 8), (8, 4), (12, 0)]);
        assert!(m.tables.encodings.is_empty());
    }

    #[test]
    fn relocations_become_sized_symbolic_expressions() {
        let m = load_elf(&relocatable_object(), "test.o").unwrap();
        let text = m.interval(section_named(&m, ".text").intervals[0]);
        let data = m.interval(section_named(&m, ".data").intervals[0]);

        // The call is measured from the end of the instruction, so the addend cancels.
        let foo = symbol_named(&m, "foo");
        assert_eq!(text.symbolic_expressions.get(&2), Some(&SymbolicExpression::addr_const(foo, 0)));
        assert_eq!(text.symbolic_expression_size(2), Some(4));

        let Some(&SymbolicExpression::AddrConst { symbol: anchor, offset: 8 }) = data.symbolic_expressions.get(&0) else {
            panic!("expected a section-relative pointer");
        };
        assert!(m.symbol(anchor).name.starts_with(".L_section_"));
        assert_eq!(m.symbol(anchor).referent(), Some(text.blocks[0]));
        assert_eq!(data.symbolic_expression_size(0), Some(8));

        let helper = symbol_named(&m, "helper");
        assert_eq!(data.symbolic_expressions.get(&8), Some(&SymbolicExpression::addr_const(helper, 0)));
        assert_eq!(data.symbolic_expression_size(8), Some(4));
    }

    #[test]
    fn loaded_object_prints_after_layout() {
        let mut m = load_elf(&relocatable_object(), "test.o").unwrap();
        layout_module(&mut m).unwrap();
        let printer = TargetRegistry::with_builtin_targets().create(&m, "elf", "att").unwrap();
        let mut out = Vec::new();
        printer.print(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = out.lines().map(str::trim).collect();
        assert!(lines.iter().any(|l| l.starts_with("call") && l.ends_with(" foo")), "{out}");
        assert!(lines.iter().any(|l| l.starts_with(".quad .L_section_") && l.ends_with("+8")), "{out}");
        assert!(lines.contains(&".long helper"), "{out}");
        assert!(lines.contains(&".globl main"));
    }
}
