//! Printing engine.
//!
//! `PrettyPrinter` walks a laid-out module in address order and writes GNU
//! assembler text: one header per section, function headers and footers around
//! code, labels for every symbol address, one line per instruction or data item.
//!
//! A print pass only reads the module. The module must have been laid out; blocks
//! without an address are reported and skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use object::elf::{SHF_ALLOC, SHF_EXECINSTR, SHF_TLS, SHF_WRITE, SHT_FINI_ARRAY, SHT_INIT_ARRAY, SHT_NOBITS};
use object::SectionKind;
use tracing::{debug, info, warn};

use crate::arch::{Architecture, Backend};
use crate::decode::{DecodedInstruction, Decoder};
use crate::error::PrintError;
use crate::ir::{BlockId, Module, Offset, SectionId};
use crate::syntax::Syntax;
use crate::utils::natural_alignment;

mod data;
pub mod policy;
pub mod symbolic;

pub use policy::PrintingPolicy;
pub use symbolic::{address_label, SymbolResolver};

const HEAVY_BAR: &str = "#===================================";
const LIGHT_BAR: &str = "#-----------------------------------";

/// A function as the printer sees it: an entry address and a name.
#[derive(Debug, Clone)]
struct Function {
    section: SectionId,
    entry: BlockId,
    name: String,
    /// Every raw symbol name at the entry, used for skip decisions.
    aliases: Vec<String>,
    /// No usable symbol exists at the entry; the header defines the label itself.
    synthesized: bool,
}

/// Mutable state of one print pass.
#[derive(Debug, Default)]
struct PassState {
    /// Addresses whose labels were already printed.
    labeled: BTreeSet<u64>,
    /// Entry address of the function whose footer is still pending.
    open_function: Option<u64>,
}

/// Renders a module as reassemblable assembly text.
pub struct PrettyPrinter<'m> {
    module: &'m Module,
    backend: Backend,
    policy: PrintingPolicy,
    decoder: Box<dyn Decoder + 'm>,
    resolver: SymbolResolver<'m>,
    /// Label texts by address, in symbol order.
    labels: BTreeMap<u64, Vec<String>>,
    /// Functions by entry address.
    functions: BTreeMap<u64, Function>,
}

impl<'m> PrettyPrinter<'m> {
    pub fn new(module: &'m Module, backend: Backend, mut policy: PrintingPolicy) -> Self {
        let syntax = backend.syntax();
        let resolver = SymbolResolver::new(module, syntax);

        // The CFI directives regenerate the unwind tables.
        if !module.tables.cfi_directives.is_empty() {
            policy.skip_section(".eh_frame");
        }

        let mut labels: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for (id, _) in module.symbols() {
            if module.symbol(id).referent().is_none() {
                continue;
            }
            if let (Some(address), Some(label)) = (module.symbol_address(id), resolver.label(id)) {
                let at = labels.entry(address).or_default();
                if !at.contains(&label) {
                    at.push(label);
                }
            }
        }

        let functions = collect_functions(module, &resolver);

        Self {
            module,
            backend,
            policy,
            decoder: Box::new(backend.decoder()),
            resolver,
            labels,
            functions,
        }
    }

    /// Replaces the instruction decoder.
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder + 'm>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn policy(&self) -> &PrintingPolicy {
        &self.policy
    }

    fn syntax(&self) -> &'static Syntax {
        self.backend.syntax()
    }

    /// Writes the whole module to `out`.
    pub fn print<W: Write>(&self, out: &mut W) -> Result<(), PrintError> {
        let out: &mut dyn Write = out;
        let mut state = PassState::default();

        for line in self.syntax().header {
            writeln!(out, "{line}")?;
        }

        let mut printed = 0;
        for section in self.sections_in_address_order() {
            let name = &self.module.section(section).name;
            if self.policy.is_section_skipped(name) {
                debug!("Skipping section {}", name);
                continue;
            }
            if self.module.section(section).intervals.is_empty() {
                continue;
            }
            self.print_section(out, &mut state, section)?;
            printed += 1;
        }
        info!("Printed {} sections of module {}", printed, self.module.name);
        Ok(())
    }

    fn sections_in_address_order(&self) -> Vec<SectionId> {
        let mut sections: Vec<(Option<u64>, SectionId)> = self
            .module
            .sections()
            .map(|(id, _)| (self.module.section_address(id), id))
            .collect();
        sections.sort_by_key(|(addr, id)| (addr.is_none(), *addr, *id));
        sections.into_iter().map(|(_, id)| id).collect()
    }

    fn print_section(&self, out: &mut dyn Write, state: &mut PassState, section: SectionId) -> Result<(), PrintError> {
        self.print_section_header(out, section)?;

        let mut last = self.module.section_address(section).unwrap_or(0);
        for block in self.module.section_blocks_in_address_order(section) {
            last = self.print_block_or_warning(out, state, section, block, last)?;
        }

        self.close_function(out, state)?;
        self.print_section_footer(out, section)
    }

    fn print_section_header(&self, out: &mut dyn Write, section: SectionId) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let name = &self.module.section(section).name;
        writeln!(out)?;
        writeln!(out, "{HEAVY_BAR}")?;
        match syntax.standard_section_directive(name) {
            Some(directive) => writeln!(out, "{directive}")?,
            None => {
                let (flags, kind) = self.section_flags(section);
                writeln!(out, "{} {} ,\"{}\",{}", syntax.section, name, flags, kind)?;
            }
        }
        if self.policy.is_array_section(name) {
            writeln!(out, "{} 8", syntax.align)?;
        } else if let Some(align) = self.module.section_address(section).and_then(natural_alignment) {
            writeln!(out, "{} {}", syntax.align, align)?;
        }
        writeln!(out, "{HEAVY_BAR}")?;
        writeln!(out)?;
        Ok(())
    }

    fn print_section_footer(&self, out: &mut dyn Write, section: SectionId) -> Result<(), PrintError> {
        let comment = self.syntax().comment;
        writeln!(out, "{HEAVY_BAR}")?;
        writeln!(out, "{comment} end section {}", self.module.section(section).name)?;
        writeln!(out, "{HEAVY_BAR}")?;
        Ok(())
    }

    /// Flags string and `@type` of a `.section` directive.
    fn section_flags(&self, section: SectionId) -> (String, &'static str) {
        if let Some(props) = self.module.tables.section_properties.get(&section) {
            let mut flags = String::new();
            for (bit, c) in [(SHF_ALLOC, 'a'), (SHF_WRITE, 'w'), (SHF_EXECINSTR, 'x'), (SHF_TLS, 'T')] {
                if props.flags & u64::from(bit) != 0 {
                    flags.push(c);
                }
            }
            let kind = match props.section_type {
                SHT_NOBITS => "@nobits",
                SHT_INIT_ARRAY => "@init_array",
                SHT_FINI_ARRAY => "@fini_array",
                _ => "@progbits",
            };
            return (flags, kind);
        }
        let (flags, kind) = match self.module.section(section).kind {
            SectionKind::Text => ("ax", "@progbits"),
            SectionKind::Data => ("wa", "@progbits"),
            SectionKind::ReadOnlyData | SectionKind::ReadOnlyString | SectionKind::ReadOnlyDataWithRel => {
                ("a", "@progbits")
            }
            SectionKind::UninitializedData => ("wa", "@nobits"),
            SectionKind::Tls => ("waT", "@progbits"),
            SectionKind::UninitializedTls => ("waT", "@nobits"),
            _ => ("", "@progbits"),
        };
        (flags.to_string(), kind)
    }

    fn is_code_section(&self, section: SectionId) -> bool {
        self.module.section(section).kind == SectionKind::Text
            || self
                .module
                .tables
                .section_properties
                .get(&section)
                .map_or(false, |p| p.flags & u64::from(SHF_EXECINSTR) != 0)
    }

    fn is_bss_section(&self, section: SectionId) -> bool {
        matches!(
            self.module.section(section).kind,
            SectionKind::UninitializedData | SectionKind::UninitializedTls
        ) || self
            .module
            .tables
            .section_properties
            .get(&section)
            .map_or(false, |p| p.section_type == SHT_NOBITS)
    }

    /// The function containing `addr`: the last entry at or before it in the same code section.
    fn function_of(&self, section: SectionId, addr: u64) -> Option<(u64, &Function)> {
        if !self.is_code_section(section) {
            return None;
        }
        self.functions
            .range(..=addr)
            .next_back()
            .filter(|(_, f)| f.section == section)
            .map(|(entry, f)| (*entry, f))
    }

    fn is_function_skipped(&self, function: &Function) -> bool {
        self.policy.is_function_skipped(&function.name)
            || function.aliases.iter().any(|a| self.policy.is_function_skipped(a))
    }

    /// Whether `addr` lies in a skipped section or a skipped function.
    fn is_skipped_address(&self, addr: u64) -> bool {
        let Some(section) = self.module.section_containing(addr) else {
            return false;
        };
        self.policy.is_section_skipped(&self.module.section(section).name)
            || self
                .function_of(section, addr)
                .map_or(false, |(_, f)| self.is_function_skipped(f))
    }

    /// Prints `block` unless it starts before `last`, the end of the bytes printed so
    /// far. Returns the new end.
    fn print_block_or_warning(
        &self,
        out: &mut dyn Write,
        state: &mut PassState,
        section: SectionId,
        block: BlockId,
        last: u64,
    ) -> Result<u64, PrintError> {
        let Some(addr) = self.module.block_address(block) else {
            warn!("Block {:?} has no address and cannot be printed", block);
            return Ok(last);
        };
        let b = self.module.block(block);

        let function = self.function_of(section, addr);
        if state.open_function.is_some() && state.open_function != function.map(|(entry, _)| entry) {
            self.close_function(out, state)?;
        }
        if let Some((entry, f)) = function {
            if self.is_function_skipped(f) {
                return Ok(last);
            }
            if entry == addr && state.open_function.is_none() && b.size > 0 && addr >= last {
                self.print_function_header(out, entry, f)?;
                state.open_function = Some(entry);
            }
        }

        if b.size == 0 {
            // Zero-length blocks only anchor labels.
            if addr >= last {
                self.print_labels(out, state, addr)?;
            }
            return Ok(last);
        }

        if addr < last {
            warn!("Found overlapping blocks at address {:#x}", addr);
            writeln!(out, "{} WARNING: found overlapping blocks at address {:#x}", self.syntax().comment, addr)?;
            return Ok(last);
        }

        if b.is_code() {
            self.print_alignment(out, block, function.map_or(false, |(entry, _)| entry == addr))?;
            self.print_labels(out, state, addr)?;
            self.print_code_block(out, state, block, addr)?;
        } else {
            if self.is_excluded_array_entry(section, block) {
                debug!("Dropping array entry at {:#x} that refers to skipped code", addr);
                return Ok(last);
            }
            self.print_alignment(out, block, false)?;
            self.print_labels(out, state, addr)?;
            self.print_data_block(out, state, section, block, addr)?;
        }
        Ok(addr + b.size)
    }

    /// Explicit alignment of a block; function entries print theirs in the header.
    fn print_alignment(&self, out: &mut dyn Write, block: BlockId, is_entry: bool) -> Result<(), PrintError> {
        if is_entry {
            return Ok(());
        }
        if let Some(align) = self.module.tables.alignment.get(&block) {
            writeln!(out, "{} {}", self.syntax().align, align)?;
        }
        Ok(())
    }

    fn print_labels(&self, out: &mut dyn Write, state: &mut PassState, addr: u64) -> Result<(), PrintError> {
        if !state.labeled.insert(addr) {
            return Ok(());
        }
        if let Some(labels) = self.labels.get(&addr) {
            for label in labels {
                writeln!(out, "{label}:")?;
            }
        }
        Ok(())
    }

    fn print_function_header(&self, out: &mut dyn Write, entry: u64, function: &Function) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let align = self
            .module
            .tables
            .alignment
            .get(&function.entry)
            .copied()
            .or_else(|| natural_alignment(entry));

        writeln!(out)?;
        writeln!(out, "{LIGHT_BAR}")?;
        writeln!(out, "{} BEGIN - Function Header", syntax.comment)?;
        if let Some(align) = align {
            writeln!(out, "{} {}", syntax.align, align)?;
        }
        if !function.synthesized {
            writeln!(out, "{} {}", syntax.global, function.name)?;
        }
        writeln!(out, "{} {}, @function", syntax.symbol_type, function.name)?;
        writeln!(out, "{} END   - Function Header", syntax.comment)?;
        writeln!(out, "{LIGHT_BAR}")?;
        if function.synthesized {
            writeln!(out, "{}:", function.name)?;
        }
        Ok(())
    }

    fn close_function(&self, out: &mut dyn Write, state: &mut PassState) -> Result<(), PrintError> {
        let Some(entry) = state.open_function.take() else {
            return Ok(());
        };
        if let Some(function) = self.functions.get(&entry) {
            writeln!(out, "{} {}, . - {}", self.syntax().size, function.name, function.name)?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn print_code_block(
        &self,
        out: &mut dyn Write,
        state: &mut PassState,
        block: BlockId,
        addr: u64,
    ) -> Result<(), PrintError> {
        let b = self.module.block(block);
        let bytes = self.module.interval(b.interval).read(b.offset, b.size);
        let instructions = self.decoder.decode(&bytes, addr);

        for insn in &instructions {
            let displacement = insn.address.saturating_sub(addr);
            if displacement > 0 {
                self.print_labels(out, state, insn.address)?;
            }
            self.print_cfi_directives(out, block, displacement, displacement + insn.len as u64)?;
            self.print_instruction(out, block, displacement, insn, &bytes)?;
        }
        self.print_cfi_directives(out, block, b.size, u64::MAX)
    }

    fn print_instruction(
        &self,
        out: &mut dyn Write,
        block: BlockId,
        displacement: u64,
        insn: &DecodedInstruction,
        bytes: &[u8],
    ) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let b = self.module.block(block);
        let interval = self.module.interval(b.interval);

        let mut line = String::from(syntax.tab);
        if self.policy.debug {
            line.push_str(&format!("{:x}: ", insn.address));
        }

        if insn.invalid {
            let byte = bytes.get(displacement as usize).copied().unwrap_or(0);
            warn!("Invalid instruction bytes at {:#x}", insn.address);
            line.push_str(&format!("{} {:#x} {} invalid instruction", syntax.byte, byte, syntax.comment));
        } else {
            let symbolic: Vec<Option<String>> = insn
                .operands
                .iter()
                .map(|operand| {
                    let at = b.offset + displacement + operand.encoding_offset? as u64;
                    interval
                        .symbolic_expressions
                        .get(&at)
                        .map(|expr| self.resolver.render(expr, false))
                })
                .collect();
            let operands = self.backend.operand_list(insn, &symbolic)?;
            line.push_str(&insn.mnemonic);
            if !operands.is_empty() {
                line.push(' ');
                line.push_str(&operands);
            }
        }

        if let Some(comment) = self.comment_text(block, displacement, displacement + insn.len as u64) {
            line.push(' ');
            line.push_str(&comment);
        }
        writeln!(out, "{line}")?;
        Ok(())
    }

    /// CFI directives attached in `[lo, hi)` of `block`.
    fn print_cfi_directives(&self, out: &mut dyn Write, block: BlockId, lo: u64, hi: u64) -> Result<(), PrintError> {
        let range = Offset::new(block, lo)..Offset::new(block, hi);
        for directives in self.module.tables.cfi_directives.range(range).map(|(_, d)| d) {
            for cfi in directives {
                let mut args: Vec<String> = cfi.operands.iter().map(|op| op.to_string()).collect();
                if let Some(symbol) = cfi.symbol {
                    args.push(self.resolver.symbol_reference(symbol));
                }
                if args.is_empty() {
                    writeln!(out, "{}{}", self.syntax().tab, cfi.directive)?;
                } else {
                    writeln!(out, "{}{} {}", self.syntax().tab, cfi.directive, args.join(", "))?;
                }
            }
        }
        Ok(())
    }

    /// Comments attached in `[lo, hi)` of `block`, joined into one trailing comment.
    fn comment_text(&self, block: BlockId, lo: u64, hi: u64) -> Option<String> {
        let range = Offset::new(block, lo)..Offset::new(block, hi);
        let parts: Vec<String> = self
            .module
            .tables
            .comments
            .range(range)
            .map(|(offset, text)| match offset.displacement - lo {
                0 => text.clone(),
                delta => format!("+{delta}: {text}"),
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("{} {}", self.syntax().comment, parts.join(" ")))
        }
    }
}

/// Names every function entry block that has an address.
fn collect_functions(module: &Module, resolver: &SymbolResolver<'_>) -> BTreeMap<u64, Function> {
    let mut functions = BTreeMap::new();
    for entry in &module.tables.function_entries {
        let Some(address) = module.block_address(*entry) else {
            continue;
        };
        if functions.contains_key(&address) {
            continue;
        }
        let mut at_entry: Vec<_> = module
            .symbols()
            .filter(|(id, s)| s.referent().is_some() && module.symbol_address(*id) == Some(address))
            .map(|(id, _)| id)
            .collect();
        at_entry.sort();

        let named = at_entry.iter().find(|id| !resolver.is_ambiguous(**id));
        let (name, synthesized) = match named {
            Some(id) => (resolver.symbol_reference(*id), false),
            None => (format!("unknown_function_{address:x}"), true),
        };
        let aliases = at_entry.iter().map(|id| module.symbol(*id).name.clone()).collect();
        functions.insert(
            address,
            Function {
                section: module.section_of(module.block(*entry).interval),
                entry: *entry,
                name,
                aliases,
                synthesized,
            },
        );
    }
    functions
}
