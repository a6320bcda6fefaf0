//! Rendering of symbol references and symbolic expressions.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{Module, Payload, SymbolId, SymbolicExpression};
use crate::syntax::Syntax;
use crate::utils::format_addend;

const PLT_SECTIONS: &[&str] = &[".plt", ".plt.got", ".plt.sec"];
const GOT_SECTIONS: &[&str] = &[".got", ".got.plt"];

/// Label used for an address whose symbols cannot be named unambiguously.
pub fn address_label(address: u64) -> String {
    format!(".L_{address:x}")
}

/// Decides how each symbol is spelled in the output.
pub struct SymbolResolver<'m> {
    module: &'m Module,
    syntax: &'static Syntax,
    ambiguous: BTreeSet<SymbolId>,
}

impl<'m> SymbolResolver<'m> {
    pub fn new(module: &'m Module, syntax: &'static Syntax) -> Self {
        let mut by_name: BTreeMap<String, Vec<SymbolId>> = BTreeMap::new();
        for (id, symbol) in module.symbols() {
            by_name.entry(syntax.format_symbol_name(&symbol.name)).or_default().push(id);
        }
        let ambiguous = by_name
            .into_iter()
            .filter(|(name, ids)| name.is_empty() || ids.len() > 1)
            .flat_map(|(_, ids)| ids)
            .collect();
        Self {
            module,
            syntax,
            ambiguous,
        }
    }

    /// A symbol is ambiguous when its output name is empty or shared with another symbol.
    pub fn is_ambiguous(&self, symbol: SymbolId) -> bool {
        self.ambiguous.contains(&symbol)
    }

    /// The name a symbol is defined and referenced by, ignoring forwarding.
    pub fn symbol_reference(&self, symbol: SymbolId) -> String {
        let sym = self.module.symbol(symbol);
        match sym.payload {
            // Integral symbols that layout could not attach to a block.
            Payload::Address(address) => format!("{address:#x}"),
            Payload::Referent(_) if self.is_ambiguous(symbol) => match self.module.symbol_address(symbol) {
                Some(address) => address_label(address),
                None => self.syntax.format_symbol_name(&sym.name),
            },
            _ => self.syntax.format_symbol_name(&sym.name),
        }
    }

    /// Label text for a symbol defined at its address.
    pub fn label(&self, symbol: SymbolId) -> Option<String> {
        let address = self.module.symbol_address(symbol)?;
        if self.is_ambiguous(symbol) {
            Some(address_label(address))
        } else {
            Some(self.syntax.format_symbol_name(&self.module.symbol(symbol).name))
        }
    }

    /// The symbol a reference to `symbol` is printed as.
    pub fn forwarded(&self, symbol: SymbolId) -> Option<SymbolId> {
        self.module.tables.symbol_forwarding.get(&symbol).copied()
    }

    /// Suffix of a forwarded reference, chosen by where the source symbol lives.
    pub fn forwarded_ending(&self, source: SymbolId, in_data: bool) -> &'static str {
        let Some(section) = self.module.symbol_section(source) else {
            return "";
        };
        let name = self.module.section(section).name.as_str();
        if PLT_SECTIONS.contains(&name) && !in_data {
            "@PLT"
        } else if GOT_SECTIONS.contains(&name) {
            "@GOTPCREL"
        } else {
            ""
        }
    }

    /// Reference to `symbol` after forwarding.
    pub fn resolve(&self, symbol: SymbolId, in_data: bool) -> String {
        match self.forwarded(symbol) {
            Some(target) => format!(
                "{}{}",
                self.symbol_reference(target),
                self.forwarded_ending(symbol, in_data)
            ),
            None => self.symbol_reference(symbol),
        }
    }

    /// Renders a symbolic expression as an assembler expression.
    pub fn render(&self, expr: &SymbolicExpression, in_data: bool) -> String {
        match *expr {
            SymbolicExpression::AddrConst { symbol, offset } => {
                format!("{}{}", self.resolve(symbol, in_data), format_addend(offset))
            }
            SymbolicExpression::AddrAddr {
                minuend,
                subtrahend,
                scale,
                offset,
            } => {
                let difference = format!("{}-{}", self.resolve(minuend, in_data), self.resolve(subtrahend, in_data));
                let scaled = if scale == 1 {
                    difference
                } else {
                    format!("({difference})/{scale}")
                };
                format!("{scaled}{}", format_addend(offset))
            }
        }
    }
}
