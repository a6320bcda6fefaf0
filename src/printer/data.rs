//! Data block rendering.

use std::io::Write;

use tracing::warn;

use super::{PassState, PrettyPrinter};
use crate::error::PrintError;
use crate::ir::{BlockId, ByteInterval, DataType, SectionId, SymbolicExpression};
use crate::utils::{escape_byte, format_int};

impl<'m> PrettyPrinter<'m> {
    /// Whether a data block of an array section points into code that is not printed.
    pub(super) fn is_excluded_array_entry(&self, section: SectionId, block: BlockId) -> bool {
        if !self.policy.is_array_section(&self.module.section(section).name) {
            return false;
        }
        let b = self.module.block(block);
        self.module
            .interval(b.interval)
            .symbolic_expressions_in(b.offset, b.size)
            .flat_map(|(_, expr)| expr.symbols())
            .filter_map(|symbol| self.module.symbol_address(symbol))
            .any(|addr| self.is_skipped_address(addr))
    }

    pub(super) fn print_data_block(
        &self,
        out: &mut dyn Write,
        state: &mut PassState,
        section: SectionId,
        block: BlockId,
        addr: u64,
    ) -> Result<(), PrintError> {
        let b = self.module.block(block);
        let interval = self.module.interval(b.interval);
        let bytes = interval.read(b.offset, b.size);
        let has_expressions = interval.symbolic_expressions_in(b.offset, b.size).next().is_some();
        let interior_labels: Vec<u64> = self
            .labels
            .range(addr + 1..addr + b.size)
            .map(|(at, _)| *at)
            .collect();

        if self.is_bss_section(section) || (!has_expressions && bytes.iter().all(|byte| *byte == 0)) {
            return self.print_zero_data(out, state, block, addr, b.size, &interior_labels);
        }

        let encoding = self.module.tables.encodings.get(&block).copied();
        match encoding {
            Some(DataType::String | DataType::Ascii) if !has_expressions && interior_labels.is_empty() => {
                self.print_string(out, block, &bytes)
            }
            _ => self.print_data_items(out, state, block, addr, &bytes, encoding),
        }
    }

    /// `.zero` runs, split wherever a label falls inside the block.
    fn print_zero_data(
        &self,
        out: &mut dyn Write,
        state: &mut PassState,
        block: BlockId,
        addr: u64,
        size: u64,
        interior_labels: &[u64],
    ) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let mut start = addr;
        for end in interior_labels.iter().copied().chain(std::iter::once(addr + size)) {
            let mut line = format!("{}{} {}", syntax.tab, syntax.zero, end - start);
            if let Some(comment) = self.comment_text(block, start - addr, end - addr) {
                line.push(' ');
                line.push_str(&comment);
            }
            writeln!(out, "{line}")?;
            if end < addr + size {
                self.print_labels(out, state, end)?;
            }
            start = end;
        }
        Ok(())
    }

    fn print_string(&self, out: &mut dyn Write, block: BlockId, bytes: &[u8]) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let (directive, text) = match bytes.split_last() {
            Some((0, rest)) => (syntax.string, rest),
            _ => (syntax.ascii, bytes),
        };
        let escaped: String = text.iter().map(|byte| escape_byte(*byte)).collect();
        let mut line = format!("{}{} \"{}\"", syntax.tab, directive, escaped);
        if let Some(comment) = self.comment_text(block, 0, bytes.len() as u64) {
            line.push(' ');
            line.push_str(&comment);
        }
        writeln!(out, "{line}")?;
        Ok(())
    }

    /// Walks the block emitting symbolic expressions, declared integers and bytes.
    fn print_data_items(
        &self,
        out: &mut dyn Write,
        state: &mut PassState,
        block: BlockId,
        addr: u64,
        bytes: &[u8],
        encoding: Option<DataType>,
    ) -> Result<(), PrintError> {
        let syntax = self.syntax();
        let b = self.module.block(block);
        let interval = self.module.interval(b.interval);
        let declared_width = match encoding {
            Some(DataType::Integer { width }) if syntax.data_directive(u64::from(width)).is_some() => {
                Some(u64::from(width))
            }
            _ => None,
        };

        let size = bytes.len() as u64;
        let mut cursor = 0;
        while cursor < size {
            if cursor > 0 {
                self.print_labels(out, state, addr + cursor)?;
            }

            let offset = b.offset + cursor;
            let symbolic = interval.symbolic_expressions.get(&offset).and_then(|expr| {
                let width = interval
                    .symbolic_expression_size(offset)
                    .or(declared_width)
                    .unwrap_or(match expr {
                        SymbolicExpression::AddrConst { .. } => 8,
                        SymbolicExpression::AddrAddr { .. } => 4,
                    });
                let directive = syntax
                    .data_directive(width)
                    .filter(|_| self.fits_field(interval, offset, addr + cursor, width, size - cursor));
                if directive.is_none() {
                    warn!(
                        "Symbolic expression at {:#x} does not fit in {} bytes, printing raw bytes",
                        addr + cursor,
                        width
                    );
                }
                directive.map(|d| (width, format!("{} {}", d, self.resolver.render(expr, true))))
            });

            let (width, item) = match symbolic {
                Some(item) => item,
                None => match declared_width
                    .filter(|_| !interval.symbolic_expressions.contains_key(&offset))
                    .filter(|w| self.fits_field(interval, offset, addr + cursor, *w, size - cursor))
                {
                    Some(width) => {
                        let value = bytes[cursor as usize..(cursor + width) as usize]
                            .iter()
                            .rev()
                            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
                        let directive = syntax.data_directive(width).unwrap_or(syntax.byte);
                        (width, format!("{} {}", directive, format_int(value as i64)))
                    }
                    None => (1, format!("{} {:#x}", syntax.byte, bytes[cursor as usize])),
                },
            };

            let mut line = format!("{}{}", syntax.tab, item);
            if let Some(comment) = self.comment_text(block, cursor, cursor + width) {
                line.push(' ');
                line.push_str(&comment);
            }
            writeln!(out, "{line}")?;
            cursor += width;
        }
        Ok(())
    }

    /// A field can be printed as one directive when it fits the rest of the block and
    /// no label or other symbolic expression starts inside it.
    fn fits_field(&self, interval: &ByteInterval, offset: u64, addr: u64, width: u64, remaining: u64) -> bool {
        width <= remaining
            && self.labels.range(addr + 1..addr + width).next().is_none()
            && interval.symbolic_expressions_in(offset + 1, width - 1).next().is_none()
    }
}
