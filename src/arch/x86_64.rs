//! x86_64 Architecture backends.
//!
//! Implements the `Architecture` trait for 64-bit x86 in the two GNU assembler
//! dialects: AT&T and Intel (`.intel_syntax noprefix`).

use iced_x86::Register;

use super::Architecture;
use crate::decode::{DecodedInstruction, MemoryOperand, MnemonicStyle};
use crate::syntax::{Syntax, ELF_ATT, ELF_INTEL};
use crate::utils::{format_addend, format_int};

/// Register name as the GNU assembler spells it, lowercase.
fn gas_register_name(register: Register) -> String {
    let name = format!("{register:?}").to_lowercase();
    // x87 stack registers: st0 -> st(0)
    match name.strip_prefix("st") {
        Some(index) if index.len() == 1 && index.as_bytes()[0].is_ascii_digit() => format!("st({index})"),
        _ => name,
    }
}

fn is_branch(insn: &DecodedInstruction) -> bool {
    insn.is_call || insn.is_jump
}

/// The x86_64 backend, AT&T syntax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86_64Att;

impl Architecture for X86_64Att {
    fn syntax(&self) -> &'static Syntax {
        &ELF_ATT
    }

    fn mnemonic_style(&self) -> MnemonicStyle {
        MnemonicStyle::Gas
    }

    fn register_name(&self, register: Register) -> String {
        gas_register_name(register)
    }

    fn format_register(&self, insn: &DecodedInstruction, register: Register) -> String {
        let star = if is_branch(insn) { "*" } else { "" };
        format!("{star}{}{}", self.syntax().register_prefix, self.register_name(register))
    }

    fn format_immediate(&self, insn: &DecodedInstruction, value: i64, symbolic: Option<&str>) -> String {
        let prefix = if is_branch(insn) { "" } else { self.syntax().immediate_prefix };
        match symbolic {
            Some(symbolic) => format!("{prefix}{symbolic}"),
            None if is_branch(insn) => format!("{:#x}", value as u64),
            None => format!("{prefix}{}", format_int(value)),
        }
    }

    fn format_indirect(&self, insn: &DecodedInstruction, memory: &MemoryOperand, symbolic: Option<&str>) -> String {
        let prefix = self.syntax().register_prefix;
        let mut out = String::new();
        if is_branch(insn) {
            out.push('*');
        }
        if let Some(segment) = memory.segment {
            out.push_str(&format!("{prefix}{}:", self.register_name(segment)));
        }

        let has_registers = memory.base.is_some() || memory.index.is_some();
        match symbolic {
            Some(symbolic) => out.push_str(symbolic),
            None if !has_registers && memory.segment.is_none() => {
                out.push_str(&format!("{:#x}", memory.displacement as u64))
            }
            None if !has_registers => out.push_str(&format_int(memory.displacement)),
            None if memory.displacement != 0 => out.push_str(&format_int(memory.displacement)),
            None => {}
        }

        if has_registers {
            out.push('(');
            if let Some(base) = memory.base {
                out.push_str(&format!("{prefix}{}", self.register_name(base)));
            }
            if let Some(index) = memory.index {
                out.push_str(&format!(",{prefix}{},{}", self.register_name(index), memory.scale));
            }
            out.push(')');
        }
        out
    }
}

/// The x86_64 backend, Intel syntax without register prefixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86_64Intel;

impl Architecture for X86_64Intel {
    fn syntax(&self) -> &'static Syntax {
        &ELF_INTEL
    }

    fn mnemonic_style(&self) -> MnemonicStyle {
        MnemonicStyle::Intel
    }

    fn register_name(&self, register: Register) -> String {
        gas_register_name(register).to_uppercase()
    }

    fn format_register(&self, _insn: &DecodedInstruction, register: Register) -> String {
        self.register_name(register)
    }

    fn format_immediate(&self, insn: &DecodedInstruction, value: i64, symbolic: Option<&str>) -> String {
        match symbolic {
            Some(symbolic) if is_branch(insn) => symbolic.to_string(),
            Some(symbolic) => format!("OFFSET {symbolic}"),
            None if is_branch(insn) => format!("{:#x}", value as u64),
            None => format_int(value),
        }
    }

    fn format_indirect(&self, _insn: &DecodedInstruction, memory: &MemoryOperand, symbolic: Option<&str>) -> String {
        let mut out = String::new();
        let size = self.syntax().size_name(memory.size as u64 * 8);
        if !size.is_empty() {
            out.push_str(size);
            out.push_str(" PTR ");
        }
        if let Some(segment) = memory.segment {
            out.push_str(&self.register_name(segment));
            out.push(':');
        }

        let mut terms = Vec::new();
        if let Some(base) = memory.base {
            terms.push(self.register_name(base));
        }
        if let Some(index) = memory.index {
            terms.push(format!("{}*{}", self.register_name(index), memory.scale));
        }
        let mut inner = terms.join("+");
        match symbolic {
            Some(symbolic) if inner.is_empty() => inner.push_str(symbolic),
            Some(symbolic) => {
                inner.push('+');
                inner.push_str(symbolic);
            }
            None if inner.is_empty() => inner.push_str(&format!("{:#x}", memory.displacement as u64)),
            None => inner.push_str(&format_addend(memory.displacement)),
        }
        out.push('[');
        out.push_str(&inner);
        out.push(']');
        out
    }
}
