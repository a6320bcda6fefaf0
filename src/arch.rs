//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates the operand
//! formatting rules of one ISA and assembler dialect. The printing engine stays
//! generic while the backends decide how registers, immediates and memory
//! operands are spelled.

use iced_x86::Register;

use crate::decode::{DecodedInstruction, IcedDecoder, MemoryOperand, MnemonicStyle, OperandKind};
use crate::error::PrintError;
use crate::syntax::Syntax;

pub mod x86_64;

pub use x86_64::{X86_64Att, X86_64Intel};

/// A trait representing a target architecture and dialect (e.g., x86_64 AT&T).
///
/// Backends are stateless: every formatter sees only the instruction and the
/// operand it is asked about.
pub trait Architecture {
    /// Directive tokens of the dialect.
    fn syntax(&self) -> &'static Syntax;

    /// Mnemonic spelling and operand order the decoder must produce for this dialect.
    fn mnemonic_style(&self) -> MnemonicStyle;

    /// Bare register name, e.g. `rax` or `st(1)`.
    fn register_name(&self, register: Register) -> String;

    /// A register operand.
    fn format_register(&self, insn: &DecodedInstruction, register: Register) -> String;

    /// An immediate or branch target operand. `symbolic`, when present, replaces the value.
    fn format_immediate(&self, insn: &DecodedInstruction, value: i64, symbolic: Option<&str>) -> String;

    /// A memory operand. `symbolic`, when present, replaces the displacement.
    fn format_indirect(&self, insn: &DecodedInstruction, memory: &MemoryOperand, symbolic: Option<&str>) -> String;

    /// Formats all operands of `insn`, comma separated, in decoder order.
    ///
    /// `symbolic[i]` is the rendered symbolic expression for operand `i`, if any.
    fn operand_list(&self, insn: &DecodedInstruction, symbolic: &[Option<String>]) -> Result<String, PrintError> {
        let mut operands = Vec::with_capacity(insn.operands.len());
        for (index, operand) in insn.operands.iter().enumerate() {
            let symbolic = symbolic.get(index).and_then(|s| s.as_deref());
            let text = match &operand.kind {
                OperandKind::Register(register) => self.format_register(insn, *register),
                OperandKind::Immediate(value) => self.format_immediate(insn, *value, symbolic),
                OperandKind::Memory(memory) => self.format_indirect(insn, memory, symbolic),
                OperandKind::Unsupported(kind) => {
                    return Err(PrintError::UnsupportedOperand {
                        address: insn.address,
                        mnemonic: insn.mnemonic.clone(),
                        index,
                        kind: kind.clone(),
                    })
                }
            };
            operands.push(text);
        }
        Ok(operands.join(","))
    }
}

/// The closed set of supported ISA and dialect combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    X86_64Att(X86_64Att),
    X86_64Intel(X86_64Intel),
}

impl Backend {
    pub fn att() -> Self {
        Backend::X86_64Att(X86_64Att)
    }

    pub fn intel() -> Self {
        Backend::X86_64Intel(X86_64Intel)
    }

    /// The decoder producing instructions in this backend's operand order.
    pub fn decoder(&self) -> IcedDecoder {
        IcedDecoder::new(self.mnemonic_style())
    }

    fn inner(&self) -> &dyn Architecture {
        match self {
            Backend::X86_64Att(arch) => arch,
            Backend::X86_64Intel(arch) => arch,
        }
    }
}

impl Architecture for Backend {
    fn syntax(&self) -> &'static Syntax {
        self.inner().syntax()
    }

    fn mnemonic_style(&self) -> MnemonicStyle {
        self.inner().mnemonic_style()
    }

    fn register_name(&self, register: Register) -> String {
        self.inner().register_name(register)
    }

    fn format_register(&self, insn: &DecodedInstruction, register: Register) -> String {
        self.inner().format_register(insn, register)
    }

    fn format_immediate(&self, insn: &DecodedInstruction, value: i64, symbolic: Option<&str>) -> String {
        self.inner().format_immediate(insn, value, symbolic)
    }

    fn format_indirect(&self, insn: &DecodedInstruction, memory: &MemoryOperand, symbolic: Option<&str>) -> String {
        self.inner().format_indirect(insn, memory, symbolic)
    }
}
