//! Instruction decoding.
//!
//! The printer never looks at raw instruction bytes itself; it asks a `Decoder`
//! for a list of instructions with their operands and the byte offset of each
//! operand's encoded constant, which is where symbolic expressions are attached.

use iced_x86::{
    ConstantOffsets, Decoder as IcedInner, DecoderOptions, FlowControl, Formatter, GasFormatter, Instruction,
    IntelFormatter, OpKind, Register,
};

/// A memory operand, `segment:displacement(base, index, scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand {
    /// Explicit segment override, if any.
    pub segment: Option<Register>,
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: u32,
    /// Signed displacement. For RIP-relative operands this is relative to the next instruction.
    pub displacement: i64,
    /// Operand size in bytes, 0 when the instruction does not imply one.
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    Register(Register),
    /// Immediates and resolved branch targets.
    Immediate(i64),
    Memory(MemoryOperand),
    /// An operand shape the backends cannot print; carries a description.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    /// Offset of the operand's constant (immediate, branch displacement or memory
    /// displacement) from the start of the instruction.
    pub encoding_offset: Option<usize>,
}

impl Operand {
    pub fn new(kind: OperandKind, encoding_offset: Option<usize>) -> Self {
        Self { kind, encoding_offset }
    }
}

/// One decoded instruction. Operands are in the order the target dialect prints them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u64,
    pub len: usize,
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub is_call: bool,
    pub is_jump: bool,
    /// The bytes at `address` do not form a valid instruction; `len` is 1.
    pub invalid: bool,
}

impl DecodedInstruction {
    /// A placeholder for one undecodable byte.
    pub fn invalid(address: u64) -> Self {
        Self {
            address,
            len: 1,
            mnemonic: String::new(),
            operands: Vec::new(),
            is_call: false,
            is_jump: false,
            invalid: true,
        }
    }
}

/// Turns the bytes of a code block into instructions.
pub trait Decoder {
    /// Decodes `bytes` as if loaded at `address`. The lengths of the returned
    /// instructions always sum to `bytes.len()`.
    fn decode(&self, bytes: &[u8], address: u64) -> Vec<DecodedInstruction>;
}

/// Mnemonic spelling and operand order of the decoded instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicStyle {
    /// AT&T: size suffixes, source operand first.
    Gas,
    /// Intel: destination operand first.
    Intel,
}

/// x86-64 decoder backed by iced-x86.
#[derive(Debug, Clone, Copy)]
pub struct IcedDecoder {
    style: MnemonicStyle,
}

impl IcedDecoder {
    pub fn new(style: MnemonicStyle) -> Self {
        Self { style }
    }

    fn mnemonic(&self, instruction: &Instruction) -> String {
        let mut out = String::new();
        match self.style {
            MnemonicStyle::Gas => {
                let mut formatter = GasFormatter::new();
                formatter.options_mut().set_gas_show_mnemonic_size_suffix(true);
                formatter.format_mnemonic(instruction, &mut out);
            }
            MnemonicStyle::Intel => {
                let mut formatter = IntelFormatter::new();
                formatter.format_mnemonic(instruction, &mut out);
            }
        }
        out
    }

    fn convert(&self, instruction: &Instruction, offsets: &ConstantOffsets) -> DecodedInstruction {
        let mut immediates = Vec::new();
        if offsets.has_immediate() {
            immediates.push(offsets.immediate_offset());
        }
        if offsets.has_immediate2() {
            immediates.push(offsets.immediate_offset2());
        }
        let mut immediates = immediates.into_iter();

        let mut operands: Vec<Operand> = (0..instruction.op_count())
            .map(|i| {
                let kind = instruction.op_kind(i);
                match kind {
                    OpKind::Register => Operand::new(OperandKind::Register(instruction.op_register(i)), None),
                    OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => Operand::new(
                        OperandKind::Immediate(instruction.near_branch_target() as i64),
                        immediates.next(),
                    ),
                    OpKind::Immediate8
                    | OpKind::Immediate8_2nd
                    | OpKind::Immediate16
                    | OpKind::Immediate32
                    | OpKind::Immediate64
                    | OpKind::Immediate8to16
                    | OpKind::Immediate8to32
                    | OpKind::Immediate8to64
                    | OpKind::Immediate32to64 => {
                        Operand::new(OperandKind::Immediate(instruction.immediate(i) as i64), immediates.next())
                    }
                    OpKind::Memory => {
                        let displacement = offsets.has_displacement().then(|| offsets.displacement_offset());
                        Operand::new(OperandKind::Memory(memory_operand(instruction)), displacement)
                    }
                    other => Operand::new(OperandKind::Unsupported(format!("{other:?}")), None),
                }
            })
            .collect();

        if self.style == MnemonicStyle::Gas {
            operands.reverse();
        }

        let flow = instruction.flow_control();
        DecodedInstruction {
            address: instruction.ip(),
            len: instruction.len(),
            mnemonic: self.mnemonic(instruction),
            operands,
            is_call: matches!(flow, FlowControl::Call | FlowControl::IndirectCall),
            is_jump: matches!(
                flow,
                FlowControl::UnconditionalBranch | FlowControl::ConditionalBranch | FlowControl::IndirectBranch
            ),
            invalid: false,
        }
    }
}

fn some_register(register: Register) -> Option<Register> {
    (register != Register::None).then_some(register)
}

fn memory_operand(instruction: &Instruction) -> MemoryOperand {
    let base = some_register(instruction.memory_base());
    let displacement = if base == Some(Register::RIP) || base == Some(Register::EIP) {
        instruction.memory_displacement64().wrapping_sub(instruction.next_ip()) as i64
    } else {
        instruction.memory_displacement64() as i64
    };
    MemoryOperand {
        segment: some_register(instruction.segment_prefix()),
        base,
        index: some_register(instruction.memory_index()),
        scale: instruction.memory_index_scale(),
        displacement,
        size: instruction.memory_size().size(),
    }
}

impl Decoder for IcedDecoder {
    fn decode(&self, bytes: &[u8], address: u64) -> Vec<DecodedInstruction> {
        let mut decoder = IcedInner::with_ip(64, bytes, address, DecoderOptions::NONE);
        let mut instruction = Instruction::default();
        let mut decoded = Vec::new();
        while decoder.can_decode() {
            let position = decoder.position();
            decoder.decode_out(&mut instruction);
            if instruction.is_invalid() {
                // Resynchronize one byte further on.
                let at = address + position as u64;
                decoded.push(DecodedInstruction::invalid(at));
                let next = position + 1;
                if next >= bytes.len() {
                    break;
                }
                if decoder.set_position(next).is_err() {
                    break;
                }
                decoder.set_ip(address + next as u64);
                continue;
            }
            let offsets = decoder.get_constant_offsets(&instruction);
            decoded.push(self.convert(&instruction, &offsets));
        }
        decoded
    }
}
