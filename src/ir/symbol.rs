//! Symbols and symbolic expressions.
//!
//! A symbol either names a block (a referent symbol), carries only a raw address
//! (an integral symbol awaiting layout repair), or has neither (an external symbol
//! resolved by the assembler or linker).

use super::{BlockId, SymbolId};

/// What a symbol points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// No definition in this module.
    None,
    /// A raw address with no structural referent.
    Address(u64),
    /// A block of this module.
    Referent(BlockId),
}

/// A named symbol of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub payload: Payload,
}

impl Symbol {
    pub fn external(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: Payload::None,
        }
    }

    pub fn with_address(name: &str, address: u64) -> Self {
        Self {
            name: name.to_string(),
            payload: Payload::Address(address),
        }
    }

    pub fn with_referent(name: &str, block: BlockId) -> Self {
        Self {
            name: name.to_string(),
            payload: Payload::Referent(block),
        }
    }

    /// The referenced block, if any.
    pub fn referent(&self) -> Option<BlockId> {
        match self.payload {
            Payload::Referent(block) => Some(block),
            _ => None,
        }
    }

    /// Whether this symbol has an address but no referent.
    pub fn is_integral(&self) -> bool {
        matches!(self.payload, Payload::Address(_))
    }
}

/// A relocation-like reference attached at a byte interval offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicExpression {
    /// `symbol + offset`.
    AddrConst { symbol: SymbolId, offset: i64 },
    /// `(minuend - subtrahend) / scale + offset`.
    AddrAddr {
        minuend: SymbolId,
        subtrahend: SymbolId,
        scale: i64,
        offset: i64,
    },
}

impl SymbolicExpression {
    pub fn addr_const(symbol: SymbolId, offset: i64) -> Self {
        Self::AddrConst { symbol, offset }
    }

    pub fn difference(minuend: SymbolId, subtrahend: SymbolId) -> Self {
        Self::AddrAddr {
            minuend,
            subtrahend,
            scale: 1,
            offset: 0,
        }
    }

    /// Symbols referenced by this expression.
    pub fn symbols(&self) -> Vec<SymbolId> {
        match *self {
            Self::AddrConst { symbol, .. } => vec![symbol],
            Self::AddrAddr { minuend, subtrahend, .. } => vec![minuend, subtrahend],
        }
    }
}
