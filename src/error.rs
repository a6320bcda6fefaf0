//! Error types.
//!
//! Structural problems that make the output untrustworthy abort the pass and are
//! reported through these enums. Localized degradations (unresolved integral
//! symbols, overlapping blocks) are logged and do not produce errors.

use thiserror::Error;

use crate::ir::BlockId;

/// The control-flow graph contradicts the byte interval structure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("fallthrough edge from block {block:?} into block {target:?} crosses sections")]
    CrossSectionFallthrough { block: BlockId, target: BlockId },

    #[error("fallthrough source block {block:?} ends at offset {end:#x} but its interval is {size:#x} bytes")]
    SourceNotAtIntervalEnd { block: BlockId, end: u64, size: u64 },

    #[error("fallthrough target block {block:?} starts at offset {offset:#x} instead of the interval start")]
    TargetNotAtIntervalStart { block: BlockId, offset: u64 },

    #[error("code block {block:?} has a fallthrough edge into a proxy block")]
    FallthroughIntoProxy { block: BlockId },
}

/// Failures that abort a print pass.
#[derive(Error, Debug)]
pub enum PrintError {
    #[error("cannot format operand {index} ({kind}) of `{mnemonic}` at {address:#x}")]
    UnsupportedOperand {
        address: u64,
        mnemonic: String,
        index: usize,
        kind: String,
    },

    #[error("failed to write assembly")]
    Io(#[from] std::io::Error),
}

/// Target registry lookups and registrations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    #[error("unsupported target {format}/{dialect}; available targets: {available}")]
    Unregistered {
        format: String,
        dialect: String,
        available: String,
    },

    #[error("target {format}/{dialect} is already registered")]
    Duplicate { format: String, dialect: String },

    #[error("no default syntax registered for format {0}")]
    NoDefaultDialect(String),
}
