//! Reassemblable assembly printer.
//!
//! This library turns a symbolic intermediate representation of a disassembled
//! binary into GNU assembler text. It is organized into several modules:
//! - `ir`: The symbolic table model (sections, byte intervals, blocks, symbols).
//! - `layout`: Address assignment and repair of the block and symbol graph.
//! - `printer`: The printing engine and its policy.
//! - `arch`: Architecture and dialect specific operand formatting.
//! - `syntax`: Directive tables of the supported assembler dialects.
//! - `decode`: The instruction decoder seam.
//! - `registry`: Lookup of printers by format and dialect.
//! - `loader`: Building a module from an ELF file.
//! - `config`: CLI configuration.

pub mod arch;
pub mod config;
pub mod decode;
pub mod error;
pub mod ir;
pub mod layout;
pub mod loader;
pub mod printer;
pub mod registry;
pub mod syntax;
pub mod utils;
