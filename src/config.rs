//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the pretty printer using `clap`.
//! It handles parsing the input file, the target selection and the printing policy overrides.

use clap::Parser;
use std::path::PathBuf;

use crate::printer::PrintingPolicy;

/// Turns an x86-64 ELF file into reassemblable GNU assembler text.
///
/// Relocatable objects are laid out before printing; the output can be fed back to
/// `as` or `gcc -c`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input ELF file
    #[arg(required_unless_present = "list_targets")]
    pub input: Option<PathBuf>,

    /// Output file
    #[arg(short, long, help = "Path to the assembly output (stdout when absent)")]
    pub output: Option<PathBuf>,

    /// Binary format of the target
    #[arg(short = 'f', long, default_value = "elf")]
    pub format: String,

    /// Assembler dialect (defaults to the format's default dialect)
    #[arg(short = 's', long)]
    pub syntax: Option<String>,

    /// Functions to leave out, in addition to the target's defaults
    #[arg(short = 'n', long, value_delimiter = ',')]
    pub skip_functions: Vec<String>,

    /// Functions to print even if the target skips them by default
    #[arg(short = 'k', long, value_delimiter = ',')]
    pub keep_functions: Vec<String>,

    /// Sections to leave out, in addition to the target's defaults
    #[arg(long, value_delimiter = ',')]
    pub skip_sections: Vec<String>,

    /// Sections to print even if the target skips them by default
    #[arg(long, value_delimiter = ',')]
    pub keep_sections: Vec<String>,

    /// Print instruction addresses and keep skipped functions
    #[arg(long)]
    pub debug: bool,

    /// First address assigned when the input needs a layout (hex with 0x, or decimal)
    #[arg(long, value_parser = parse_address, default_value = "0")]
    pub base_address: u64,

    /// List the registered targets and exit
    #[arg(long)]
    pub list_targets: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Config {
    /// Applies the command-line overrides to a target's default policy.
    pub fn adjust_policy(&self, policy: &mut PrintingPolicy) {
        for name in &self.skip_functions {
            policy.skip_function(name);
        }
        for name in &self.keep_functions {
            policy.keep_function(name);
        }
        for name in &self.skip_sections {
            policy.skip_section(name);
        }
        for name in &self.keep_sections {
            policy.keep_section(name);
        }
        policy.debug |= self.debug;
    }
}

fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address {text:?}: {e}"))
}
