//! Assembler syntax descriptors.
//!
//! A `Syntax` is a table of directive tokens and section names for one assembler
//! dialect, plus small naming helpers derived purely from those tokens.

/// Directive tokens and naming rules of one assembler dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    /// Short dialect name, e.g. "att".
    pub name: &'static str,
    /// First lines of every file, e.g. a syntax selection directive.
    pub header: &'static [&'static str],
    pub comment: &'static str,
    /// Indentation of instructions and data directives.
    pub tab: &'static str,

    pub text_section: &'static str,
    pub data_section: &'static str,
    pub bss_section: &'static str,

    pub text: &'static str,
    pub data: &'static str,
    pub bss: &'static str,
    pub section: &'static str,
    pub global: &'static str,
    pub symbol_type: &'static str,
    pub size: &'static str,
    pub align: &'static str,

    pub byte: &'static str,
    pub word: &'static str,
    pub long: &'static str,
    pub quad: &'static str,
    pub zero: &'static str,
    pub string: &'static str,
    pub ascii: &'static str,

    /// Prefix of register names, `%` in AT&T syntax.
    pub register_prefix: &'static str,
    /// Prefix of immediate operands, `$` in AT&T syntax.
    pub immediate_prefix: &'static str,
    /// Symbol names the assembler would read as operators or registers.
    pub reserved_names: &'static [&'static str],
}

const GNU_ELF: Syntax = Syntax {
    name: "att",
    header: &[],
    comment: "#",
    tab: "          ",
    text_section: ".text",
    data_section: ".data",
    bss_section: ".bss",
    text: ".text",
    data: ".data",
    bss: ".bss",
    section: ".section",
    global: ".globl",
    symbol_type: ".type",
    size: ".size",
    align: ".align",
    byte: ".byte",
    word: ".word",
    long: ".long",
    quad: ".quad",
    zero: ".zero",
    string: ".string",
    ascii: ".ascii",
    register_prefix: "%",
    immediate_prefix: "$",
    reserved_names: &[],
};

/// GNU assembler, ELF output, AT&T operand syntax.
pub static ELF_ATT: Syntax = GNU_ELF;

/// GNU assembler, ELF output, Intel operand syntax without register prefixes.
pub static ELF_INTEL: Syntax = Syntax {
    name: "intel",
    header: &[".intel_syntax noprefix"],
    register_prefix: "",
    immediate_prefix: "",
    reserved_names: &["FS", "MOD", "DIV", "NOT", "mod", "div", "not", "and", "or", "shl", "shr", "xor", "offset", "ptr"],
    ..GNU_ELF
};

impl Syntax {
    /// Prepares a symbol name for output: drops a symbol version suffix
    /// (`memcpy@GLIBC_2.14`) and renames names that clash with reserved words.
    pub fn format_symbol_name(&self, name: &str) -> String {
        let base = match name.find('@') {
            Some(at) if at > 0 => &name[..at],
            _ => name,
        };
        self.avoid_reg_name_conflicts(base)
    }

    pub fn avoid_reg_name_conflicts(&self, name: &str) -> String {
        if self.reserved_names.contains(&name) {
            format!("{name}_renamed")
        } else {
            name.to_string()
        }
    }

    /// Intel size keyword for an operand of `bits` bits; empty when unknown.
    pub fn size_name(&self, bits: u64) -> &'static str {
        match bits {
            8 => "BYTE",
            16 => "WORD",
            32 => "DWORD",
            64 => "QWORD",
            80 => "TBYTE",
            128 => "XMMWORD",
            256 => "YMMWORD",
            512 => "ZMMWORD",
            _ => "",
        }
    }

    /// AT&T mnemonic suffix for an operand of `bits` bits; empty when unknown.
    pub fn size_suffix(&self, bits: u64) -> &'static str {
        match bits {
            8 => "b",
            16 => "w",
            32 => "l",
            64 => "q",
            _ => "",
        }
    }

    /// Data directive for an element of `width` bytes.
    pub fn data_directive(&self, width: u64) -> Option<&'static str> {
        match width {
            1 => Some(self.byte),
            2 => Some(self.word),
            4 => Some(self.long),
            8 => Some(self.quad),
            _ => None,
        }
    }

    /// Section switch for the three standard sections, if `name` is one of them.
    pub fn standard_section_directive(&self, name: &str) -> Option<&'static str> {
        if name == self.text_section {
            Some(self.text)
        } else if name == self.data_section {
            Some(self.data)
        } else if name == self.bss_section {
            Some(self.bss)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_names() {
        assert_eq!(ELF_ATT.format_symbol_name("memcpy@GLIBC_2.14"), "memcpy");
        assert_eq!(ELF_ATT.format_symbol_name("@odd"), "@odd");
        assert_eq!(ELF_ATT.format_symbol_name("div"), "div");
        assert_eq!(ELF_INTEL.format_symbol_name("div"), "div_renamed");
    }

    #[test]
    fn sizes_and_directives() {
        assert_eq!(ELF_INTEL.size_name(64), "QWORD");
        assert_eq!(ELF_INTEL.size_name(0), "");
        assert_eq!(ELF_ATT.size_suffix(32), "l");
        assert_eq!(ELF_ATT.data_directive(8), Some(".quad"));
        assert_eq!(ELF_ATT.data_directive(3), None);
        assert_eq!(ELF_ATT.standard_section_directive(".bss"), Some(".bss"));
        assert_eq!(ELF_ATT.standard_section_directive(".rodata"), None);
    }

    #[test]
    fn intel_inherits_directives() {
        assert_eq!(ELF_INTEL.quad, ".quad");
        assert_eq!(ELF_INTEL.header, &[".intel_syntax noprefix"]);
        assert_eq!(ELF_INTEL.register_prefix, "");
    }
}
