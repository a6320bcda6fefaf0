//! Printing policy.

use std::collections::BTreeSet;

/// Sections and functions to leave out of the output.
///
/// Layout ignores the policy; only the printing engine reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintingPolicy {
    pub skip_sections: BTreeSet<String>,
    pub skip_functions: BTreeSet<String>,
    /// Sections holding arrays of code pointers (constructors, destructors).
    pub array_sections: BTreeSet<String>,
    /// Print addresses and keep skipped functions.
    pub debug: bool,
}

const ELF_SKIP_SECTIONS: &[&str] = &[
    ".comment",
    ".plt",
    ".init",
    ".fini",
    ".got",
    ".plt.got",
    ".got.plt",
    ".plt.sec",
    ".eh_frame_hdr",
];

const ELF_SKIP_FUNCTIONS: &[&str] = &[
    "_start",
    "deregister_tm_clones",
    "register_tm_clones",
    "__do_global_dtors_aux",
    "frame_dummy",
    "__libc_csu_fini",
    "__libc_csu_init",
    "_dl_relocate_static_pie",
];

const ELF_ARRAY_SECTIONS: &[&str] = &[".init_array", ".fini_array"];

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl PrintingPolicy {
    /// The policy for ELF executables: drops the sections and startup functions
    /// the toolchain regenerates when the output is reassembled and linked.
    pub fn elf_default() -> Self {
        Self {
            skip_sections: names(ELF_SKIP_SECTIONS),
            skip_functions: names(ELF_SKIP_FUNCTIONS),
            array_sections: names(ELF_ARRAY_SECTIONS),
            debug: false,
        }
    }

    pub fn skip_section(&mut self, name: &str) {
        self.skip_sections.insert(name.to_string());
    }

    pub fn keep_section(&mut self, name: &str) {
        self.skip_sections.remove(name);
    }

    pub fn skip_function(&mut self, name: &str) {
        self.skip_functions.insert(name.to_string());
    }

    pub fn keep_function(&mut self, name: &str) {
        self.skip_functions.remove(name);
    }

    pub fn is_section_skipped(&self, name: &str) -> bool {
        self.skip_sections.contains(name)
    }

    /// Skipped functions are still printed in debug mode.
    pub fn is_function_skipped(&self, name: &str) -> bool {
        !self.debug && self.skip_functions.contains(name)
    }

    pub fn is_array_section(&self, name: &str) -> bool {
        self.array_sections.contains(name)
    }
}
