use object::SectionKind;

use reasm::arch::Backend;
use reasm::decode::{DecodedInstruction, Decoder, Operand, OperandKind};
use reasm::error::PrintError;
use reasm::ir::{BlockId, ByteInterval, CfiDirective, DataType, Module, Offset, Symbol, SymbolicExpression};
use reasm::layout::layout_module;
use reasm::printer::{PrettyPrinter, PrintingPolicy};
use reasm::registry::TargetRegistry;

fn print_with(module: &Module, backend: Backend, policy: PrintingPolicy) -> String {
    let mut out = Vec::new();
    PrettyPrinter::new(module, backend, policy).print(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn print(module: &Module) -> String {
    print_with(module, Backend::att(), PrintingPolicy::elf_default())
}

fn lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).collect()
}

/// Bytes reserved by the data directives in `text`.
fn emitted_bytes(text: &str) -> u64 {
    lines(text)
        .into_iter()
        .map(|l| match l.split_whitespace().collect::<Vec<_>>().as_slice() {
            [".byte", ..] => 1,
            [".word", ..] => 2,
            [".long", ..] => 4,
            [".quad", ..] => 8,
            [".zero", n, ..] => n.parse().unwrap(),
            _ => 0,
        })
        .sum()
}

/// `.text` at 0x1000 with functions `f` and `g`, one `ret` each.
fn two_functions(m: &mut Module) -> (reasm::ir::SymbolId, reasm::ir::SymbolId) {
    let text = m.add_section(".text", SectionKind::Text);
    let code = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0xc3, 0xc3]));
    let f = m.add_code_block(code, 0, 1);
    let g = m.add_code_block(code, 1, 1);
    (
        m.add_symbol(Symbol::with_referent("f", f)),
        m.add_symbol(Symbol::with_referent("g", g)),
    )
}

/// `.text` at 0x1000 holding `mov %rbx,%rax; ret` as function `main`.
fn main_module() -> (Module, BlockId) {
    let mut m = Module::new("main");
    let text = m.add_section(".text", SectionKind::Text);
    let bi = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0x48, 0x89, 0xd8, 0xc3]));
    let entry = m.add_code_block(bi, 0, 4);
    m.add_symbol(Symbol::with_referent("main", entry));
    m.tables.function_entries.insert(entry);
    (m, entry)
}

#[test]
fn function_header_and_footer() {
    let (m, _) = main_module();
    let text = print(&m);
    let lines = lines(&text);

    let begin = lines.iter().position(|l| *l == "# BEGIN - Function Header").unwrap();
    assert_eq!(
        &lines[begin..begin + 5],
        &[
            "# BEGIN - Function Header",
            ".align 16",
            ".globl main",
            ".type main, @function",
            "# END   - Function Header",
        ]
    );
    assert!(lines.contains(&"main:"));
    assert!(lines.iter().any(|l| l.ends_with("%rbx,%rax") && l.starts_with("mov")));
    assert!(lines.contains(&".size main, . - main"));
    assert!(lines.contains(&".text"));
    assert!(lines.contains(&"# end section .text"));
}

#[test]
fn skipped_functions_are_omitted_unless_debugging() {
    let (m, _) = main_module();
    let mut policy = PrintingPolicy::elf_default();
    policy.skip_function("main");
    let text = print_with(&m, Backend::att(), policy.clone());
    assert!(!text.contains("main:"));
    assert!(!text.contains(".globl main"));
    assert!(!text.contains("%rbx"));

    policy.debug = true;
    let text = print_with(&m, Backend::att(), policy);
    assert!(text.contains(".globl main"));
    assert!(text.contains("1000: mov"));
}

#[test]
fn unnamed_function_gets_a_synthesized_label() {
    let mut m = Module::new("two");
    let text = m.add_section(".text", SectionKind::Text);
    let bi = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0x48, 0x89, 0xd8, 0xc3]));
    let first = m.add_code_block(bi, 0, 3);
    let second = m.add_code_block(bi, 3, 1);
    m.add_symbol(Symbol::with_referent("main", first));
    m.tables.function_entries.insert(first);
    m.tables.function_entries.insert(second);

    let out = print(&m);
    let size = out.find(".size main, . - main").unwrap();
    let header = out.find(".type unknown_function_1003, @function").unwrap();
    assert!(size < header);
    assert!(out.contains("unknown_function_1003:"));
    assert!(!out.contains(".globl unknown_function_1003"));
}

#[test]
fn scenario_d_call_through_plt_forwarding() {
    let mut m = Module::new("plt");
    let plt = m.add_section(".plt", SectionKind::Text);
    let plt_bi = m.add_byte_interval(plt, ByteInterval::new(Some(0x1020), vec![0xff, 0x25, 0, 0, 0, 0]));
    let stub = m.add_code_block(plt_bi, 0, 6);
    let stub_sym = m.add_symbol(Symbol::with_referent("foo_stub", stub));
    let foo = m.add_symbol(Symbol::external("foo"));
    m.tables.symbol_forwarding.insert(stub_sym, foo);

    let text = m.add_section(".text", SectionKind::Text);
    let bi = m.add_byte_interval(text, ByteInterval::new(Some(0x1100), vec![0xe8, 0, 0, 0, 0, 0xc3]));
    m.add_code_block(bi, 0, 6);
    m.add_symbolic_expression(bi, 1, SymbolicExpression::addr_const(stub_sym, 0));

    let out = print(&m);
    let call = lines(&out)
        .into_iter()
        .find(|l| l.starts_with("call"))
        .expect("call instruction printed");
    assert!(call.ends_with(" foo@PLT"), "{call}");
    assert!(!out.contains("foo_stub"));
    assert!(!out.contains("0x1020"));
    // `.plt` itself is skipped by the ELF policy.
    assert!(!out.contains("# end section .plt"));
}

#[test]
fn scenario_e_zero_length_block_prints_nothing() {
    let build = |with_marker: bool| {
        let mut m = Module::new("zero");
        let data = m.add_section(".data", SectionKind::Data);
        let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![1, 2, 3, 4]));
        m.add_data_block(bi, 0, 2);
        if with_marker {
            m.add_data_block(bi, 2, 0);
        }
        m.add_data_block(bi, 2, 2);
        m
    };
    let with = print(&build(true));
    let without = print(&build(false));
    assert_eq!(with, without);
    assert!(!with.contains("WARNING"));
    assert_eq!(with.matches(".byte").count(), 4);
}

#[test]
fn overlapping_blocks_produce_a_warning() {
    let mut m = Module::new("overlap");
    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![7; 12]));
    m.add_data_block(bi, 0, 8);
    m.add_data_block(bi, 4, 8);

    let out = print(&m);
    assert!(out.contains("# WARNING: found overlapping blocks at address 0x2004"));
    assert_eq!(out.matches(".byte 0x7").count(), 8);
}

#[test]
fn bss_is_zero_filled_and_split_at_labels() {
    let mut m = Module::new("bss");
    let bss = m.add_section(".bss", SectionKind::UninitializedData);
    let bi = m.add_byte_interval(bss, ByteInterval::uninitialized(Some(0x3000), 16));
    let whole = m.add_data_block(bi, 0, 16);
    let mid = m.add_data_block(bi, 8, 0);
    m.add_symbol(Symbol::with_referent("buffer", whole));
    m.add_symbol(Symbol::with_referent("second_half", mid));

    let out = print(&m);
    let lines = lines(&out);
    let start = lines.iter().position(|l| *l == "buffer:").unwrap();
    assert_eq!(&lines[start..start + 4], &["buffer:", ".zero 8", "second_half:", ".zero 8"]);
    assert!(lines.contains(&".bss"));
}

#[test]
fn strings_and_declared_integers() {
    let mut m = Module::new("rodata");
    let rodata = m.add_section(".rodata", SectionKind::ReadOnlyData);
    let mut bytes = b"hi\"\n\0".to_vec();
    bytes.extend_from_slice(&[0x10, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    bytes.extend_from_slice(b"raw");
    let bi = m.add_byte_interval(rodata, ByteInterval::new(Some(0x4000), bytes));
    let string = m.add_data_block(bi, 0, 5);
    let ints = m.add_data_block(bi, 5, 8);
    let ascii = m.add_data_block(bi, 13, 3);
    m.tables.encodings.insert(string, DataType::String);
    m.tables.encodings.insert(ints, DataType::Integer { width: 4 });
    m.tables.encodings.insert(ascii, DataType::String);

    let out = print(&m);
    let lines = lines(&out);
    assert!(lines.contains(&".section .rodata ,\"a\",@progbits"));
    assert!(lines.contains(&".string \"hi\\\"\\n\""));
    assert!(lines.contains(&".long 0x10"));
    assert!(lines.contains(&".long 0xffffffff"));
    assert!(lines.contains(&".ascii \"raw\""));
}

#[test]
fn data_symbolic_expressions() {
    let mut m = Module::new("pointers");
    let (f_sym, g_sym) = two_functions(&mut m);
    let lost = m.add_symbol(Symbol::with_address("lost", 0xdead));

    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![0; 16]));
    m.add_data_block(bi, 0, 16);
    m.add_symbolic_expression(bi, 0, SymbolicExpression::addr_const(f_sym, 8));
    m.add_symbolic_expression(bi, 8, SymbolicExpression::difference(g_sym, f_sym));
    m.add_symbolic_expression(bi, 12, SymbolicExpression::addr_const(lost, 0));

    let out = print(&m);
    let lines = lines(&out);
    assert!(lines.contains(&".quad f+8"));
    assert!(lines.contains(&".long g-f"));
    // An eight byte pointer does not fit in the last four bytes.
    assert!(!out.contains("0xdead"));
    assert_eq!(lines.iter().filter(|l| l.starts_with(".byte")).count(), 4);
    assert_eq!(emitted_bytes(&out), 16);
}

#[test]
fn data_expressions_use_their_recorded_width() {
    let mut m = Module::new("widths");
    let (f_sym, g_sym) = two_functions(&mut m);

    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![0; 16]));
    let block = m.add_data_block(bi, 0, 16);
    m.tables.encodings.insert(block, DataType::Integer { width: 4 });
    m.add_symbolic_expression(bi, 4, SymbolicExpression::addr_const(f_sym, 0));
    m.set_symbolic_expression_size(bi, 4, 8);
    m.add_symbolic_expression(bi, 12, SymbolicExpression::addr_const(g_sym, 0));
    m.set_symbolic_expression_size(bi, 12, 4);

    let out = print(&m);
    let data_lines: Vec<&str> = lines(&out)
        .into_iter()
        .filter(|l| l.starts_with(".long") || l.starts_with(".quad"))
        .collect();
    assert_eq!(data_lines, vec![".long 0", ".quad f", ".long g"]);
    assert_eq!(emitted_bytes(&out), 16);
}

#[test]
fn data_expressions_never_cross_a_label() {
    let mut m = Module::new("tail");
    let (f_sym, _) = two_functions(&mut m);

    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![0; 16]));
    m.add_data_block(bi, 0, 12);
    let tail = m.add_data_block(bi, 12, 4);
    m.add_symbol(Symbol::with_referent("tail", tail));
    m.add_symbolic_expression(bi, 8, SymbolicExpression::addr_const(f_sym, 0));

    let out = print(&m);
    let lines = lines(&out);
    assert!(!lines.contains(&".quad f"));
    let label = lines.iter().position(|l| *l == "tail:").unwrap();
    assert_eq!(&lines[label - 4..label], &[".byte 0x0"; 4]);
    assert_eq!(emitted_bytes(&out), 16);
}

#[test]
fn comments_on_zero_filled_data() {
    let mut m = Module::new("zeros");
    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(Some(0x2000), vec![0; 8]));
    let block = m.add_data_block(bi, 0, 8);
    let half = m.add_data_block(bi, 4, 0);
    m.add_symbol(Symbol::with_referent("counter", block));
    m.add_symbol(Symbol::with_referent("upper", half));
    m.tables.comments.insert(Offset::new(block, 0), "zero-initialized".to_string());
    m.tables.comments.insert(Offset::new(block, 6), "high word".to_string());

    let out = print(&m);
    let lines = lines(&out);
    assert!(lines.contains(&".zero 4 # zero-initialized"), "{out}");
    assert!(lines.contains(&".zero 4 # +2: high word"), "{out}");
    assert_eq!(emitted_bytes(&out), 8);
}

#[test]
fn array_entries_pointing_into_skipped_code_are_dropped() {
    let mut m = Module::new("arrays");
    let text = m.add_section(".text", SectionKind::Text);
    let code = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0xc3, 0xc3]));
    let dummy = m.add_code_block(code, 0, 1);
    let ctor = m.add_code_block(code, 1, 1);
    let dummy_sym = m.add_symbol(Symbol::with_referent("frame_dummy", dummy));
    let ctor_sym = m.add_symbol(Symbol::with_referent("my_ctor", ctor));
    m.tables.function_entries.insert(dummy);
    m.tables.function_entries.insert(ctor);

    let init = m.add_section(".init_array", SectionKind::Data);
    let bi = m.add_byte_interval(init, ByteInterval::new(Some(0x3000), vec![0; 16]));
    m.add_data_block(bi, 0, 8);
    m.add_data_block(bi, 8, 8);
    m.add_symbolic_expression(bi, 0, SymbolicExpression::addr_const(dummy_sym, 0));
    m.add_symbolic_expression(bi, 8, SymbolicExpression::addr_const(ctor_sym, 0));

    let out = print(&m);
    assert!(out.contains(".quad my_ctor"));
    assert!(!out.contains("frame_dummy"));
    let lines = lines(&out);
    let header = lines.iter().position(|l| l.starts_with(".section .init_array")).unwrap();
    assert_eq!(lines[header + 1], ".align 8");
}

#[test]
fn ambiguous_names_print_address_labels() {
    let mut m = Module::new("dupes");
    let text = m.add_section(".text", SectionKind::Text);
    let bi = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0xe8, 0, 0, 0, 0, 0xc3]));
    let call = m.add_code_block(bi, 0, 5);
    let ret = m.add_code_block(bi, 5, 1);
    m.add_symbol(Symbol::with_referent("helper", call));
    let target = m.add_symbol(Symbol::with_referent("helper", ret));
    m.add_symbolic_expression(bi, 1, SymbolicExpression::addr_const(target, 0));

    let out = print(&m);
    assert!(lines(&out).contains(&".L_1005:"));
    assert!(lines(&out).contains(&".L_1000:"));
    assert!(out.contains(" .L_1005"));
    assert!(!out.contains("helper"));
}

#[test]
fn comments_cfi_and_invalid_bytes() {
    let mut m = Module::new("annotated");
    let text = m.add_section(".text", SectionKind::Text);
    let bi = m.add_byte_interval(text, ByteInterval::new(Some(0x1000), vec![0x55, 0x06, 0xc3]));
    let block = m.add_code_block(bi, 0, 3);
    m.tables.comments.insert(Offset::new(block, 0), "save frame".to_string());
    m.tables.cfi_directives.insert(
        Offset::new(block, 0),
        vec![CfiDirective {
            directive: ".cfi_startproc".to_string(),
            operands: vec![],
            symbol: None,
        }],
    );
    m.tables.cfi_directives.insert(
        Offset::new(block, 3),
        vec![CfiDirective {
            directive: ".cfi_endproc".to_string(),
            operands: vec![],
            symbol: None,
        }],
    );
    m.tables.cfi_directives.insert(
        Offset::new(block, 1),
        vec![CfiDirective {
            directive: ".cfi_def_cfa_offset".to_string(),
            operands: vec![16],
            symbol: None,
        }],
    );
    let eh = m.add_section(".eh_frame", SectionKind::ReadOnlyData);
    let eh_bi = m.add_byte_interval(eh, ByteInterval::new(Some(0x2000), vec![1; 4]));
    m.add_data_block(eh_bi, 0, 4);

    let out = print(&m);
    let lines = lines(&out);
    let start = lines.iter().position(|l| *l == ".cfi_startproc").unwrap();
    assert!(lines[start + 1].starts_with("push"));
    assert!(lines[start + 1].ends_with("# save frame"));
    assert_eq!(lines[start + 2], ".cfi_def_cfa_offset 16");
    assert_eq!(lines[start + 3], ".byte 0x6 # invalid instruction");
    assert!(lines[start + 4].starts_with("ret"));
    assert_eq!(lines[start + 5], ".cfi_endproc");
    assert!(!out.contains(".eh_frame"));
}

#[test]
fn intel_dialect() {
    let (m, _) = main_module();
    let out = print_with(&m, Backend::intel(), PrintingPolicy::elf_default());
    let lines = lines(&out);
    assert_eq!(lines[0], ".intel_syntax noprefix");
    assert!(lines.contains(&"mov RAX,RBX"));
}

#[test]
fn printing_is_deterministic() {
    let (mut m, _) = main_module();
    let data = m.add_section(".data", SectionKind::Data);
    let bi = m.add_byte_interval(data, ByteInterval::new(None, vec![1, 0, 0, 0]));
    m.add_data_block(bi, 0, 4);
    m.interval_mut(bi).address = Some(0x2000);

    let registry = TargetRegistry::with_builtin_targets();
    let render = || {
        let mut out = Vec::new();
        registry.create(&m, "elf", "att").unwrap().print(&mut out).unwrap();
        out
    };
    assert_eq!(render(), render());
}

#[test]
fn laid_out_object_prints_sections_in_order() {
    let mut m = Module::new("object");
    let data = m.add_section(".data", SectionKind::Data);
    let text = m.add_section(".text", SectionKind::Text);
    let d = m.add_byte_interval(data, ByteInterval::new(None, vec![5; 2]));
    let t = m.add_byte_interval(text, ByteInterval::new(None, vec![0xc3]));
    m.add_data_block(d, 0, 2);
    m.add_code_block(t, 0, 1);
    layout_module(&mut m).unwrap();

    let out = print(&m);
    let data_at = out.find(".data").unwrap();
    let text_at = out.find(".text").unwrap();
    assert!(data_at < text_at);
}

struct FarJump;

impl Decoder for FarJump {
    fn decode(&self, bytes: &[u8], address: u64) -> Vec<DecodedInstruction> {
        vec![DecodedInstruction {
            address,
            len: bytes.len(),
            mnemonic: "ljmp".to_string(),
            operands: vec![Operand::new(OperandKind::Unsupported("FarBranch32".to_string()), None)],
            is_call: false,
            is_jump: true,
            invalid: false,
        }]
    }
}

#[test]
fn unsupported_operand_aborts_the_pass() {
    let (m, _) = main_module();
    let printer = PrettyPrinter::new(&m, Backend::att(), PrintingPolicy::elf_default()).with_decoder(Box::new(FarJump));
    let mut out = Vec::new();
    let err = printer.print(&mut out).unwrap_err();
    assert!(matches!(
        err,
        PrintError::UnsupportedOperand { address: 0x1000, index: 0, .. }
    ));
}
