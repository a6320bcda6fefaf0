//! Utility functions.

/// Largest alignment in {16, 8, 4, 2} that `addr` satisfies, if any.
pub fn natural_alignment(addr: u64) -> Option<u64> {
    [16, 8, 4, 2].into_iter().find(|align| addr % align == 0)
}

/// Formats an integer the way assemblers print operands: small values in decimal,
/// everything else in hex with an explicit sign.
pub fn format_int(value: i64) -> String {
    if (-9..=9).contains(&value) {
        value.to_string()
    } else if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{:#x}", value)
    }
}

/// Formats an addend: `+N`, `-N`, or nothing for zero.
pub fn format_addend(value: i64) -> String {
    match value {
        0 => String::new(),
        v if v < 0 => format_int(v),
        v => format!("+{}", format_int(v)),
    }
}

/// Escapes one byte for use inside a double-quoted assembler string.
pub fn escape_byte(byte: u8) -> String {
    match byte {
        b'"' => "\\\"".to_string(),
        b'\\' => "\\\\".to_string(),
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        0x20..=0x7e => (byte as char).to_string(),
        _ => format!("\\{:03o}", byte),
    }
}
