use std::io;

use miette::{miette, Report, Severity};

// Image load errors

pub fn load_io(name: &str, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::io",
        help = "check that the path points to a readable file",
        "Failed to read image `{name}`: {e}",
    )
}

pub fn load_truncated(name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::truncated",
        help = "an image starts with a 16-bit big-endian load origin",
        "Image `{name}` is too short to contain a load origin",
    )
}

pub fn load_unaligned(name: &str, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::unaligned",
        help = "images are a sequence of 16-bit big-endian words",
        "Image `{name}` is not aligned to 16 bits ({len} bytes)",
    )
}

pub fn load_too_large(name: &str, origin: u16, words: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::too_large",
        help = "the address space ends at xFFFF",
        "Image `{name}` does not fit in memory: {words} words placed at x{origin:04X}",
    )
}

// Runtime faults

pub fn exec_reserved(name: &str, addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "exec::reserved",
        help = "RTI and the xD opcode slot are not available to user programs",
        "Executed reserved instruction {name} at x{addr:04X}",
    )
}

pub fn exec_unknown_trap(vect: u8, addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "exec::unknown_trap",
        help = "valid trap vectors are x20 through x25",
        "Unknown trap vector x{vect:02X} at x{addr:04X}",
    )
}

pub fn exec_unterminated(start: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "exec::unterminated",
        help = "PUTS and PUTSP expect a zero word after the string",
        "String starting at x{start:04X} has no terminator before the end of memory",
    )
}

pub fn input_failed(e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "exec::input",
        help = "GETC and IN block until a character is available",
        "Failed to read input: {e}",
    )
}

pub fn output_failed(e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "exec::output",
        "Failed to write output: {e}",
    )
}
