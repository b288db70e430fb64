use std::collections::VecDeque;
use std::io::{self, stdin, stdout, IsTerminal, Read, Write};

use console::Term;

/// Blocking character port between the machine and the outside world.
///
/// The TRAP routines are the only users. Keeping I/O behind this trait lets
/// tests run programs against in-memory streams.
pub trait Tty {
    /// Block until one byte of input is available.
    fn read_byte(&mut self) -> io::Result<u8>;
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
    fn write_str(&mut self, string: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Port connected to the process stdin/stdout.
pub struct Stdio;

impl Tty for Stdio {
    /// Read one byte from stdin or unbuffered terminal.
    fn read_byte(&mut self) -> io::Result<u8> {
        if stdin().is_terminal() {
            let cons = Term::stdout();
            let ch = cons.read_char()?;
            Ok(ch as u8)
        } else {
            let mut buf = [0; 1];
            stdin().read_exact(&mut buf)?;
            Ok(buf[0])
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        stdout().write_all(&[byte])
    }

    fn write_str(&mut self, string: &str) -> io::Result<()> {
        stdout().write_all(string.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        stdout().flush()
    }
}

/// In-memory port, for tests and embedding.
#[derive(Default)]
pub struct Buffered {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl Buffered {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: &[u8]) -> Self {
        Buffered {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Everything the machine has written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl Tty for Buffered {
    fn read_byte(&mut self) -> io::Result<u8> {
        self.input.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "input stream is exhausted")
        })
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn write_str(&mut self, string: &str) -> io::Result<()> {
        self.output.extend_from_slice(string.as_bytes());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
