//! Terminal emulated view of the supervised command's output.
//!
//! The output pumps write into a [`TerminalBuffer`] while the periodic and
//! final reports read snapshots of it from other tasks. Writes take the lock
//! exclusively and are applied before they return, so a snapshot always
//! reflects whole writes and never a partially processed chunk.

use std::io;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

/// Rows kept on the emulated screen. Output scrolled past this is gone.
pub const SCREEN_ROWS: u16 = 1024;
pub const SCREEN_COLS: u16 = 256;

pub struct TerminalBuffer {
    parser: RwLock<vt100::Parser>,
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::with_size(SCREEN_ROWS, SCREEN_COLS)
    }

    pub fn with_size(rows: u16, cols: u16) -> Self {
        Self {
            parser: RwLock::new(vt100::Parser::new(rows, cols, 0)),
        }
    }

    /// Feeds raw output bytes through the emulator.
    ///
    /// Pipes carry no TTY output processing, so a bare `\n` is expanded to
    /// `\r\n` the way a terminal line discipline would.
    pub fn write_bytes(&self, bytes: &[u8]) {
        let translated = translate_newlines(bytes);
        self.write_guard().process(&translated);
    }

    /// Plain text rendering of the screen with trailing blank space removed.
    pub fn snapshot(&self) -> String {
        let contents = self.read_guard().screen().contents();
        contents.trim_end().to_string()
    }

    // A panic while holding the lock leaves the emulator in a usable state,
    // so poisoning is ignored rather than propagated.
    fn write_guard(&self) -> RwLockWriteGuard<'_, vt100::Parser> {
        self.parser
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, vt100::Parser> {
        self.parser
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TerminalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (rows, cols) = self.read_guard().screen().size();
        f.debug_struct("TerminalBuffer")
            .field("rows", &rows)
            .field("cols", &cols)
            .finish()
    }
}

impl io::Write for &TerminalBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn translate_newlines(bytes: &[u8]) -> Vec<u8> {
    let extra = bytes.iter().filter(|b| **b == b'\n').count();
    let mut out = Vec::with_capacity(bytes.len() + extra);
    for byte in bytes {
        if *byte == b'\n' {
            out.push(b'\r');
        }
        out.push(*byte);
    }
    out
}
