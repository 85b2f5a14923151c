//! Input-path line discipline (C8): per-keypress canonical/raw handling,
//! the special-control dispatch table driven by `Termios::c_cc`, and the
//! read-path ring buffer consumed by `sys_read`.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::config::TTY_INPUT_BUF_SIZE;
use crate::tty::termios::{Termios, CC, LFlags};

/// One open terminal's input state. Output (the VT filter + grid) lives in
/// `term::Terminal`; a real `/dev/tty*` pairs one of each.
pub struct Tty {
    termios: Termios,
    ring: VecDeque<u8>,
    line_buf: Vec<u8>,
    echo_out: Vec<u8>,
}

impl Tty {
    pub fn new() -> Self {
        Tty {
            termios: Termios::canonical_default(),
            ring: VecDeque::with_capacity(TTY_INPUT_BUF_SIZE),
            line_buf: Vec::new(),
            echo_out: Vec::new(),
        }
    }

    pub fn termios(&self) -> &Termios {
        &self.termios
    }

    /// `TCSETS`.
    pub fn set_termios(&mut self, t: Termios) {
        self.termios = t;
    }

    fn canonical(&self) -> bool {
        self.termios.c_lflag.contains(LFlags::ICANON)
    }

    fn echo(&mut self, bytes: &[u8]) {
        if self.termios.c_lflag.contains(LFlags::ECHO) {
            self.echo_out.extend_from_slice(bytes);
        }
    }

    fn push_ring(&mut self, byte: u8) {
        if self.ring.len() < TTY_INPUT_BUF_SIZE {
            self.ring.push_back(byte);
        }
    }

    fn flush_line(&mut self, with_newline: bool) {
        let line = core::mem::take(&mut self.line_buf);
        for b in line {
            self.push_ring(b);
        }
        if with_newline {
            self.push_ring(b'\n');
        }
    }

    fn erase_one(&mut self) {
        if let Some(_removed) = self.line_buf.pop() {
            if self.termios.c_lflag.contains(LFlags::ECHOE) {
                self.echo(&[0x08, b' ', 0x08]);
            }
        }
    }

    fn kill_line(&mut self) {
        let n = self.line_buf.len();
        self.line_buf.clear();
        if self.termios.c_lflag.contains(LFlags::ECHOK) {
            for _ in 0..n {
                self.echo(&[0x08, b' ', 0x08]);
            }
        }
    }

    fn werase(&mut self) {
        while matches!(self.line_buf.last(), Some(b' ')) {
            self.erase_one();
        }
        while !matches!(self.line_buf.last(), None | Some(b' ')) {
            self.erase_one();
        }
    }

    /// Feeds one keypress byte through the discipline. Returns whether a
    /// blocked reader should now be woken (mirrors the worker-thread
    /// framework's decoupled "caller performs the wakeup" convention).
    pub fn handle_key(&mut self, byte: u8) -> bool {
        if !self.canonical() {
            self.push_ring(byte);
            self.echo(&[byte]);
            return true;
        }

        let cc = self.termios.c_cc;
        if byte == cc[CC::VErase as usize] {
            self.erase_one();
            return false;
        }
        if byte == cc[CC::VKill as usize] {
            self.kill_line();
            return false;
        }
        if byte == cc[CC::VWerase as usize] {
            self.werase();
            return false;
        }
        if byte == cc[CC::VEof as usize] {
            let had_data = !self.line_buf.is_empty();
            self.flush_line(false);
            return had_data || true; // EOF always wakes a blocked reader
        }
        if byte == b'\n' || byte == cc[CC::VEol as usize] {
            self.line_buf.push(byte);
            self.echo(&[byte]);
            self.flush_line(false);
            return true;
        }

        self.line_buf.push(byte);
        self.echo(&[byte]);
        false
    }

    /// Drains and returns anything queued for echo back to the output
    /// path; the caller pushes this into the paired `Terminal`.
    pub fn take_echo(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.echo_out)
    }

    pub fn has_data(&self) -> bool {
        !self.ring.is_empty()
    }

    /// `sys_read` over this tty: FIFO-drains up to `buf.len()` bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.ring.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

impl Default for Tty {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn canonical_mode_buffers_until_newline() {
        let mut tty = Tty::new();
        for &b in b"hi" {
            assert!(!tty.handle_key(b));
        }
        assert!(!tty.has_data());
        assert!(tty.handle_key(b'\n'));

        let mut buf = [0u8; 8];
        let n = tty.read(&mut buf);
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[test_case]
    fn erase_removes_last_char_with_echoe() {
        let mut tty = Tty::new();
        tty.handle_key(b'h');
        tty.handle_key(b'i');
        tty.handle_key(0x7f); // VErase
        tty.handle_key(b'\n');

        let mut buf = [0u8; 8];
        let n = tty.read(&mut buf);
        assert_eq!(&buf[..n], b"h\n");
        assert!(tty.take_echo().windows(3).any(|w| w == [0x08, b' ', 0x08]));
    }

    #[test_case]
    fn eof_flushes_partial_line_without_trailing_newline() {
        let mut tty = Tty::new();
        tty.handle_key(b'h');
        tty.handle_key(b'i');
        assert!(tty.handle_key(0x04)); // VEOF

        let mut buf = [0u8; 8];
        let n = tty.read(&mut buf);
        assert_eq!(&buf[..n], b"hi");
    }

    #[test_case]
    fn raw_mode_passes_bytes_through_immediately() {
        let mut tty = Tty::new();
        tty.set_termios(Termios::raw());
        assert!(tty.handle_key(b'x'));
        let mut buf = [0u8; 1];
        assert_eq!(tty.read(&mut buf), 1);
        assert_eq!(buf[0], b'x');
    }
}
