//! VT/ANSI escape-sequence state machine: the output-path filter from
//! section 4.8, Default/Esc1/Esc2CSI/Esc2Par0/Esc2Par1/Esc2Unknown.

extern crate alloc;

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Default,
    Esc1,
    Esc2Csi,
    Esc2Par0,
    Esc2Par1,
    Esc2Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelKind {
    Erase,
    WordErase,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDir {
    Up,
    Down,
}

/// One VT action, corresponding to section 4.7's `term_action` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermCommand {
    WriteChar(u8),
    Del(DelKind),
    Scroll(i32, ScrollDir),
    MoveCurAbs(Option<u16>, Option<u16>),
    MoveCurRel(i32, i32),
    Reset,
    EnableCursor(bool),
    UseAltBuffer(bool),
    NonBufScroll(i32, ScrollDir),
    EraseInDisplay(u8),
    EraseInLine(u8),
    SaveCursor,
    RestoreCursor,
    Sgr { fg: Option<u8>, bg: Option<u8>, bold: bool, reverse: bool, reset: bool },
    DeviceStatusReport,
}

/// Filter result for a single input byte: what character (if any) to
/// write through the default path, plus any extra action to run
/// synchronously alongside it (section 4.7, step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    WriteBlank,
    WriteC(u8),
    Consumed,
    Action(TermCommand),
}

const PARAM_BUF_CAP: usize = 16;

pub struct VtFilter {
    state: FilterState,
    params: Vec<i32>,
    cur_param: Option<i32>,
    private_mode: bool,
    alt_charset_active: bool,
}

impl VtFilter {
    pub fn new() -> Self {
        VtFilter {
            state: FilterState::Default,
            params: Vec::with_capacity(PARAM_BUF_CAP),
            cur_param: None,
            private_mode: false,
            alt_charset_active: false,
        }
    }

    pub fn reset(&mut self) {
        self.state = FilterState::Default;
        self.params.clear();
        self.cur_param = None;
        self.private_mode = false;
    }

    fn push_param_digit(&mut self, digit: u8) {
        let d = (digit - b'0') as i32;
        self.cur_param = Some(self.cur_param.unwrap_or(0) * 10 + d);
    }

    fn end_param(&mut self) {
        self.params.push(self.cur_param.take().unwrap_or(0));
    }

    fn param(&self, idx: usize, default: i32) -> i32 {
        match self.params.get(idx) {
            Some(&0) | None => default,
            Some(&v) => v,
        }
    }

    /// Feeds one byte of tty output through the filter, returning what the
    /// caller should do with it.
    pub fn feed(&mut self, byte: u8) -> FilterOutcome {
        match self.state {
            FilterState::Default => self.feed_default(byte),
            FilterState::Esc1 => self.feed_esc1(byte),
            FilterState::Esc2Csi => self.feed_csi(byte),
            FilterState::Esc2Par0 | FilterState::Esc2Par1 => {
                self.state = FilterState::Default;
                FilterOutcome::Consumed
            }
            FilterState::Esc2Unknown => {
                if (0x40..=0x5F).contains(&byte) {
                    self.state = FilterState::Default;
                }
                FilterOutcome::Consumed
            }
        }
    }

    fn feed_default(&mut self, byte: u8) -> FilterOutcome {
        match byte {
            0x1b => {
                self.state = FilterState::Esc1;
                FilterOutcome::Consumed
            }
            0x07 | 0x0c | 0x0b => FilterOutcome::Consumed, // BEL/FF/VT suppressed
            0x0e => {
                self.alt_charset_active = true;
                FilterOutcome::Consumed
            }
            0x0f => {
                self.alt_charset_active = false;
                FilterOutcome::Consumed
            }
            0x7f => FilterOutcome::Action(TermCommand::Del(DelKind::Erase)),
            0x17 => FilterOutcome::Action(TermCommand::Del(DelKind::WordErase)),
            0x15 => FilterOutcome::Action(TermCommand::Del(DelKind::Kill)),
            c => FilterOutcome::WriteC(c),
        }
    }

    fn feed_esc1(&mut self, byte: u8) -> FilterOutcome {
        match byte {
            b'[' => {
                self.params.clear();
                self.cur_param = None;
                self.private_mode = false;
                self.state = FilterState::Esc2Csi;
                FilterOutcome::Consumed
            }
            b'c' => {
                self.state = FilterState::Default;
                self.reset();
                FilterOutcome::Action(TermCommand::Reset)
            }
            b'(' => {
                self.state = FilterState::Esc2Par0;
                FilterOutcome::Consumed
            }
            b')' => {
                self.state = FilterState::Esc2Par1;
                FilterOutcome::Consumed
            }
            b'D' => {
                self.state = FilterState::Default;
                FilterOutcome::Action(TermCommand::MoveCurRel(1, 0))
            }
            b'M' => {
                self.state = FilterState::Default;
                FilterOutcome::Action(TermCommand::MoveCurRel(-1, 0))
            }
            _ => {
                self.state = FilterState::Esc2Unknown;
                FilterOutcome::Consumed
            }
        }
    }

    fn feed_csi(&mut self, byte: u8) -> FilterOutcome {
        match byte {
            b'?' => {
                self.private_mode = true;
                FilterOutcome::Consumed
            }
            b'0'..=b'9' => {
                self.push_param_digit(byte);
                FilterOutcome::Consumed
            }
            b';' => {
                self.end_param();
                FilterOutcome::Consumed
            }
            0x20..=0x2F => FilterOutcome::Consumed, // intermediate bytes, not modeled further
            0x40..=0x7E => {
                self.end_param();
                let cmd = self.dispatch_csi_final(byte);
                self.state = FilterState::Default;
                match cmd {
                    Some(c) => FilterOutcome::Action(c),
                    None => FilterOutcome::Consumed,
                }
            }
            _ => FilterOutcome::Consumed,
        }
    }

    fn dispatch_csi_final(&mut self, finalb: u8) -> Option<TermCommand> {
        let private = self.private_mode;
        let p0 = self.param(0, 1);

        let cmd = match finalb {
            b'A' => TermCommand::MoveCurRel(-p0, 0),
            b'B' => TermCommand::MoveCurRel(p0, 0),
            b'C' => TermCommand::MoveCurRel(0, p0),
            b'D' => TermCommand::MoveCurRel(0, -p0),
            b'E' => TermCommand::MoveCurAbs(Some(0), None),
            b'F' => TermCommand::MoveCurAbs(Some(0), None),
            b'G' => TermCommand::MoveCurAbs(None, Some((self.param(0, 1) - 1).max(0) as u16)),
            b'H' | b'f' => {
                let row = (self.param(0, 1) - 1).max(0) as u16;
                let col = (self.param(1, 1) - 1).max(0) as u16;
                TermCommand::MoveCurAbs(Some(row), Some(col))
            }
            b'J' => TermCommand::EraseInDisplay(self.param(0, 0) as u8),
            b'K' => TermCommand::EraseInLine(self.param(0, 0) as u8),
            b'S' => TermCommand::NonBufScroll(p0, ScrollDir::Up),
            b'T' => TermCommand::NonBufScroll(p0, ScrollDir::Down),
            b'm' => self.dispatch_sgr(),
            b'n' if self.param(0, 0) == 6 => TermCommand::DeviceStatusReport,
            b's' => TermCommand::SaveCursor,
            b'u' => TermCommand::RestoreCursor,
            b'd' => TermCommand::MoveCurAbs(Some((self.param(0, 1) - 1).max(0) as u16), None),
            b'`' => TermCommand::MoveCurAbs(None, Some((self.param(0, 1) - 1).max(0) as u16)),
            b'h' if private && self.param(0, 0) == 25 => TermCommand::EnableCursor(true),
            b'l' if private && self.param(0, 0) == 25 => TermCommand::EnableCursor(false),
            b'h' if private && self.param(0, 0) == 1049 => TermCommand::UseAltBuffer(true),
            b'l' if private && self.param(0, 0) == 1049 => TermCommand::UseAltBuffer(false),
            _ => return None,
        };

        Some(cmd)
    }

    fn dispatch_sgr(&self) -> TermCommand {
        if self.params.is_empty() || self.params.iter().all(|&p| p == 0) {
            return TermCommand::Sgr { fg: None, bg: None, bold: false, reverse: false, reset: true };
        }

        let mut fg = None;
        let mut bg = None;
        let mut bold = false;
        let mut reverse = false;

        for &p in &self.params {
            match p {
                1 => bold = true,
                7 => reverse = true,
                30..=37 => fg = Some((p - 30) as u8),
                40..=47 => bg = Some((p - 40) as u8),
                _ => {}
            }
        }

        TermCommand::Sgr { fg, bg, bold, reverse, reset: false }
    }
}

impl Default for VtFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(f: &mut VtFilter, s: &str) -> Vec<FilterOutcome> {
        s.bytes().map(|b| f.feed(b)).collect()
    }

    #[test_case]
    fn cursor_home_sequence_dispatches_move_abs() {
        let mut f = VtFilter::new();
        let outcomes = feed_str(&mut f, "\x1b[1;1H");
        assert_eq!(*outcomes.last().unwrap(), FilterOutcome::Action(TermCommand::MoveCurAbs(Some(0), Some(0))));
    }

    #[test_case]
    fn alt_buffer_private_mode_sequences() {
        let mut f = VtFilter::new();
        let enter = feed_str(&mut f, "\x1b[?1049h");
        assert_eq!(*enter.last().unwrap(), FilterOutcome::Action(TermCommand::UseAltBuffer(true)));

        let leave = feed_str(&mut f, "\x1b[?1049l");
        assert_eq!(*leave.last().unwrap(), FilterOutcome::Action(TermCommand::UseAltBuffer(false)));
    }

    #[test_case]
    fn plain_bytes_pass_through_as_write_c() {
        let mut f = VtFilter::new();
        assert_eq!(f.feed(b'h'), FilterOutcome::WriteC(b'h'));
    }

    #[test_case]
    fn sgr_reset_with_no_params() {
        let mut f = VtFilter::new();
        let outcomes = feed_str(&mut f, "\x1b[m");
        assert_eq!(
            *outcomes.last().unwrap(),
            FilterOutcome::Action(TermCommand::Sgr { fg: None, bg: None, bold: false, reverse: false, reset: true })
        );
    }
}
