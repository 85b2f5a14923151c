//! Terminal engine (C7): a scrollback grid, a video backend vtable, and a
//! single-drainer action queue that lets multiple ttys write concurrently
//! without holding the video lock across a full repaint.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use crate::config::{TERM_DEFAULT_COLS, TERM_DEFAULT_ROWS, TERM_SCROLL_LINES_FACTOR};
use crate::tty::vt::{DelKind, ScrollDir, TermCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: u8,
    pub fg: u8,
    pub bg: u8,
}

impl Cell {
    pub const BLANK: Cell = Cell { ch: b' ', fg: 7, bg: 0 };
}

/// Backend abstraction over the actual display device, so `Terminal` never
/// touches port I/O or a framebuffer directly (kept symmetrical with the
/// inherited `vga_buffer::Writer`, which becomes one implementor of this).
pub trait VideoInterface {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn draw_cell(&mut self, row: usize, col: usize, cell: Cell);
    fn set_cursor(&mut self, row: usize, col: usize);
    fn show_cursor(&mut self, visible: bool);
}

/// A backend that drops every draw; used when no real device is attached
/// yet, or inside tests.
pub struct NullVideo {
    rows: usize,
    cols: usize,
}

impl NullVideo {
    pub fn new(rows: usize, cols: usize) -> Self {
        NullVideo { rows, cols }
    }
}

impl VideoInterface for NullVideo {
    fn rows(&self) -> usize {
        self.rows
    }
    fn cols(&self) -> usize {
        self.cols
    }
    fn draw_cell(&mut self, _row: usize, _col: usize, _cell: Cell) {}
    fn set_cursor(&mut self, _row: usize, _col: usize) {}
    fn show_cursor(&mut self, _visible: bool) {}
}

struct Grid {
    rows: usize,
    cols: usize,
    /// Scrollback-capable buffer: `rows * TERM_SCROLL_LINES_FACTOR` lines,
    /// with `top` tracking the first visible row.
    lines: Vec<Vec<Cell>>,
    top: usize,
    cur_row: usize,
    cur_col: usize,
    cur_fg: u8,
    cur_bg: u8,
}

impl Grid {
    fn new(rows: usize, cols: usize) -> Self {
        let total_lines = rows * TERM_SCROLL_LINES_FACTOR;
        Grid {
            rows,
            cols,
            lines: vec![vec![Cell::BLANK; cols]; total_lines],
            top: 0,
            cur_row: 0,
            cur_col: 0,
            cur_fg: 7,
            cur_bg: 0,
        }
    }

    fn visible_row(&self, row: usize) -> usize {
        (self.top + row) % self.lines.len()
    }

    fn line_feed(&mut self) {
        if self.cur_row + 1 >= self.rows {
            let total = self.lines.len();
            let dead = (self.top + self.rows) % total;
            self.lines[dead] = vec![Cell::BLANK; self.cols];
            self.top = (self.top + 1) % total;
        } else {
            self.cur_row += 1;
        }
    }

    fn put(&mut self, ch: u8) {
        if self.cur_col >= self.cols {
            self.cur_col = 0;
            self.line_feed();
        }
        let row = self.visible_row(self.cur_row);
        self.lines[row][self.cur_col] = Cell { ch, fg: self.cur_fg, bg: self.cur_bg };
        self.cur_col += 1;
    }

    fn erase_in_line(&mut self, mode: u8) {
        let row = self.visible_row(self.cur_row);
        let (start, end) = match mode {
            0 => (self.cur_col, self.cols),
            1 => (0, self.cur_col + 1),
            _ => (0, self.cols),
        };
        for c in start..end.min(self.cols) {
            self.lines[row][c] = Cell::BLANK;
        }
    }

    fn erase_in_display(&mut self, mode: u8) {
        let rows_range: Vec<usize> = match mode {
            0 => (self.cur_row..self.rows).collect(),
            1 => (0..=self.cur_row).collect(),
            _ => (0..self.rows).collect(),
        };
        for r in rows_range {
            let row = self.visible_row(r);
            self.lines[row] = vec![Cell::BLANK; self.cols];
        }
    }
}

/// A terminal's pending output, funneled through a queue so only one task
/// at a time ever touches the grid/video backend ("elide locks, single
/// drainer": producers push and return immediately, a drain loop owns the
/// mutation).
pub struct Terminal<V: VideoInterface> {
    grid: Grid,
    alt_grid: Option<Grid>,
    queue: Mutex<VecDeque<u8>>,
    video: V,
    cursor_visible: bool,
    saved_cursor: Option<(usize, usize)>,
}

impl<V: VideoInterface> Terminal<V> {
    pub fn new(video: V) -> Self {
        let rows = video.rows().max(1);
        let cols = video.cols().max(1);
        Terminal {
            grid: Grid::new(rows, cols),
            alt_grid: None,
            queue: Mutex::new(VecDeque::new()),
            video,
            cursor_visible: true,
            saved_cursor: None,
        }
    }

    pub fn with_default_geometry(video: V) -> Self {
        debug_assert_eq!(video.rows(), TERM_DEFAULT_ROWS);
        debug_assert_eq!(video.cols(), TERM_DEFAULT_COLS);
        Self::new(video)
    }

    /// Producer side: appends raw output bytes for the drainer to process.
    /// Never blocks, safe to call from any context holding only this lock
    /// briefly.
    pub fn enqueue_output(&self, bytes: &[u8]) {
        let mut q = self.queue.lock();
        q.extend(bytes.iter().copied());
    }

    /// Single-drainer side: pulls everything currently queued through the
    /// VT filter and applies the resulting commands to the grid, then
    /// repaints the backend. Must only ever be invoked by one task.
    pub fn drain<F>(&mut self, mut filter_feed: F)
    where
        F: FnMut(u8) -> crate::tty::vt::FilterOutcome,
    {
        use crate::tty::vt::FilterOutcome;

        let pending: Vec<u8> = {
            let mut q = self.queue.lock();
            q.drain(..).collect()
        };

        for b in pending {
            match filter_feed(b) {
                FilterOutcome::WriteC(c) => self.write_byte(c),
                FilterOutcome::WriteBlank => self.write_byte(b' '),
                FilterOutcome::Action(cmd) => self.apply(cmd),
                FilterOutcome::Consumed => {}
            }
        }

        self.repaint();
    }

    fn active_grid(&mut self) -> &mut Grid {
        self.alt_grid.as_mut().unwrap_or(&mut self.grid)
    }

    fn write_byte(&mut self, b: u8) {
        match b {
            b'\n' => self.active_grid().line_feed(),
            b'\r' => self.active_grid().cur_col = 0,
            0x08 => {
                let g = self.active_grid();
                g.cur_col = g.cur_col.saturating_sub(1);
            }
            c => self.active_grid().put(c),
        }
    }

    fn apply(&mut self, cmd: TermCommand) {
        match cmd {
            TermCommand::WriteChar(c) => self.write_byte(c),
            TermCommand::Del(DelKind::Erase) => {
                let g = self.active_grid();
                g.cur_col = g.cur_col.saturating_sub(1);
            }
            TermCommand::Del(_) => {}
            TermCommand::MoveCurAbs(row, col) => {
                let g = self.active_grid();
                if let Some(r) = row {
                    g.cur_row = (r as usize).min(g.rows.saturating_sub(1));
                }
                if let Some(c) = col {
                    g.cur_col = (c as usize).min(g.cols.saturating_sub(1));
                }
            }
            TermCommand::MoveCurRel(drow, dcol) => {
                let g = self.active_grid();
                g.cur_row = (g.cur_row as i32 + drow).clamp(0, g.rows as i32 - 1) as usize;
                g.cur_col = (g.cur_col as i32 + dcol).clamp(0, g.cols as i32 - 1) as usize;
            }
            TermCommand::Reset => {
                let (rows, cols) = (self.grid.rows, self.grid.cols);
                self.grid = Grid::new(rows, cols);
                self.alt_grid = None;
            }
            TermCommand::EnableCursor(v) => self.cursor_visible = v,
            TermCommand::UseAltBuffer(enter) => {
                if enter && self.alt_grid.is_none() {
                    self.alt_grid = Some(Grid::new(self.grid.rows, self.grid.cols));
                } else if !enter {
                    self.alt_grid = None;
                }
            }
            TermCommand::NonBufScroll(n, dir) => {
                let g = self.active_grid();
                let steps = match dir {
                    ScrollDir::Up => n,
                    ScrollDir::Down => -n,
                };
                for _ in 0..steps.max(0) {
                    g.line_feed();
                }
            }
            TermCommand::EraseInDisplay(mode) => self.active_grid().erase_in_display(mode),
            TermCommand::EraseInLine(mode) => self.active_grid().erase_in_line(mode),
            TermCommand::SaveCursor => {
                let g = self.active_grid();
                self.saved_cursor = Some((g.cur_row, g.cur_col));
            }
            TermCommand::RestoreCursor => {
                if let Some((r, c)) = self.saved_cursor {
                    let g = self.active_grid();
                    g.cur_row = r;
                    g.cur_col = c;
                }
            }
            TermCommand::Sgr { fg, bg, reset, .. } => {
                let g = self.active_grid();
                if reset {
                    g.cur_fg = 7;
                    g.cur_bg = 0;
                } else {
                    if let Some(f) = fg {
                        g.cur_fg = f;
                    }
                    if let Some(b) = bg {
                        g.cur_bg = b;
                    }
                }
            }
            TermCommand::Scroll(_, _) | TermCommand::DeviceStatusReport => {}
        }
    }

    fn repaint(&mut self) {
        let rows = self.grid.rows;
        let cols = self.grid.cols;
        let cur_row;
        let cur_col;
        {
            let g = self.alt_grid.as_mut().unwrap_or(&mut self.grid);
            cur_row = g.cur_row;
            cur_col = g.cur_col;
            for r in 0..rows {
                let src_row = g.visible_row(r);
                for c in 0..cols {
                    let cell = g.lines[src_row][c];
                    self.video.draw_cell(r, c, cell);
                }
            }
        }
        self.video.set_cursor(cur_row, cur_col);
        self.video.show_cursor(self.cursor_visible);
    }

    pub fn is_alt_buffer_active(&self) -> bool {
        self.alt_grid.is_some()
    }

    pub fn cursor(&self) -> (usize, usize) {
        match &self.alt_grid {
            Some(g) => (g.cur_row, g.cur_col),
            None => (self.grid.cur_row, self.grid.cur_col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tty::vt::VtFilter;

    #[test_case]
    fn plain_text_advances_cursor() {
        let mut term = Terminal::new(NullVideo::new(4, 8));
        let mut filter = VtFilter::new();
        term.enqueue_output(b"hi");
        term.drain(|b| filter.feed(b));
        assert_eq!(term.cursor(), (0, 2));
    }

    #[test_case]
    fn newline_moves_to_next_row() {
        let mut term = Terminal::new(NullVideo::new(4, 8));
        let mut filter = VtFilter::new();
        term.enqueue_output(b"a\nb");
        term.drain(|b| filter.feed(b));
        assert_eq!(term.cursor(), (1, 1));
    }

    #[test_case]
    fn alt_buffer_round_trip_preserves_primary_cursor() {
        let mut term = Terminal::new(NullVideo::new(4, 8));
        let mut filter = VtFilter::new();
        term.enqueue_output(b"ab");
        term.drain(|b| filter.feed(b));
        assert_eq!(term.cursor(), (0, 2));

        term.enqueue_output(b"\x1b[?1049h");
        term.drain(|b| filter.feed(b));
        assert!(term.is_alt_buffer_active());
        assert_eq!(term.cursor(), (0, 0));

        term.enqueue_output(b"\x1b[?1049l");
        term.drain(|b| filter.feed(b));
        assert!(!term.is_alt_buffer_active());
        assert_eq!(term.cursor(), (0, 2));
    }

    #[test_case]
    fn cursor_home_csi_resets_position() {
        let mut term = Terminal::new(NullVideo::new(4, 8));
        let mut filter = VtFilter::new();
        term.enqueue_output(b"abc\x1b[1;1H");
        term.drain(|b| filter.feed(b));
        assert_eq!(term.cursor(), (0, 0));
    }
}
