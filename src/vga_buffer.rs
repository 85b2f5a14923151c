use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::io_port::IoPort;
use crate::tty::{Cell, VideoInterface};

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

const CRT_INDEX_PORT: u16 = 0x3D4;
const CRT_DATA_PORT: u16 = 0x3D5;
const CRT_CURSOR_HIGH: u8 = 0x0E;
const CRT_CURSOR_LOW: u8 = 0x0F;

#[repr(u8)]
#[allow(dead_code)]
pub enum Color {
    Black = 0x0,
    Blue = 0x1,
    Green = 0x2,
    Cyan = 0x3,
    Red = 0x4,
    Magenta = 0x5,
    Brown = 0x6,
    Gray = 0x8,
    Pink = 0xd,
    Yellow = 0xe,
    White = 0xf,
    LightGray = 0x7,
    LightBlue = 0x9,
    LightGreen = 0xa,
    LightCyan = 0xb,
    LightRed = 0xc,
}

#[repr(transparent)]
#[derive(Clone, Copy)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 0x4 | (foreground as u8))
    }

    /// Builds a `ColorCode` from the raw 4-bit SGR palette indices the
    /// terminal engine's `Cell` carries, clamping out-of-range values to
    /// the low nibble so a malformed SGR sequence cannot corrupt a byte
    /// outside the cell it targets.
    fn from_cell(fg: u8, bg: u8) -> ColorCode {
        ColorCode((bg & 0xf) << 0x4 | (fg & 0xf))
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ScreenChar {
    ascii_char: u8,
    color_code: ColorCode,
}

#[repr(transparent)]
struct ScreenBuff {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

pub struct Writer {
    column: usize,
    row: usize,
    color_code: ColorCode,
    buffer: &'static mut ScreenBuff,
}

impl Writer {
    fn write_chr(&mut self, chr: u8) {
        match chr {
            // match printable ascci characters
            0x20..=0x7e => {
                if self.column >= BUFFER_WIDTH {
                    self.column = 0;
                    self.row += 1;
                }

                self.buffer.chars[self.row][self.column] = ScreenChar {
                    ascii_char: chr,
                    color_code: self.color_code,
                };

                self.column += 1;
            }
            b'\n' => {
                self.column = 0;
                self.row += 1;
            }
            _ => {}
        }
    }

    fn write_str(&mut self, str: &str) {
        for chr in str.bytes() {
            self.write_chr(chr);
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_str(s);
        Ok(())
    }
}

// spin locks are not the best but they work and we have no concept of blocking
// or even threads in this os to use a better alternative
lazy_static! {
    pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
        column: 0,
        row: 0,
        color_code: ColorCode::new(Color::White, Color::Black),
        buffer: unsafe { &mut *(0xb8000 as *mut ScreenBuff) },
    });
}

/// Zero-sized handle wiring `WRITER`'s raw 0xb8000 buffer into the
/// terminal engine's `VideoInterface` contract, so `term::Terminal` can
/// repaint the VGA text-mode screen without knowing about ports or the
/// buffer layout itself.
pub struct VgaVideo;

impl VideoInterface for VgaVideo {
    fn rows(&self) -> usize {
        BUFFER_HEIGHT
    }

    fn cols(&self) -> usize {
        BUFFER_WIDTH
    }

    fn draw_cell(&mut self, row: usize, col: usize, cell: Cell) {
        if row >= BUFFER_HEIGHT || col >= BUFFER_WIDTH {
            return;
        }
        WRITER.lock().buffer.chars[row][col] = ScreenChar {
            ascii_char: cell.ch,
            color_code: ColorCode::from_cell(cell.fg, cell.bg),
        };
    }

    fn set_cursor(&mut self, row: usize, col: usize) {
        let pos = (row * BUFFER_WIDTH + col) as u16;
        IoPort::write_u8(CRT_INDEX_PORT, CRT_CURSOR_HIGH);
        IoPort::write_u8(CRT_DATA_PORT, (pos >> 8) as u8);
        IoPort::write_u8(CRT_INDEX_PORT, CRT_CURSOR_LOW);
        IoPort::write_u8(CRT_DATA_PORT, (pos & 0xff) as u8);
    }

    fn show_cursor(&mut self, visible: bool) {
        // bit 5 of the cursor-start register (0x0A) is the disable bit
        IoPort::write_u8(CRT_INDEX_PORT, 0x0A);
        let start = IoPort::read_u8(CRT_DATA_PORT);
        let start = if visible { start & !0x20 } else { start | 0x20 };
        IoPort::write_u8(CRT_DATA_PORT, start);
    }
}
