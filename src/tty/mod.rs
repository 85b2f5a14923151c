//! Terminal/TTY engine: output-path VT filter (`vt`), the scrollback grid
//! and video backend (`term`), the input-path line discipline
//! (`line_discipline`), and the termios control structure (`termios`).

pub mod line_discipline;
pub mod term;
pub mod termios;
pub mod vt;

pub use line_discipline::Tty;
pub use term::{Cell, NullVideo, Terminal, VideoInterface};
pub use termios::Termios;
pub use vt::{FilterOutcome, TermCommand, VtFilter};
