//! Kernel-wide singletons. `SCHEDULER` and `WORKER_THREADS` are
//! const-constructible, mirroring the teacher's own `ACTIVE_PAGING_CTX`
//! global pattern; `CONSOLE`/`CONSOLE_TTY` need `lazy_static!` since
//! `Terminal::new`/`Tty::new` allocate.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::task::Scheduler;
use crate::tty::{Terminal, Tty, VtFilter};
use crate::vga_buffer::VgaVideo;
use crate::wth::WorkerThreadTable;

pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());
pub static WORKER_THREADS: Mutex<WorkerThreadTable> = Mutex::new(WorkerThreadTable::new());

/// Pairs one `Terminal` with one persistent `VtFilter` so repeated writes
/// share CSI-parsing state across calls.
pub struct Console {
    terminal: Terminal<VgaVideo>,
    filter: VtFilter,
}

impl Console {
    fn new() -> Self {
        Console {
            terminal: Terminal::with_default_geometry(VgaVideo),
            filter: VtFilter::new(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.terminal.enqueue_output(bytes);
        let filter = &mut self.filter;
        self.terminal.drain(|b| filter.feed(b));
    }
}

lazy_static! {
    pub static ref CONSOLE: Mutex<Console> = Mutex::new(Console::new());
    pub static ref CONSOLE_TTY: Mutex<Tty> = Mutex::new(Tty::new());
}
