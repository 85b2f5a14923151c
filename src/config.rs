//! Compile-time kernel tunables, grouped in one place rather than scattered
//! across every subsystem module.

/// Hardware page size on x86 (32-bit, no PAE/huge pages).
pub const PAGE_SIZE: usize = 4096;

/// Backing size of the static Rust-level heap (`#[global_allocator]`),
/// separate from the kmalloc/vmalloc heaps (C2-C4) kernel subsystems
/// request memory from explicitly.
pub const KERNEL_HEAP_SIZE: usize = 512 * 1024;

/// Virtual addresses below this are reached via the linear mapping
/// (va = pa + LINEAR_MAPPING_BASE); addresses at or above it require
/// explicit page-table entries.
pub const LINEAR_MAPPING_BASE: u32 = 0xC000_0000;
pub const LINEAR_MAPPING_END: u32 = 0xF000_0000;

/// Size of one small-object heap (C3), in pages.
pub const SMALL_HEAP_PAGE_COUNT: usize = 8;
pub const SMALL_HEAP_SIZE: usize = SMALL_HEAP_PAGE_COUNT * PAGE_SIZE;

/// Allocations at or below this size are routed to the small-object pool
/// instead of the main buddy heaps (C4).
pub const SMALL_HEAP_MAX_ALLOC: usize = SMALL_HEAP_SIZE / 16 - 1;

/// Smallest block a small heap will ever hand out.
pub const SMALL_HEAP_MIN_BLOCK: usize = 16;

/// Smallest block the general-purpose heaps will ever hand out.
pub const KMALLOC_MIN_BLOCK: usize = 32;

/// Maximum depth of the explicit descent stack kept on every buddy heap,
/// sufficient because no heap's order exceeds this.
pub const BUDDY_MAX_STACK_DEPTH: usize = 32;

/// Number of general-purpose heaps the kmalloc facade may register.
pub const KMALLOC_HEAPS_MAX_COUNT: usize = 8;

/// Maximum number of worker threads (C6).
pub const WTH_MAX_THREADS: usize = 4;

/// Default job-queue depth for the priority-0 worker thread.
pub const WTH_MAX_PRIO_QUEUE_SIZE: u16 = 512;

/// Maximum number of simultaneously-open ttys (C7/C8).
pub const MAX_TTYS: usize = 8;

/// Terminal scrollback depth, expressed as a multiple of the visible rows.
pub const TERM_SCROLL_LINES_FACTOR: usize = 9;

/// Default VGA text-mode geometry, used by the fallback static terminal
/// buffer when a real scrollback grid cannot be allocated.
pub const TERM_DEFAULT_ROWS: usize = 25;
pub const TERM_DEFAULT_COLS: usize = 80;

/// Per-tty input ring buffer size.
pub const TTY_INPUT_BUF_SIZE: usize = 1024;

/// Maximum symlink-resolution recursion depth for the VFS resolver (C9);
/// exceeding it yields `KError::SymlinkLoop`.
pub const VFS_RESOLVE_MAX_DEPTH: usize = 4;

/// Maximum path-component length accepted by the resolver.
pub const VFS_MAX_COMPONENT_LEN: usize = 255;

/// Scheduler time slice, expressed in timer ticks.
pub const SCHED_TIME_SLICE_TICKS: u32 = 10;

/// Maximum number of live tasks (bounds the pid bitmap).
pub const MAX_TASKS: usize = 256;
