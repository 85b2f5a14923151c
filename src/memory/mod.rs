//! The Rust-level heap backing `extern crate alloc` (`Vec`/`Box`/`Arc`
//! used throughout C1-C9). Distinct from the kmalloc/vmalloc family in
//! `mm`, which models the kernel's own allocator API rather than the
//! host language's.

pub mod simple_heap_allocator;
