//! The buddy allocator family (C2-C4): `buddy` is the per-heap power-of-two
//! allocator, `small_heap` pools small heaps for sub-threshold requests,
//! and `kmalloc` is the size-routing facade everything else calls through.

pub mod buddy;
pub mod kmalloc;
pub mod small_heap;
