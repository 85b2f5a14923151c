//! Pool of small buddy heaps for sub-threshold allocations (C3).
//!
//! Grounded on `kmalloc_small_heap.c.h` / `kmalloc_small_heaps.c.h`: each
//! small heap is one `SMALL_HEAP_SIZE` buddy heap whose own metadata lives
//! in its first allocation, plus membership in an "all" list and an
//! "available" list (available iff it still has free space).

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::size_of;

use crate::addr::VirtAddr;
use crate::config::{SMALL_HEAP_MIN_BLOCK, SMALL_HEAP_SIZE};
use crate::error::{KError, KResult};
use crate::mm::buddy::{AllocFlags, BuddyHeap, NodeFlags, NoBacking};

/// Header prepended to every small-heap allocation so `free` can find the
/// owning heap without the caller passing it back in.
#[repr(C)]
struct AllocHeader {
    owner: u32, // index into SmallHeapPool::heaps
    size: u32,
    align_offset: u8,
}

const HEADER_SIZE: usize = size_of::<AllocHeader>();

struct SmallHeap {
    heap: BuddyHeap<'static, NoBacking>,
    // Backing memory for both the heap's metadata array and its data
    // region; kept alive for the lifetime of the small heap.
    _metadata: Box<[NodeFlags]>,
    _storage: Box<[u8]>,
}

impl SmallHeap {
    fn new() -> Self {
        let node_count = 2 * (SMALL_HEAP_SIZE / SMALL_HEAP_MIN_BLOCK) - 1;
        let mut metadata: Box<[NodeFlags]> = alloc::vec![NodeFlags::empty(); node_count].into_boxed_slice();
        let mut storage: Box<[u8]> = alloc::vec![0u8; SMALL_HEAP_SIZE].into_boxed_slice();
        let base = VirtAddr::new(storage.as_mut_ptr() as u32);

        // SAFETY: `metadata` and `storage` outlive the `BuddyHeap` borrow
        // because both are held alongside it in the same struct and never
        // moved independently (`SmallHeap` is always boxed/pinned by its
        // owner, the pool's `heaps` Vec).
        let metadata_ref: &'static mut [NodeFlags] =
            unsafe { core::slice::from_raw_parts_mut(metadata.as_mut_ptr(), metadata.len()) };

        let heap = BuddyHeap::new(base, SMALL_HEAP_SIZE, SMALL_HEAP_MIN_BLOCK, 0, metadata_ref, NoBacking);

        SmallHeap {
            heap,
            _metadata: metadata,
            _storage: storage,
        }
    }

    fn mem_allocated(&self) -> usize {
        self.heap.mem_allocated()
    }

    fn is_empty(&self) -> bool {
        self.heap.mem_allocated() == 0
    }
}

/// Pool of small heaps plus the "available" index list (section 4.3).
pub struct SmallHeapPool {
    heaps: Vec<Option<SmallHeap>>,
    available: Vec<u32>,
    pub lifetime_created_heaps_count: u64,
}

impl SmallHeapPool {
    pub const fn new() -> Self {
        SmallHeapPool {
            heaps: Vec::new(),
            available: Vec::new(),
            lifetime_created_heaps_count: 0,
        }
    }

    pub fn peak_small_heaps_count(&self) -> usize {
        self.heaps.iter().filter(|h| h.is_some()).count()
    }

    fn create_heap(&mut self) -> u32 {
        let heap = SmallHeap::new();
        self.lifetime_created_heaps_count += 1;

        if let Some(free_slot) = self.heaps.iter().position(|h| h.is_none()) {
            self.heaps[free_slot] = Some(heap);
            self.available.push(free_slot as u32);
            free_slot as u32
        } else {
            let idx = self.heaps.len() as u32;
            self.heaps.push(Some(heap));
            self.available.push(idx);
            idx
        }
    }

    pub fn alloc(&mut self, size: usize, align: usize) -> KResult<*mut u8> {
        let total = HEADER_SIZE + align.saturating_sub(1) + size;

        let mut chosen = None;
        for (pos, &idx) in self.available.iter().enumerate() {
            let heap = self.heaps[idx as usize].as_mut().unwrap();
            if heap.heap.free_bytes() >= total {
                chosen = Some((pos, idx));
                break;
            }
        }

        let idx = match chosen {
            Some((_, idx)) => idx,
            None => self.create_heap(),
        };

        let heap = self.heaps[idx as usize].as_mut().unwrap();
        let raw = heap.heap.alloc(total, AllocFlags::empty()).map_err(|_| KError::OutOfMemory)?;

        let base = raw.as_u32() as usize;
        let data_start = (base + HEADER_SIZE).next_multiple_of(align.max(1));
        let align_offset = (data_start - (base + HEADER_SIZE)) as u8;

        let header_ptr = (data_start - HEADER_SIZE) as *mut AllocHeader;
        unsafe {
            header_ptr.write(AllocHeader {
                owner: idx,
                size: size as u32,
                align_offset,
            });
        }

        if heap.heap.free_bytes() < HEADER_SIZE + SMALL_HEAP_MIN_BLOCK {
            self.available.retain(|&i| i != idx);
        }

        Ok(data_start as *mut u8)
    }

    /// # Safety
    /// `ptr` must have been returned by a prior call to `alloc` on this pool.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let data_start = ptr as usize;
        let header = unsafe { &*((data_start - HEADER_SIZE) as *const AllocHeader) };
        let idx = header.owner;
        let owner_alloc_start = data_start - HEADER_SIZE - header.align_offset as usize;
        let freed_size = HEADER_SIZE + header.align_offset as usize + header.size as usize;

        let was_full = {
            let heap = self.heaps[idx as usize].as_ref().unwrap();
            heap.heap.free_bytes() < HEADER_SIZE + SMALL_HEAP_MIN_BLOCK
        };

        {
            let heap = self.heaps[idx as usize].as_mut().unwrap();
            heap.heap.free(VirtAddr::new(owner_alloc_start as u32), freed_size, AllocFlags::empty());
        }

        if was_full {
            self.available.push(idx);
        }

        let heap = self.heaps[idx as usize].as_ref().unwrap();
        if heap.is_empty() {
            self.heaps[idx as usize] = None;
            self.available.retain(|&i| i != idx);
        }
    }
}

impl Default for SmallHeapPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_then_free_releases_the_heap() {
        let mut pool = SmallHeapPool::new();
        let ptr = pool.alloc(64, 8).unwrap();
        assert_eq!(pool.peak_small_heaps_count(), 1);
        unsafe { pool.free(ptr) };
        assert_eq!(pool.peak_small_heaps_count(), 0);
    }

    #[test_case]
    fn repeated_cycles_do_not_leak_heaps() {
        let mut pool = SmallHeapPool::new();
        for _ in 0..64 {
            let ptr = pool.alloc(32, 4).unwrap();
            unsafe { pool.free(ptr) };
        }
        assert!(pool.lifetime_created_heaps_count <= 64);
        assert_eq!(pool.peak_small_heaps_count(), 0);
    }
}
