//! kmalloc facade (C4): size-routing dispatcher over the small-object pool
//! (C3) and the main buddy heaps (C2), plus the `vmalloc` high-half path.
//!
//! Grounded on `general_kmalloc.c.h` / `kmalloc_heaps.c.h`.

extern crate alloc;

use spin::Mutex;

use crate::addr::VirtAddr;
use crate::config::{KMALLOC_HEAPS_MAX_COUNT, SMALL_HEAP_MAX_ALLOC};
use crate::error::{KError, KResult};
use crate::mm::buddy::{AllocFlags, BuddyHeap, NoBacking};
use crate::mm::small_heap::SmallHeapPool;

pub use crate::mm::buddy::AllocFlags as KmallocFlags;

struct MainHeapSlot {
    base: VirtAddr,
    heap: BuddyHeap<'static, NoBacking>,
    is_dma: bool,
}

/// Global kmalloc state: the small-object pool plus the array of
/// registered main heaps, scanned in descending size order.
pub struct KmallocState {
    small: SmallHeapPool,
    main_heaps: alloc::vec::Vec<MainHeapSlot>,
    stats_total_allocated: usize,
}

impl KmallocState {
    pub const fn new() -> Self {
        KmallocState {
            small: SmallHeapPool::new(),
            main_heaps: alloc::vec::Vec::new(),
            stats_total_allocated: 0,
        }
    }

    /// Registers a pre-built main heap (constructed by the boot-time
    /// bootstrap code, which owns the backing storage and metadata).
    pub fn add_heap(&mut self, base: VirtAddr, heap: BuddyHeap<'static, NoBacking>, is_dma: bool) -> KResult<()> {
        if self.main_heaps.len() >= KMALLOC_HEAPS_MAX_COUNT {
            return Err(KError::OutOfMemory);
        }
        self.main_heaps.push(MainHeapSlot { base, heap, is_dma });
        // descending size order, as section 4.4 requires for the scan
        self.main_heaps.sort_by(|a, b| b.heap.size().cmp(&a.heap.size()));
        Ok(())
    }

    pub fn total_allocated(&self) -> usize {
        self.stats_total_allocated
    }

    pub fn kmalloc(&mut self, size: usize, flags: AllocFlags) -> KResult<VirtAddr> {
        if size == 0 {
            return Err(KError::InvalidArgument);
        }

        if size <= SMALL_HEAP_MAX_ALLOC {
            let align = if flags.contains(AllocFlags::DMA) { 16 } else { 8 };
            let ptr = self.small.alloc(size, align)?;
            if !flags.contains(AllocFlags::DONT_ACCOUNT) {
                self.stats_total_allocated += size;
            }
            return Ok(VirtAddr::new(ptr as u32));
        }

        let want_dma = flags.contains(AllocFlags::DMA);

        for pass_dma in [want_dma, true] {
            for slot in self.main_heaps.iter_mut() {
                if slot.is_dma != pass_dma {
                    continue;
                }
                if let Ok(addr) = slot.heap.alloc(size, flags) {
                    if !flags.contains(AllocFlags::DONT_ACCOUNT) {
                        self.stats_total_allocated += size;
                    }
                    return Ok(addr);
                }
            }
            if pass_dma == want_dma && !want_dma {
                continue;
            }
            if pass_dma {
                break;
            }
        }

        Err(KError::OutOfMemory)
    }

    pub fn kzmalloc(&mut self, size: usize, flags: AllocFlags) -> KResult<VirtAddr> {
        let addr = self.kmalloc(size, flags)?;
        unsafe { core::ptr::write_bytes(addr.as_usize() as *mut u8, 0, size) };
        Ok(addr)
    }

    /// # Safety
    /// `ptr`/`size` must correspond to a previous successful `kmalloc`
    /// call on this allocator with the same `flags.DONT_ACCOUNT` setting.
    pub unsafe fn kfree(&mut self, ptr: VirtAddr, size: usize, flags: AllocFlags) {
        if size <= SMALL_HEAP_MAX_ALLOC && size != 0 {
            unsafe { self.small.free(ptr.as_usize() as *mut u8) };
        } else {
            for slot in self.main_heaps.iter_mut() {
                let start = slot.base;
                let end = start + slot.heap.size() as u32;
                if ptr.as_u32() >= start.as_u32() && ptr.as_u32() < end.as_u32() {
                    slot.heap.free(ptr, size, flags);
                    break;
                }
            }
        }

        if !flags.contains(AllocFlags::DONT_ACCOUNT) {
            self.stats_total_allocated = self.stats_total_allocated.saturating_sub(size);
        }
    }
}

impl Default for KmallocState {
    fn default() -> Self {
        Self::new()
    }
}

pub static KMALLOC: Mutex<KmallocState> = Mutex::new(KmallocState::new());

/// `vmalloc(size)`: try `kmalloc` first; on failure, reserve a high-half
/// range via C1 and map page-by-page (section 4.4). The page-supply hook
/// is threaded through so this module does not depend on the CPU bring-up
/// layer directly.
pub fn vmalloc<F>(size: usize, flags: AllocFlags, mut reserve_and_map: F) -> KResult<VirtAddr>
where
    F: FnMut(usize) -> KResult<VirtAddr>,
{
    if let Ok(addr) = KMALLOC.lock().kmalloc(size, flags) {
        return Ok(addr);
    }

    reserve_and_map(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn small_allocations_route_through_the_pool() {
        let mut state = KmallocState::new();
        let a = state.kmalloc(64, AllocFlags::empty()).unwrap();
        assert!(a.as_u32() != 0);
        unsafe { state.kfree(a, 64, AllocFlags::empty()) };
    }

    #[test_case]
    fn zero_size_allocation_is_rejected() {
        let mut state = KmallocState::new();
        assert_eq!(state.kmalloc(0, AllocFlags::empty()), Err(KError::InvalidArgument));
    }
}
