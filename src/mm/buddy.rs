//! Power-of-two buddy allocator over a contiguous virtual region (C2).
//!
//! Grounded on `kmalloc_block_node.h`/`kmalloc_heap_struct.h`/`kmalloc.c`
//! from the original source: a flat array of bit-packed node records
//! describing an implicit binary tree, walked with an explicit stack
//! instead of recursion.

use bitflags::bitflags;

use crate::addr::VirtAddr;
use crate::config::BUDDY_MAX_STACK_DEPTH;
use crate::error::{KError, KResult};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        const SPLIT        = 1 << 0;
        const FULL         = 1 << 1;
        const ALLOCATED    = 1 << 2;
        const ALLOC_FAILED = 1 << 3;
    }
}

impl NodeFlags {
    #[inline]
    fn is_free(self) -> bool {
        !self.intersects(NodeFlags::SPLIT | NodeFlags::FULL)
    }
}

/// A single frame on the explicit descent/coalesce stack, replacing the
/// source's `SIMULATE_CALL2` recursion simulation.
#[derive(Clone, Copy)]
struct StackFrame {
    node: usize,
    size: usize,
}

/// Hook used to back a leaf with physical pages (for non-linear heaps).
/// Linear heaps pass a no-op pair (`alloc_block_size == 0`).
pub trait PageBacking {
    fn valloc_and_map(&mut self, vaddr: VirtAddr, size: usize) -> KResult<()>;
    fn vfree_and_unmap(&mut self, vaddr: VirtAddr, size: usize);
}

pub struct NoBacking;
impl PageBacking for NoBacking {
    fn valloc_and_map(&mut self, _vaddr: VirtAddr, _size: usize) -> KResult<()> {
        Ok(())
    }
    fn vfree_and_unmap(&mut self, _vaddr: VirtAddr, _size: usize) {}
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        const MULTI_STEP       = 1 << 0;
        const NO_ACTUAL_ALLOC  = 1 << 1;
        const DMA              = 1 << 2;
        const DONT_ACCOUNT     = 1 << 3;
    }
}

/// A buddy heap over `[vaddr, vaddr + size)`. `metadata` holds one
/// `NodeFlags` byte per implicit-tree node and must have
/// `2 * (size / min_block_size) - 1` entries.
pub struct BuddyHeap<'a, B: PageBacking = NoBacking> {
    vaddr: VirtAddr,
    size: usize,
    min_block_size: usize,
    alloc_block_size: usize,
    metadata: &'a mut [NodeFlags],
    mem_allocated: usize,
    in_use: bool,
    backing: B,
}

impl<'a, B: PageBacking> BuddyHeap<'a, B> {
    pub fn new(
        vaddr: VirtAddr,
        size: usize,
        min_block_size: usize,
        alloc_block_size: usize,
        metadata: &'a mut [NodeFlags],
        backing: B,
    ) -> Self {
        assert!(size.is_power_of_two());
        assert!(min_block_size.is_power_of_two());
        assert!(alloc_block_size == 0 || alloc_block_size.is_power_of_two());
        assert_eq!(metadata.len(), 2 * (size / min_block_size) - 1);
        metadata.fill(NodeFlags::empty());

        BuddyHeap {
            vaddr,
            size,
            min_block_size,
            alloc_block_size,
            metadata,
            mem_allocated: 0,
            in_use: false,
            backing,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mem_allocated(&self) -> usize {
        self.mem_allocated
    }

    pub fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    pub fn free_bytes(&self) -> usize {
        self.size - self.mem_allocated
    }

    fn order(&self) -> u32 {
        (self.size / self.min_block_size).trailing_zeros()
    }

    /// node index <-> (address offset, size) per the numeric semantics in
    /// SPEC_FULL.md section 4.2: at size 2^j, node = (1 << (k-j)) - 1 + (offset >> j).
    fn node_for(&self, offset: usize, size: usize) -> usize {
        let k = self.order();
        let j = size.trailing_zeros();
        (1usize << (k - j)) - 1 + (offset >> j)
    }

    fn offset_for(&self, node: usize, size: usize) -> usize {
        let k = self.order();
        let j = size.trailing_zeros();
        let first_node_at_j = (1usize << (k - j)) - 1;
        (node - first_node_at_j) << j
    }

    fn round_up(&self, requested: usize) -> usize {
        requested.next_power_of_two().max(self.min_block_size)
    }

    fn left(node: usize) -> usize {
        node * 2 + 1
    }

    fn right(node: usize) -> usize {
        node * 2 + 2
    }

    fn parent(node: usize) -> Option<usize> {
        if node == 0 {
            None
        } else {
            Some((node - 1) / 2)
        }
    }

    fn mark_split_up(&mut self, mut node: usize) {
        while let Some(p) = Self::parent(node) {
            self.metadata[p].insert(NodeFlags::SPLIT);
            node = p;
        }
    }

    fn propagate_full_up(&mut self, mut node: usize) {
        while let Some(p) = Self::parent(node) {
            let sibling = if node % 2 == 1 { node + 1 } else { node - 1 };
            let both_full = self.metadata[node].contains(NodeFlags::FULL)
                && (self.metadata[sibling].contains(NodeFlags::FULL)
                    || self.metadata[sibling].contains(NodeFlags::ALLOCATED));
            if both_full {
                self.metadata[p].insert(NodeFlags::FULL);
                node = p;
            } else {
                break;
            }
        }
    }

    /// Descend the implicit tree looking for a free leaf of exactly
    /// `target_size`, without marking anything (used for the multi-step
    /// dry run and plain allocation).
    fn find_free_leaf(&self, target_size: usize) -> Option<(usize, usize)> {
        let mut stack = [StackFrame { node: 0, size: 0 }; BUDDY_MAX_STACK_DEPTH];
        let mut sp = 0;
        stack[sp] = StackFrame { node: 0, size: self.size };
        sp += 1;

        while sp > 0 {
            sp -= 1;
            let StackFrame { node, size } = stack[sp];
            let flags = self.metadata[node];

            if flags.contains(NodeFlags::FULL) {
                continue;
            }

            if size == target_size {
                if flags.is_free() {
                    return Some((node, self.offset_for(node, size)));
                }
                continue;
            }

            if size / 2 < target_size {
                continue;
            }

            if !flags.contains(NodeFlags::SPLIT) && flags.is_free() {
                // not yet split, but big enough to still contain target_size; descend virtually
            }

            let half = size / 2;
            if sp + 2 > BUDDY_MAX_STACK_DEPTH {
                return None;
            }
            stack[sp] = StackFrame { node: Self::right(node), size: half };
            sp += 1;
            stack[sp] = StackFrame { node: Self::left(node), size: half };
            sp += 1;
        }

        None
    }

    fn alloc_blocks_covering(&mut self, offset: usize, size: usize) -> KResult<()> {
        if self.alloc_block_size == 0 {
            return Ok(());
        }

        let start = offset / self.alloc_block_size;
        let end = (offset + size).div_ceil(self.alloc_block_size);
        let mut done = start;

        for blk in start..end {
            let blk_node = self.node_for(blk * self.alloc_block_size, self.alloc_block_size);
            if !self.metadata[blk_node].contains(NodeFlags::ALLOCATED) {
                let blk_addr = self.vaddr + (blk * self.alloc_block_size) as u32;
                if let Err(e) = self.backing.valloc_and_map(blk_addr, self.alloc_block_size) {
                    self.metadata[blk_node].insert(NodeFlags::ALLOC_FAILED);
                    for rollback in start..done {
                        let rb_node = self.node_for(rollback * self.alloc_block_size, self.alloc_block_size);
                        self.metadata[rb_node].remove(NodeFlags::ALLOCATED);
                        let rb_addr = self.vaddr + (rollback * self.alloc_block_size) as u32;
                        self.backing.vfree_and_unmap(rb_addr, self.alloc_block_size);
                    }
                    return Err(e);
                }
                self.metadata[blk_node].insert(NodeFlags::ALLOCATED);
            }
            done = blk + 1;
        }

        Ok(())
    }

    fn free_blocks_covering(&mut self, offset: usize, size: usize) {
        if self.alloc_block_size == 0 {
            return;
        }

        let start = offset / self.alloc_block_size;
        let end = (offset + size).div_ceil(self.alloc_block_size);

        for blk in start..end {
            let blk_node = self.node_for(blk * self.alloc_block_size, self.alloc_block_size);
            if self.metadata[blk_node].contains(NodeFlags::ALLOCATED) {
                self.metadata[blk_node].remove(NodeFlags::ALLOCATED);
                let blk_addr = self.vaddr + (blk * self.alloc_block_size) as u32;
                self.backing.vfree_and_unmap(blk_addr, self.alloc_block_size);
            }
        }
    }

    /// Single-block allocation path (section 4.2, step 2).
    pub fn alloc(&mut self, requested_size: usize, flags: AllocFlags) -> KResult<VirtAddr> {
        if self.in_use {
            return Err(KError::Busy);
        }
        self.in_use = true;
        let result = self.alloc_inner(requested_size, flags);
        self.in_use = false;
        result
    }

    fn alloc_inner(&mut self, requested_size: usize, flags: AllocFlags) -> KResult<VirtAddr> {
        let round_sz = self.round_up(requested_size);

        if flags.contains(AllocFlags::MULTI_STEP) && round_sz - requested_size >= self.min_block_size {
            return self.alloc_multi_step(requested_size, round_sz, flags);
        }

        let (node, offset) = self.find_free_leaf(round_sz).ok_or(KError::OutOfMemory)?;

        if !flags.contains(AllocFlags::NO_ACTUAL_ALLOC) {
            self.alloc_blocks_covering(offset, round_sz)?;
        }

        self.metadata[node].insert(NodeFlags::FULL);
        self.mark_split_up(node);
        self.propagate_full_up(node);

        if !flags.contains(AllocFlags::DONT_ACCOUNT) {
            self.mem_allocated += round_sz;
        }

        Ok(self.vaddr + offset as u32)
    }

    /// Multi-step allocation: tile the bits of `requested_size` within one
    /// contiguous "big block" of `round_sz` (section 4.2, Multi-step mode).
    fn alloc_multi_step(&mut self, requested_size: usize, round_sz: usize, flags: AllocFlags) -> KResult<VirtAddr> {
        let (big_node, big_offset) = self
            .find_free_leaf(round_sz)
            .ok_or(KError::OutOfMemory)?;

        let mut claimed: [(usize, usize); 32] = [(0, 0); 32];
        let mut claimed_n = 0;
        let mut cursor = big_offset;
        let mut remaining = requested_size;
        let mut bit = 31i32;

        let rollback = |heap: &mut Self, claimed: &[(usize, usize)], n: usize| {
            for &(off, sz) in claimed[..n].iter().rev() {
                heap.free_inner(off, sz);
            }
        };

        while bit >= 0 {
            let blk = 1usize << bit;
            if remaining & blk != 0 {
                let node = self.node_for(cursor, blk);
                if self.alloc_blocks_covering(cursor, blk).is_err() {
                    rollback(self, &claimed, claimed_n);
                    return Err(KError::OutOfMemory);
                }
                self.metadata[node].insert(NodeFlags::FULL);
                self.mark_split_up(node);
                self.propagate_full_up(node);
                claimed[claimed_n] = (cursor, blk);
                claimed_n += 1;
                cursor += blk;
                remaining -= blk;
            }
            bit -= 1;
        }

        let _ = big_node;
        if !flags.contains(AllocFlags::DONT_ACCOUNT) {
            self.mem_allocated += requested_size.next_multiple_of(self.min_block_size).min(round_sz);
        }

        Ok(self.vaddr + big_offset as u32)
    }

    /// Locate the node owning `addr` at the given size by walking from the
    /// root following the split bits, used when `kfree` is called with
    /// `size == 0`.
    fn find_node_for_addr(&self, addr: VirtAddr) -> Option<(usize, usize)> {
        let offset = (addr - self.vaddr) as usize;
        let mut node = 0usize;
        let mut size = self.size;

        loop {
            if !self.metadata[node].contains(NodeFlags::SPLIT) {
                return Some((node, size));
            }
            let half = size / 2;
            let mid = self.offset_for(node, size) + half;
            node = if offset < mid { Self::left(node) } else { Self::right(node) };
            size = half;
        }
    }

    fn free_inner(&mut self, offset: usize, size: usize) {
        let node = self.node_for(offset, size);
        self.metadata[node].remove(NodeFlags::FULL);
        self.free_blocks_covering(offset, size);

        let mut cur = node;
        loop {
            let Some(p) = Self::parent(cur) else { break };
            let sibling = if cur % 2 == 1 { cur + 1 } else { cur - 1 };
            let sibling_free = self.metadata[sibling].is_free();

            if sibling_free && !self.metadata[sibling].contains(NodeFlags::FULL) {
                self.metadata[p].remove(NodeFlags::SPLIT);
                self.metadata[p].remove(NodeFlags::FULL);
            } else {
                self.metadata[p].remove(NodeFlags::FULL);
                cur = p;
                continue;
            }
            cur = p;
        }
    }

    /// `kfree(h, ptr, size, flags)` (section 4.2).
    pub fn free(&mut self, addr: VirtAddr, size: usize, flags: AllocFlags) {
        let (offset, freed_size) = if size == 0 {
            let (node, sz) = self.find_node_for_addr(addr).expect("free of unknown address");
            (self.offset_for(node, sz), sz)
        } else {
            ((addr - self.vaddr) as usize, self.round_up(size))
        };

        self.free_inner(offset, freed_size);

        if !flags.contains(AllocFlags::DONT_ACCOUNT) {
            self.mem_allocated -= freed_size;
        }
    }

    /// True iff the tree holds no allocations at all: used by property
    /// tests and by the small-heap pool to decide when a heap is empty.
    pub fn is_clean(&self) -> bool {
        self.mem_allocated == 0 && self.metadata.iter().all(|f| f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    extern crate alloc;

    fn make_heap(size: usize, min_block: usize) -> (VirtAddr, alloc::boxed::Box<[NodeFlags]>) {
        let nodes = 2 * (size / min_block) - 1;
        (VirtAddr::new(0x1000_0000), vec![NodeFlags::empty(); nodes].into_boxed_slice())
    }

    #[test_case]
    fn alloc_and_free_returns_to_clean_state() {
        let (base, mut md) = make_heap(4096, 64);
        let mut heap = BuddyHeap::new(base, 4096, 64, 0, &mut md, NoBacking);

        let a = heap.alloc(100, AllocFlags::empty()).unwrap();
        let b = heap.alloc(200, AllocFlags::empty()).unwrap();
        assert_ne!(a, b);
        assert!(heap.mem_allocated() > 0);

        heap.free(b, 0, AllocFlags::empty());
        heap.free(a, 0, AllocFlags::empty());

        assert!(heap.is_clean());
    }

    #[test_case]
    fn allocation_is_aligned_to_rounded_size() {
        let (base, mut md) = make_heap(4096, 64);
        let mut heap = BuddyHeap::new(base, 4096, 64, 0, &mut md, NoBacking);
        let addr = heap.alloc(100, AllocFlags::empty()).unwrap();
        // rounded size for 100 with min_block 64 is 128
        assert_eq!((addr.as_u32() - base.as_u32()) % 128, 0);
    }

    #[test_case]
    fn exhausting_the_heap_returns_out_of_memory() {
        let (base, mut md) = make_heap(256, 64);
        let mut heap = BuddyHeap::new(base, 256, 64, 0, &mut md, NoBacking);
        assert!(heap.alloc(64, AllocFlags::empty()).is_ok());
        assert!(heap.alloc(64, AllocFlags::empty()).is_ok());
        assert!(heap.alloc(64, AllocFlags::empty()).is_ok());
        assert!(heap.alloc(64, AllocFlags::empty()).is_ok());
        assert_eq!(heap.alloc(64, AllocFlags::empty()), Err(KError::OutOfMemory));
    }

    #[test_case]
    fn multi_step_allocation_returns_close_to_requested_size() {
        let (base, mut md) = make_heap(4096, 64);
        let mut heap = BuddyHeap::new(base, 4096, 64, 0, &mut md, NoBacking);
        let requested = 100usize;
        let addr = heap.alloc(requested, AllocFlags::MULTI_STEP).unwrap();
        assert!(addr.as_u32() >= base.as_u32());
        assert!(heap.mem_allocated() >= requested);
        assert!(heap.mem_allocated() < requested + heap.min_block_size());
    }
}
