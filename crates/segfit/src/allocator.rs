//! The allocator facade: request validation, size-class routing, the
//! cross-class search loop with its hot-class short-circuit, the
//! page-extension fallback and the dedicated reallocation lane.

use crate::config;
use crate::engine;
use crate::free_list::{self, FreeLists, HitCounters};
use crate::header::{self, Header};
use crate::segment::{HeapSegment, PAGE_SIZE};
use crate::size_class::class_of;
use crate::util::{
    align_up, is_aligned, ALIGNMENT, CLASS_COUNT, HEADER_SIZE, MAX_REQUEST, MIN_BLOCK_SIZE,
    REALLOC_CLASS,
};
use core::ptr;

/// A segregated-fit allocator over one contiguous heap segment.
///
/// Blocks are never coalesced; fragmentation is managed by the size-class
/// discipline and the reallocation lane's padding policy. All operations
/// are synchronous and take `&mut self`; callers needing cross-thread use
/// go through [`crate::global_alloc::SegFitGlobal`].
pub struct SegFit {
    segment: HeapSegment,
    lists: FreeLists,
    hits: HitCounters,
}

unsafe impl Send for SegFit {}

impl SegFit {
    pub const fn new() -> Self {
        SegFit {
            segment: HeapSegment::new(),
            lists: FreeLists::new(),
            hits: HitCounters::new(),
        }
    }

    /// Reset to an empty, ready-to-go heap: clear every free list, zero
    /// the hit counters (pre-saturating the reallocation class) and reset
    /// the segment to zero pages. May be called again later to wipe the
    /// heap and start over; doing so invalidates every outstanding
    /// pointer.
    pub fn init(&mut self) -> bool {
        unsafe { config::read_config() };
        self.lists.clear();
        self.hits.reset();
        !self.segment.init(0).is_null()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.segment.is_mapped()
    }

    /// Allocate `size` bytes and return an 8-byte-aligned payload
    /// pointer, or null for a zero/oversized request or an exhausted
    /// segment.
    ///
    /// # Safety
    /// The allocator must have been initialized via [`SegFit::init`].
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_REQUEST {
            return ptr::null_mut();
        }

        let footprint = align_up(size + HEADER_SIZE, ALIGNMENT);
        let need_payload = footprint - HEADER_SIZE;
        let target = class_of(footprint);
        self.hits.record(target);

        // First-fit over the class lists, smallest class first. A hot
        // target class stops probing after the first miss and goes
        // straight to the OS.
        for class in 0..REALLOC_CLASS {
            let block = engine::find_fit(&mut self.lists, &self.hits, need_payload, class, true);
            if !block.is_null() {
                (*block).set_class_index(class);
                return header::payload(block);
            }
            if self.hits.is_hot(target) {
                break;
            }
        }

        let block = match self.extend_for(footprint, target) {
            Some(block) => block,
            None => return ptr::null_mut(),
        };
        header::payload(block)
    }

    /// Return a block to the free list recorded in its header.
    ///
    /// # Safety
    /// `ptr` must be null or a payload pointer obtained from this
    /// allocator and not freed since. Double-free is undefined behavior.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let block = header::for_payload(ptr);
        let class = (*block).class_index();
        self.hits.release(class);
        self.lists.push(class, block);
        (*block).set_free();
    }

    /// Resize an allocation. Shrinks are satisfied in place; growth goes
    /// through the reallocation lane with a doubled footprint so repeated
    /// growth of the same block amortizes to a single copy per doubling.
    ///
    /// # Safety
    /// `old` must be null or a live payload pointer from this allocator.
    /// On success the old pointer is freed and must not be used again.
    pub unsafe fn reallocate(&mut self, old: *mut u8, size: usize) -> *mut u8 {
        if old.is_null() {
            return self.allocate(size);
        }

        let old_block = header::for_payload(old);
        let old_payload = (*old_block).payload_size();

        if size == 0 || size > MAX_REQUEST {
            return ptr::null_mut();
        }
        if size <= old_payload {
            return old;
        }

        // Double the adjusted footprint: the retention policy that keeps
        // a growing block from copying on every step.
        let footprint = align_up(size + HEADER_SIZE, ALIGNMENT) * 2;
        let need_payload = footprint - HEADER_SIZE;
        self.hits.record(REALLOC_CLASS);

        let block = engine::find_fit(
            &mut self.lists,
            &self.hits,
            need_payload,
            REALLOC_CLASS,
            true,
        );
        let block = if !block.is_null() {
            block
        } else {
            match self.extend_for(footprint, REALLOC_CLASS) {
                Some(block) => block,
                None => return ptr::null_mut(),
            }
        };

        (*block).set_class_index(REALLOC_CLASS);
        let new_ptr = header::payload(block);
        ptr::copy_nonoverlapping(old, new_ptr, old_payload);
        self.free(old);
        new_ptr
    }

    /// Ask the segment for enough whole pages to hold `footprint` bytes
    /// and carve a block out of the new region. The residual beyond the
    /// request becomes a free block when it can stand alone, placed by
    /// the same adaptive rule the engine uses; otherwise the caller gets
    /// the entire extension.
    unsafe fn extend_for(&mut self, footprint: usize, class_index: usize) -> Option<*mut Header> {
        let pages = align_up(footprint, PAGE_SIZE) / PAGE_SIZE;
        let raw = self.segment.extend(pages);
        if raw.is_null() {
            return None;
        }
        let extended = pages * PAGE_SIZE;

        let block = raw as *mut Header;
        (*block).set_class_index(class_index);

        let residual = extended - footprint;
        if residual >= MIN_BLOCK_SIZE {
            engine::split_block(
                &mut self.lists,
                &self.hits,
                block,
                footprint - HEADER_SIZE,
                residual,
                class_index,
            );
        } else {
            (*block).set_payload_size(extended - HEADER_SIZE);
            (*block).set_allocated();
        }
        Some(block)
    }

    /// Structural consistency check, in two passes.
    ///
    /// The list pass checks that every listed block is marked free,
    /// records the index of the list holding it, lies inside the
    /// committed segment on an aligned boundary, and that every list
    /// terminates without cycling. The sequential pass steps through the
    /// committed region in address order; because blocks are contiguous
    /// and never coalesced they must tile it exactly, so a corrupt
    /// header in a live block (an out-of-range footprint, a trashed
    /// flag) breaks the tiling and is caught here. The passes are tied
    /// together by counting: every free block found in address order
    /// must be accounted for by exactly one list node.
    pub fn validate(&self) -> bool {
        let committed = self.segment.committed_bytes();
        // Any well-formed list is shorter than the block-count bound, so
        // exceeding it means a cycle or a corrupt link.
        let max_hops = committed / MIN_BLOCK_SIZE + 1;

        let mut listed = 0usize;
        for class in 0..CLASS_COUNT {
            let mut hops = 0usize;
            let mut cur = self.lists.head(class);
            while !cur.is_null() {
                hops += 1;
                if hops > max_hops {
                    return false;
                }
                if !is_aligned(cur as usize, ALIGNMENT) {
                    return false;
                }
                if !self.segment.contains(cur as *const u8, HEADER_SIZE) {
                    return false;
                }
                unsafe {
                    let footprint = HEADER_SIZE + (*cur).payload_size();
                    if !self.segment.contains(cur as *const u8, footprint) {
                        return false;
                    }
                    if (*cur).is_allocated() {
                        return false;
                    }
                    if (*cur).class_index() != class {
                        return false;
                    }
                    cur = free_list::next_free(cur);
                }
            }
            listed += hops;
        }

        // Address-order walk over every block, live or free.
        let end = self.segment.base() as usize + committed;
        let mut cur = self.segment.base() as *mut Header;
        let mut blocks = 0usize;
        let mut free_blocks = 0usize;
        while (cur as usize) < end {
            blocks += 1;
            if blocks > max_hops {
                return false;
            }
            if !is_aligned(cur as usize, ALIGNMENT) {
                return false;
            }
            unsafe {
                let payload_size = (*cur).payload_size();
                let footprint = HEADER_SIZE + payload_size;
                if payload_size < MIN_BLOCK_SIZE - HEADER_SIZE
                    || !is_aligned(footprint, ALIGNMENT)
                {
                    return false;
                }
                if !self.segment.contains(cur as *const u8, footprint) {
                    return false;
                }
                if (*cur).alloc_flag() > 1 {
                    return false;
                }
                if (*cur).class_index() >= CLASS_COUNT {
                    return false;
                }
                if !(*cur).is_allocated() {
                    free_blocks += 1;
                }
                cur = header::next_at(cur, payload_size);
            }
        }
        // The tiling must land exactly on the watermark, and every free
        // block must sit on exactly one list.
        cur as usize == end && free_blocks == listed
    }

    /// Committed segment accessor, for diagnostics and tests.
    pub fn segment(&self) -> &HeapSegment {
        &self.segment
    }

    pub fn free_lists(&self) -> &FreeLists {
        &self.lists
    }

    pub fn hit_counters(&self) -> &HitCounters {
        &self.hits
    }
}

impl Default for SegFit {
    fn default() -> Self {
        Self::new()
    }
}
