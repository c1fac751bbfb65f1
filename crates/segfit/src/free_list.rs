use crate::header::{self, Header};
use crate::util::{CLASS_COUNT, HIT_SENSOR, REALLOC_CLASS};
use core::ptr;

/// Read the intrusive next link from a free block. The first
/// pointer-sized slot of a free block's payload holds the next header in
/// its list, null-terminated.
///
/// # Safety
/// `block` must be a free block whose payload slot holds a list link.
#[inline(always)]
pub unsafe fn next_free(block: *mut Header) -> *mut Header {
    (header::payload(block) as *mut *mut Header).read()
}

/// Write the intrusive next link into a free block's payload.
///
/// # Safety
/// `block` must have at least a pointer-sized payload not owned by a user.
#[inline(always)]
pub unsafe fn set_next_free(block: *mut Header, next: *mut Header) {
    (header::payload(block) as *mut *mut Header).write(next)
}

/// The segregated free-list table: one intrusive singly-linked list head
/// per size class. List order is LIFO; inserts always go to the head.
pub struct FreeLists {
    heads: [*mut Header; CLASS_COUNT],
}

impl FreeLists {
    pub const fn new() -> Self {
        FreeLists {
            heads: [ptr::null_mut(); CLASS_COUNT],
        }
    }

    pub fn clear(&mut self) {
        self.heads = [ptr::null_mut(); CLASS_COUNT];
    }

    #[inline(always)]
    pub fn head(&self, class: usize) -> *mut Header {
        self.heads[class]
    }

    /// Insert `block` at the head of the list for `class`, threading the
    /// previous head through the block's payload slot.
    ///
    /// # Safety
    /// `block` must not be reachable from any list and its payload must
    /// not be user-owned.
    #[inline]
    pub unsafe fn push(&mut self, class: usize, block: *mut Header) {
        set_next_free(block, self.heads[class]);
        self.heads[class] = block;
    }

    /// Splice `block` out of the list for `class`. `prev` is the block's
    /// predecessor in the list, or null when `block` is the head.
    ///
    /// # Safety
    /// `prev` and `block` must be adjacent members of the `class` list.
    #[inline]
    pub unsafe fn unlink(&mut self, class: usize, prev: *mut Header, block: *mut Header) {
        let next = next_free(block);
        if prev.is_null() {
            debug_assert_eq!(self.heads[class], block);
            self.heads[class] = next;
        } else {
            set_next_free(prev, next);
        }
    }
}

/// Per-class demand counters, parallel to the free-list table. A class's
/// counter goes up on every request routed to it and back down on free;
/// the decrement wraps rather than traps because the counter is a lossy
/// signal, not a safety gate.
pub struct HitCounters {
    counts: [u32; CLASS_COUNT],
}

impl HitCounters {
    pub const fn new() -> Self {
        HitCounters {
            counts: [0; CLASS_COUNT],
        }
    }

    /// Zero every counter, then pre-saturate the reallocation class so
    /// its adaptive branch is taken unconditionally.
    pub fn reset(&mut self) {
        self.counts = [0; CLASS_COUNT];
        self.counts[REALLOC_CLASS] = HIT_SENSOR;
    }

    #[inline(always)]
    pub fn record(&mut self, class: usize) {
        self.counts[class] = self.counts[class].wrapping_add(1);
    }

    #[inline(always)]
    pub fn release(&mut self, class: usize) {
        self.counts[class] = self.counts[class].wrapping_sub(1);
    }

    #[inline(always)]
    pub fn is_hot(&self, class: usize) -> bool {
        self.counts[class] >= HIT_SENSOR
    }

    #[inline(always)]
    pub fn get(&self, class: usize) -> u32 {
        self.counts[class]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{ALIGNMENT, HEADER_SIZE, MIN_BLOCK_SIZE};

    // A fixed arena of fake blocks for list surgery without a segment.
    #[repr(align(8))]
    struct Arena([u8; 256]);

    fn blocks(buf: &mut Arena) -> [*mut Header; 4] {
        let base = buf.0.as_mut_ptr();
        assert!(crate::util::is_aligned(base as usize, ALIGNMENT));
        let mut out = [ptr::null_mut(); 4];
        for (i, slot) in out.iter_mut().enumerate() {
            let h = unsafe { base.add(i * 64) } as *mut Header;
            unsafe {
                (*h).set_payload_size(64 - HEADER_SIZE);
                (*h).set_free();
                (*h).set_class_index(0);
            }
            *slot = h;
        }
        out
    }

    #[test]
    fn push_is_lifo() {
        let mut buf = Arena([0u8; 256]);
        let [a, b, c, _] = blocks(&mut buf);
        let mut lists = FreeLists::new();
        unsafe {
            lists.push(0, a);
            lists.push(0, b);
            lists.push(0, c);
            assert_eq!(lists.head(0), c);
            assert_eq!(next_free(c), b);
            assert_eq!(next_free(b), a);
            assert!(next_free(a).is_null());
        }
    }

    #[test]
    fn unlink_head_and_interior() {
        let mut buf = Arena([0u8; 256]);
        let [a, b, c, _] = blocks(&mut buf);
        let mut lists = FreeLists::new();
        unsafe {
            lists.push(3, a);
            lists.push(3, b);
            lists.push(3, c);
            // interior: c -> b -> a, remove b
            lists.unlink(3, c, b);
            assert_eq!(lists.head(3), c);
            assert_eq!(next_free(c), a);
            // head: remove c
            lists.unlink(3, ptr::null_mut(), c);
            assert_eq!(lists.head(3), a);
            assert!(next_free(a).is_null());
        }
    }

    #[test]
    fn free_block_payload_fits_a_link() {
        assert!(MIN_BLOCK_SIZE - HEADER_SIZE >= core::mem::size_of::<*mut Header>());
    }

    #[test]
    fn counters_reset_presaturates_realloc_class() {
        let mut hits = HitCounters::new();
        hits.record(5);
        hits.reset();
        for class in 0..CLASS_COUNT {
            if class == REALLOC_CLASS {
                assert_eq!(hits.get(class), HIT_SENSOR);
                assert!(hits.is_hot(class));
            } else {
                assert_eq!(hits.get(class), 0);
                assert!(!hits.is_hot(class));
            }
        }
    }

    #[test]
    fn release_wraps_without_trapping() {
        let mut hits = HitCounters::new();
        hits.release(0);
        assert_eq!(hits.get(0), u32::MAX);
        assert!(hits.is_hot(0)); // wrapped counters read as hot; lossy by contract
        hits.record(0);
        assert_eq!(hits.get(0), 0);
    }
}
