//! First-fit search and block splitting over the segregated free lists.
//!
//! The adaptive rule lives here: while a class's demand counter is below
//! `HIT_SENSOR`, split remainders are redistributed to the list matching
//! their residual size; once the class runs hot, remainders stay in the
//! class's own list.

use crate::free_list::{self, FreeLists, HitCounters};
use crate::header::{self, Header};
use crate::size_class::class_of;
use crate::util::{HEADER_SIZE, MIN_BLOCK_SIZE};
use core::ptr;

/// Carve `need_payload` bytes (plus header) off the front of `block` and
/// push the remainder onto a free list as a standalone free block.
///
/// The remainder's destination depends on the demand for `class_index`:
/// hot classes keep it in place, cold classes send it to the list
/// matching its residual footprint. `block` itself is rewritten to the
/// requested payload size and marked allocated; its class index is left
/// for the caller.
///
/// # Safety
/// `block` must not be on any free list, `remainder` must equal
/// `payload_size(block) - need_payload` (or the extension residual) and
/// be at least `MIN_BLOCK_SIZE`, and the whole footprint must lie inside
/// the segment.
pub unsafe fn split_block(
    lists: &mut FreeLists,
    hits: &HitCounters,
    block: *mut Header,
    need_payload: usize,
    remainder: usize,
    class_index: usize,
) {
    debug_assert!(remainder >= MIN_BLOCK_SIZE);

    let dest = if hits.is_hot(class_index) {
        class_index
    } else {
        class_of(remainder)
    };

    let tail = header::next_at(block, need_payload);
    (*tail).set_payload_size(remainder - HEADER_SIZE);
    (*tail).set_free();
    (*tail).set_class_index(dest);
    lists.push(dest, tail);

    (*block).set_payload_size(need_payload);
    (*block).set_allocated();
}

/// First-fit search of a single class list.
///
/// Walks the list at `class_index` and returns the first block whose
/// payload covers `need_payload`, unlinked and marked allocated. When
/// `may_split` is set and the leftover can host a standalone block, the
/// block is split via [`split_block`]; otherwise the caller is granted
/// the candidate's whole payload. Returns null when the list holds no
/// fit. The caller records the block's class index.
///
/// # Safety
/// The lists and every block reachable from them must be well-formed and
/// inside the segment.
pub unsafe fn find_fit(
    lists: &mut FreeLists,
    hits: &HitCounters,
    need_payload: usize,
    class_index: usize,
    may_split: bool,
) -> *mut Header {
    let mut prev: *mut Header = ptr::null_mut();
    let mut cur = lists.head(class_index);

    while !cur.is_null() {
        let payload_size = (*cur).payload_size();
        if payload_size >= need_payload {
            let remainder = payload_size - need_payload;
            lists.unlink(class_index, prev, cur);
            if may_split && remainder >= MIN_BLOCK_SIZE {
                split_block(lists, hits, cur, need_payload, remainder, class_index);
            } else {
                // Too small to stand alone: the whole payload goes to the
                // caller, even past the request.
                (*cur).set_allocated();
            }
            return cur;
        }
        prev = cur;
        cur = free_list::next_free(cur);
    }

    ptr::null_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{ALIGNMENT, HIT_SENSOR};

    #[repr(align(8))]
    struct Arena([u8; 4096]);

    // Lay a single free block of `payload` bytes at the arena start and
    // seed the given class list with it.
    unsafe fn seed(arena: &mut Arena, lists: &mut FreeLists, class: usize, payload: usize) -> *mut Header {
        let h = arena.0.as_mut_ptr() as *mut Header;
        (*h).set_payload_size(payload);
        (*h).set_free();
        (*h).set_class_index(class);
        lists.push(class, h);
        h
    }

    #[test]
    fn miss_returns_null() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            seed(&mut arena, &mut lists, 3, 24);
            let got = find_fit(&mut lists, &hits, 100, 3, true);
            assert!(got.is_null());
            // The undersized block is still listed.
            assert!(!lists.head(3).is_null());
        }
    }

    #[test]
    fn exact_fit_takes_whole_block_without_split() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            let h = seed(&mut arena, &mut lists, 2, 56);
            let got = find_fit(&mut lists, &hits, 56, 2, true);
            assert_eq!(got, h);
            assert!((*got).is_allocated());
            assert_eq!((*got).payload_size(), 56);
            assert!(lists.head(2).is_null());
        }
    }

    #[test]
    fn small_leftover_is_granted_to_the_caller() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            // Leftover of 8 bytes cannot host a header + link.
            let h = seed(&mut arena, &mut lists, 2, 64);
            let got = find_fit(&mut lists, &hits, 56, 2, true);
            assert_eq!(got, h);
            assert_eq!((*got).payload_size(), 64);
            assert!(lists.head(2).is_null());
        }
    }

    #[test]
    fn cold_split_redistributes_remainder() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            let h = seed(&mut arena, &mut lists, 7, 4000);
            let got = find_fit(&mut lists, &hits, 8, 7, true);
            assert_eq!(got, h);
            assert_eq!((*got).payload_size(), 8);
            assert!((*got).is_allocated());

            // remainder footprint 3992 -> class 7 by size, list 7.
            let tail = lists.head(7);
            assert!(!tail.is_null());
            assert_eq!(tail as usize, h as usize + HEADER_SIZE + 8);
            assert_eq!((*tail).payload_size(), 3992 - HEADER_SIZE);
            assert!(!(*tail).is_allocated());
            assert_eq!((*tail).class_index(), class_of(3992));
        }
    }

    #[test]
    fn cold_split_sends_small_remainder_to_its_own_class() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            seed(&mut arena, &mut lists, 7, 4000);
            // Take almost everything; the 40-byte remainder belongs to class 1.
            let got = find_fit(&mut lists, &hits, 3960, 7, true);
            assert!(!got.is_null());
            assert!(lists.head(7).is_null());
            let tail = lists.head(class_of(40));
            assert!(!tail.is_null());
            assert_eq!((*tail).payload_size(), 40 - HEADER_SIZE);
        }
    }

    #[test]
    fn hot_split_keeps_remainder_in_place() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let mut hits = HitCounters::new();
        for _ in 0..HIT_SENSOR {
            hits.record(7);
        }
        unsafe {
            seed(&mut arena, &mut lists, 7, 4000);
            let got = find_fit(&mut lists, &hits, 3960, 7, true);
            assert!(!got.is_null());
            // Hot class: the class-1-sized remainder stays in list 7.
            let tail = lists.head(7);
            assert!(!tail.is_null());
            assert_eq!((*tail).class_index(), 7);
            assert!(lists.head(class_of(40)).is_null());
        }
    }

    #[test]
    fn first_fit_skips_undersized_predecessors() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            let base = arena.0.as_mut_ptr();
            // Two blocks in class 4: a big one pushed first, then a small
            // head. LIFO order makes the small one the head.
            let big = base as *mut Header;
            (*big).set_payload_size(600);
            (*big).set_free();
            (*big).set_class_index(4);
            lists.push(4, big);

            let small = base.add(1024) as *mut Header;
            (*small).set_payload_size(300);
            (*small).set_free();
            (*small).set_class_index(4);
            lists.push(4, small);

            let got = find_fit(&mut lists, &hits, 500, 4, false);
            assert_eq!(got, big);
            // The small head survived, big was spliced out of the interior.
            assert_eq!(lists.head(4), small);
            assert!(free_list::next_free(small).is_null());
        }
    }

    #[test]
    fn no_split_flag_grants_whole_payload() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            seed(&mut arena, &mut lists, 7, 4000);
            let got = find_fit(&mut lists, &hits, 8, 7, false);
            assert!(!got.is_null());
            assert_eq!((*got).payload_size(), 4000);
            assert!(lists.head(7).is_null());
        }
    }

    #[test]
    fn alignment_of_split_point() {
        let mut arena = Arena([0u8; 4096]);
        let mut lists = FreeLists::new();
        let hits = HitCounters::new();
        unsafe {
            let h = seed(&mut arena, &mut lists, 7, 4000);
            find_fit(&mut lists, &hits, 104, 7, true);
            let tail = lists.head(class_of(4000 - 104));
            assert!(crate::util::is_aligned(tail as usize - h as usize, ALIGNMENT));
        }
    }
}
