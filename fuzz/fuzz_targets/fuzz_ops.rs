#![no_main]

use libfuzzer_sys::fuzz_target;
use segfit::SegFit;

/// Fuzz target that interprets a byte slice as a sequence of allocator
/// operations.
///
/// Each operation is encoded as:
///   byte 0: opcode (0=allocate, 1=free, 2=reallocate)
///   byte 1-2: size (little-endian u16)
///   byte 3: slot index (which tracked pointer to operate on)
///
/// We track up to 64 live pointers, each with a fill byte so moves can be
/// checked for content preservation.
const MAX_SLOTS: usize = 64;

fuzz_target!(|data: &[u8]| {
    let mut a = SegFit::new();
    if !a.init() {
        return;
    }

    let mut slots: [*mut u8; MAX_SLOTS] = [std::ptr::null_mut(); MAX_SLOTS];
    let mut sizes: [usize; MAX_SLOTS] = [0; MAX_SLOTS];
    let mut fills: [u8; MAX_SLOTS] = [0; MAX_SLOTS];

    let mut i = 0;
    while i + 4 <= data.len() {
        let opcode = data[i] % 3;
        let size = u16::from_le_bytes([data[i + 1], data[i + 2]]) as usize;
        let slot = (data[i + 3] as usize) % MAX_SLOTS;
        let fill = data[i + 3] ^ 0x5F;
        i += 4;

        match opcode {
            0 => {
                // allocate
                if !slots[slot].is_null() {
                    unsafe { a.free(slots[slot]) };
                }
                let ptr = unsafe { a.allocate(size) };
                if size == 0 {
                    assert!(ptr.is_null(), "allocate(0) must return null");
                }
                if !ptr.is_null() {
                    assert_eq!(ptr as usize % 8, 0, "allocate({}) misaligned", size);
                    unsafe { std::ptr::write_bytes(ptr, fill, size) };
                }
                slots[slot] = ptr;
                sizes[slot] = if ptr.is_null() { 0 } else { size };
                fills[slot] = fill;
            }
            1 => {
                // free
                if !slots[slot].is_null() {
                    unsafe { a.free(slots[slot]) };
                    slots[slot] = std::ptr::null_mut();
                    sizes[slot] = 0;
                }
            }
            2 => {
                // reallocate
                if slots[slot].is_null() {
                    // reallocate(null, size) = allocate(size)
                    let ptr = unsafe { a.reallocate(std::ptr::null_mut(), size) };
                    if !ptr.is_null() {
                        unsafe { std::ptr::write_bytes(ptr, fill, size) };
                        slots[slot] = ptr;
                        sizes[slot] = size;
                        fills[slot] = fill;
                    }
                } else {
                    let old_size = sizes[slot];
                    let ptr = unsafe { a.reallocate(slots[slot], size) };
                    if ptr.is_null() {
                        // Rejected (size 0); the original stays valid.
                        assert_eq!(size, 0);
                        continue;
                    }
                    // The filled prefix must survive the move.
                    let check = old_size.min(size);
                    for j in 0..check {
                        assert_eq!(
                            unsafe { ptr.add(j).read() },
                            fills[slot],
                            "content lost at offset {} during reallocate",
                            j
                        );
                    }
                    // Repaint the whole tracked region so the next move
                    // can be checked end to end.
                    let tracked = old_size.max(size);
                    unsafe { std::ptr::write_bytes(ptr, fill, tracked) };
                    slots[slot] = ptr;
                    sizes[slot] = tracked;
                    fills[slot] = fill;
                }
            }
            _ => unreachable!(),
        }
    }

    assert!(a.validate(), "heap invalid after op sequence");

    // Cleanup
    for slot in &mut slots {
        if !slot.is_null() {
            unsafe { a.free(*slot) };
            *slot = std::ptr::null_mut();
        }
    }

    assert!(a.validate(), "heap invalid after final frees");
});
