#![no_main]

use libfuzzer_sys::fuzz_target;
use segfit::SegFit;

/// Fuzz target that reads a list of little-endian u16 sizes, allocates
/// them all, then frees them all, checking structural validity between
/// the phases. Exercises class routing and remainder redistribution
/// across arbitrary size mixes.
fuzz_target!(|data: &[u8]| {
    let mut a = SegFit::new();
    if !a.init() {
        return;
    }

    let mut live: Vec<*mut u8> = Vec::new();

    for chunk in data.chunks_exact(2) {
        let size = u16::from_le_bytes([chunk[0], chunk[1]]) as usize;
        let ptr = unsafe { a.allocate(size) };
        if size == 0 {
            assert!(ptr.is_null(), "allocate(0) must return null");
            continue;
        }
        if !ptr.is_null() {
            // Touch both ends of the payload.
            unsafe {
                ptr.write(0xA5);
                ptr.add(size - 1).write(0xA5);
            }
            live.push(ptr);
        }
    }

    assert!(a.validate(), "heap invalid after allocation phase");

    // Free in allocation order; LIFO list order is not a contract.
    for &ptr in &live {
        unsafe { a.free(ptr) };
    }

    assert!(a.validate(), "heap invalid after free phase");

    // The freed heap must still serve requests.
    let p = unsafe { a.allocate(32) };
    assert!(!p.is_null());
    assert!(a.validate());
});
