use crate::util::DEFAULT_RESERVE_BYTES;
use core::ffi::CStr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Config cache, filled once at init so later reads stay allocation-free.
static RESERVE_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_RESERVE_BYTES);

/// Read configuration from environment variables. Called during
/// `SegFit::init`, before the segment is mapped.
///
/// # Safety
/// `libc::getenv` is not thread-safe; callers must not race with
/// `setenv` in another thread.
pub unsafe fn read_config() {
    if let Some(bytes) = getenv_usize(c"SEGFIT_RESERVE_BYTES") {
        if bytes > 0 {
            RESERVE_BYTES.store(bytes, Ordering::Relaxed);
        }
    }
}

/// Size of the virtual reservation backing each heap segment.
pub fn reserve_bytes() -> usize {
    RESERVE_BYTES.load(Ordering::Relaxed)
}

/// Look up `name` in the environment and decode it as a decimal usize.
/// Unset, empty, non-numeric and overflowing values all yield `None`,
/// leaving the compiled-in default in force.
///
/// # Safety
/// Calls libc::getenv.
unsafe fn getenv_usize(name: &CStr) -> Option<usize> {
    let raw = libc::getenv(name.as_ptr());
    if raw.is_null() {
        return None;
    }
    let bytes = CStr::from_ptr(raw).to_bytes();
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0usize, |acc, &b| {
        let digit = b.checked_sub(b'0').filter(|d| *d < 10)?;
        acc.checked_mul(10)?.checked_add(digit as usize)
    })
}
