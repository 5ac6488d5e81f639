//! CPU cache maintenance for table memory shared with the hardware walker.

use core::sync::atomic::{Ordering, fence};

/// Publishes `data` to the hardware table walker.
///
/// Must be issued after writing table memory and before the directory entry
/// or register write that makes the memory reachable; the walker must never
/// observe a link to lines still dirty in the CPU cache. On silicon this is
/// a clean of the covered lines to the point of coherency; the release fence
/// keeps the ordering contract for the register-image backends.
pub fn clean_for_device<T: ?Sized>(data: &T) {
    let _ = data;
    fence(Ordering::Release);
}
