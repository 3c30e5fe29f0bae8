use std::alloc::{GlobalAlloc, Layout, System};

/// Allocator that records every live heap block of a Rust program in the
/// process-wide ledger.  Use the `global_allocator` attribute to enable it:
///
/// ```
/// use leak_debug::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator;
///
/// fn main() {
///     leak_debug::start_with(leak_debug::LogPolicy::QUIET);
///     let b = leak_debug::at!(Box::new(42));
///     let address = &*b as *const i32 as usize;
///     assert_eq!(leak_debug::get_leaks().contains(address), leak_debug::ENABLED);
///     drop(b);
///     leak_debug::stop();
/// }
/// ```
///
/// Memory always comes from [`System`].  Built without the `tracking`
/// feature this is a plain pass-through.
pub struct TrackingAllocator;

#[cfg(feature = "tracking")]
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let reentry = match crate::guard::enter() {
            Some(reentry) => reentry,
            // Bookkeeping allocation, or alloc called during thread destruction.
            None => return System.alloc(layout),
        };
        let tracker = crate::facade::tracker();
        let provenance = crate::provenance::take();
        let ptr = System.alloc(layout);
        tracker.record_allocation(ptr, layout.size(), provenance, tracker.policy());
        drop(reentry);
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(reentry) = crate::guard::enter() {
            let tracker = crate::facade::tracker();
            let provenance = crate::provenance::take();
            tracker.record_deallocation(ptr, provenance, tracker.policy());
            drop(reentry);
        }
        System.dealloc(ptr, layout);
    }
}

#[cfg(not(feature = "tracking"))]
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        System.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        System.realloc(ptr, layout, new_size)
    }
}
