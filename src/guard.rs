//! Per-thread re-entrancy guard.
//!
//! The tracker allocates while it works (ledger nodes, snapshots, formatted
//! messages).  When the tracker is itself the allocator those allocations
//! come straight back into it; while the guard is held they are passed to
//! the real allocator untouched.

use std::cell::Cell;

thread_local! {
    // Flag used to detect nested calls to the allocator.
    static NESTED: Cell<bool> = const { Cell::new(false) };
}

/// Proof that the current thread is inside the tracker.  Dropping it leaves.
pub(crate) struct Reentry {
    _private: (),
}

impl Drop for Reentry {
    fn drop(&mut self) {
        let _ = NESTED.try_with(|nested| nested.set(false));
    }
}

/// Enters the tracker, or returns `None` if this thread is already inside it
/// or its thread-local storage has been torn down.
pub(crate) fn enter() -> Option<Reentry> {
    match NESTED.try_with(|nested| nested.replace(true)) {
        Ok(false) => Some(Reentry { _private: () }),
        // Either already nested, or the thread is being destroyed.
        _ => None,
    }
}

#[cfg(test)]
fn is_nested() -> bool {
    NESTED.try_with(Cell::get).unwrap_or(true)
}

/// Runs `f` with tracking suppressed on this thread: allocations it makes
/// through an intercepting allocator go straight to the real one.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _reentry = enter();
    f()
}

/// Entry point for allocator hooks.  Runs `tracked` with the guard held, or
/// `bypass` if this thread is already inside the tracker.
///
/// ```
/// let p = leak_debug::intercept(|| "real allocator", || "tracker");
/// assert_eq!(p, "tracker");
/// ```
pub fn intercept<T>(bypass: impl FnOnce() -> T, tracked: impl FnOnce() -> T) -> T {
    match enter() {
        Some(_reentry) => tracked(),
        None => bypass(),
    }
}
