//! The provenance store: the call site of the *next* allocation or
//! deallocation.
//!
//! Code that allocates through the global allocator cannot pass a location
//! to `GlobalAlloc::alloc`, so the location is stashed here immediately
//! before the call and consumed by the tracker when it services that call.
//! The slot is per thread, so a location stored on one thread can never be
//! attributed to an allocation made on another.  Within a thread there is
//! still no queue: a second store before the first is consumed overwrites it.

use std::{
    cell::Cell,
    fmt::{self, Display, Formatter},
    panic::Location,
};

/// A source location: file name and line number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Provenance {
    pub file: &'static str,
    pub line: u32,
}

impl Provenance {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Provenance { file, line }
    }

    /// The location of the caller of the enclosing `#[track_caller]`
    /// function.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for Provenance {
    fn from(location: &'static Location<'static>) -> Self {
        Provenance::new(location.file(), location.line())
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.file, self.line)
    }
}

/// Formats an optional provenance the way event messages print it.
pub(crate) struct Origin(pub Option<Provenance>);

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) if !p.file.is_empty() => p.fmt(f),
            _ => f.write_str("unknown"),
        }
    }
}

thread_local! {
    static STORED: Cell<Option<Provenance>> = const { Cell::new(None) };
}

/// Records `file` and `line` as the call site of the next allocation or
/// deallocation performed on this thread.
pub fn store_file_line(file: &'static str, line: u32) {
    store(Provenance::new(file, line));
}

pub fn store(provenance: Provenance) {
    // Ignore errors accessing the TLS when the thread is being destroyed.
    let _ = STORED.try_with(|slot| slot.set(Some(provenance)));
}

/// Reads and clears the stored call site.
pub fn take() -> Option<Provenance> {
    STORED.try_with(Cell::take).unwrap_or(None)
}

/// Reads the stored call site without clearing it.
pub fn peek() -> Option<Provenance> {
    STORED.try_with(Cell::get).unwrap_or(None)
}

/// Evaluates an expression after storing the current file and line as the
/// provenance of the first allocation it makes through the global
/// allocator.
///
/// ```
/// let boxed = leak_debug::at!(Box::new([0u8; 32]));
/// # drop(boxed);
/// ```
#[macro_export]
macro_rules! at {
    ($e:expr) => {{
        $crate::provenance::store_file_line(file!(), line!());
        $e
    }};
}
