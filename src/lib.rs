//! `leak_debug` keeps a ledger of every live heap block together with its size and the source
//! line that allocated it, so that whatever is still in the ledger at the end of a run is a leak
//! with a known origin.
//!
//! The tracker wraps an existing allocator.  It does not place blocks or manage fragmentation;
//! it observes each allocation and deallocation, updates its ledger, optionally logs the event,
//! and forwards the call.
//!
//! ## Tracking a Rust program
//!
//! Install [`TrackingAllocator`] as the global allocator and start tracking:
//!
//! ```
//! use leak_debug::{LogPolicy, TrackingAllocator};
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator;
//!
//! fn main() {
//!     leak_debug::start_with(LogPolicy::QUIET);
//!     let forgotten = leak_debug::at!(vec![0u8; 100]);
//!     std::mem::forget(forgotten);
//!     leak_debug::dump_leaks().unwrap();
//! }
//! ```
//!
//! `at!` stores the current file and line as the provenance of the next allocation on this
//! thread; allocations made without it are reported as `allocated by unknown`.  For explicit
//! allocation, [`tracked_alloc`] and [`tracked_free`] capture their caller's location
//! automatically.
//!
//! ## Tracking any program via `LD_PRELOAD`
//!
//! The companion `lib_leak_debug` crate builds `libleak_debug_preload.so`, which interposes
//! `malloc`, `realloc` and `free`:
//!
//! ```bash
//! LD_PRELOAD=libleak_debug_preload.so LEAK_DEBUG_DIR=leaks ./my_program
//! ```
//!
//! ## Viewing reports
//!
//! On exit the preload library writes `leak_debug.<pid>.yaml` (see [`write_report`] to do the
//! same from Rust).  View one or more of them with the `ld_print` tool from this crate:
//!
//! ```bash
//! ld_print --dir leaks --threshold 1
//! ```
//!
//! which lists every outstanding block, then groups the leaked bytes by call site, folding sites
//! below `threshold` percent of the total into a single line.
//!
//! ## Enabling and disabling
//!
//! Tracking is compiled in by the default `tracking` feature.  Without it [`TrackingAllocator`]
//! forwards straight to the system allocator, [`get_leaks`] returns an empty snapshot and
//! [`dump_leaks`] prints nothing; the API is otherwise identical.

mod alloc;
pub mod config;
pub mod error;
pub mod facade;
pub mod flags;
mod guard;
pub mod leak;
mod ledger;
pub mod provenance;
pub mod raw;
pub mod report;
pub mod tracker;

pub use crate::{
    alloc::TrackingAllocator,
    config::Config,
    error::{OutOfMemory, ReportError},
    facade::*,
    flags::{LogPolicy, OutputFlags},
    guard::{intercept, untracked},
    leak::Leak,
    ledger::Leaks,
    provenance::{store_file_line, Provenance},
    report::Report,
    tracker::{Deallocation, Tracker},
};

/// Whether this build intercepts allocations.
pub const ENABLED: bool = cfg!(feature = "tracking");
