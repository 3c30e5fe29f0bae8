//! The allocation interceptor.
//!
//! A [`Tracker`] wraps a [`RawAlloc`], keeps the ledger of outstanding
//! blocks and writes event lines to its two sinks according to a
//! [`LogPolicy`].  The process-wide instance lives in [`crate::facade`];
//! tests and embedders can create their own.

use std::{
    fmt,
    io::{self, Write},
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Mutex, PoisonError,
    },
};

use crate::{
    config::Config,
    error::OutOfMemory,
    flags::{LogPolicy, OutputFlags},
    guard,
    leak::Leak,
    ledger::{Ledger, Leaks},
    provenance::{self, Origin, Provenance},
    raw::{Malloc, RawAlloc},
};

/// Destination for event lines.
pub type Sink = Box<dyn Write + Send>;

// One of the two event streams.
enum Output {
    // Written without a lock of our own: stderr's lock is reentrant, and the
    // thread allocating may already hold it.
    Stderr,
    Writer(Mutex<Sink>),
}

impl Output {
    fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Output::Writer(Mutex::new(Box::new(writer)))
    }

    fn write_line(&self, message: fmt::Arguments<'_>) -> io::Result<()> {
        match self {
            Output::Stderr => writeln!(io::stderr(), "{}", message),
            Output::Writer(sink) => {
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(sink, "{}", message)
            }
        }
    }
}

/// What a deallocation found in the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deallocation {
    /// The null pointer; nothing was released.
    Null,
    /// The block was tracked; this is the record that was removed.
    Tracked(Leak),
    /// The block was not in the ledger: it was allocated elsewhere, before
    /// tracking started, or it has already been freed.  It was still passed
    /// to the real allocator.
    Untracked,
}

impl Deallocation {
    pub fn is_tracked(&self) -> bool {
        matches!(self, Deallocation::Tracked(_))
    }
}

pub struct Tracker<R = Malloc> {
    raw: R,
    ledger: Ledger,
    active: AtomicBool,
    routine_flags: AtomicU8,
    error_flags: AtomicU8,
    routine: Output,
    error: Output,
}

impl Tracker<Malloc> {
    /// An active tracker over the C allocator, logging with the default
    /// policy to stderr.
    pub fn new() -> Self {
        Self::with_raw(Malloc)
    }
}

impl Default for Tracker<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawAlloc> Tracker<R> {
    pub fn with_raw(raw: R) -> Self {
        let policy = LogPolicy::default();
        Tracker {
            raw,
            ledger: Ledger::new(),
            active: AtomicBool::new(true),
            routine_flags: AtomicU8::new(policy.routine.bits()),
            error_flags: AtomicU8::new(policy.error.bits()),
            routine: Output::Stderr,
            error: Output::Stderr,
        }
    }

    pub fn with_config(raw: R, config: &Config) -> Self {
        let tracker = Self::with_raw(raw).with_policy(config.policy);
        tracker.active.store(config.active, Ordering::Release);
        tracker
    }

    pub fn with_policy(self, policy: LogPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    pub fn with_sinks<W, E>(mut self, routine: W, error: E) -> Self
    where
        W: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        self.routine = Output::writer(routine);
        self.error = Output::writer(error);
        self
    }

    pub fn raw(&self) -> &R {
        &self.raw
    }

    /// Start recording allocations.
    pub fn start(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Start recording allocations, logging with `policy` by default.
    pub fn start_with(&self, policy: LogPolicy) {
        self.set_policy(policy);
        self.start();
    }

    /// Stop recording allocations.  Blocks freed while stopped are still
    /// removed from the ledger.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_on(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The default policy.
    pub fn policy(&self) -> LogPolicy {
        LogPolicy::new(
            OutputFlags::from_bits_truncate(self.routine_flags.load(Ordering::Relaxed)),
            OutputFlags::from_bits_truncate(self.error_flags.load(Ordering::Relaxed)),
        )
    }

    pub fn set_policy(&self, policy: LogPolicy) {
        self.routine_flags.store(policy.routine.bits(), Ordering::Relaxed);
        self.error_flags.store(policy.error.bits(), Ordering::Relaxed);
    }

    /// Allocates `size` bytes, attributing the block to the stored
    /// provenance.
    pub fn allocate(&self, size: usize, policy: LogPolicy) -> Result<NonNull<u8>, OutOfMemory> {
        NonNull::new(self.allocate_or_null(size, policy)).ok_or(OutOfMemory { size })
    }

    /// Like [`Tracker::allocate`], but returns null when the real allocator
    /// fails.  Zero-sized requests are forwarded as is.
    pub fn allocate_or_null(&self, size: usize, policy: LogPolicy) -> *mut u8 {
        let provenance = provenance::take();
        let ptr = unsafe { self.raw.malloc(size) };
        self.record_allocation(ptr, size, provenance, policy);
        ptr
    }

    /// Releases `ptr` through the real allocator, whether or not it is
    /// tracked.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this tracker's raw allocator.
    pub unsafe fn deallocate(&self, ptr: *mut u8, policy: LogPolicy) -> Deallocation {
        let provenance = provenance::take();
        let outcome = self.record_deallocation(ptr, provenance, policy);
        // The record is gone before the address can be handed out again.
        if !ptr.is_null() {
            self.raw.free(ptr);
        }
        outcome
    }

    /// Resizes `ptr` with `realloc` semantics, moving its ledger record to
    /// the new address.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this tracker's raw allocator.
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize, policy: LogPolicy) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate_or_null(size, policy);
        }
        let provenance = provenance::take();
        let on = self.is_on();

        guard::untracked(|| {
            // Held across `realloc` so the old address cannot be reused and
            // recorded by another thread before its record is gone.
            let mut ledger = self.ledger.lock();
            let old = ledger.remove(&(ptr as usize));
            let new = self.raw.realloc(ptr, size);

            if new.is_null() && size != 0 {
                // Failed; the original block is untouched.
                if let Some(old) = old {
                    ledger.insert(old.address(), old);
                }
                drop(ledger);
                if on {
                    self.log_failure(size, provenance, policy);
                }
                return new;
            }
            let leak = if new.is_null() || !on {
                None
            } else {
                let leak = Leak::new(new as usize, size, provenance);
                ledger.insert(leak.address(), leak.clone());
                Some(leak)
            };
            drop(ledger);

            if on {
                self.log_release(ptr, old.as_ref(), provenance, policy);
                if let Some(leak) = leak {
                    self.emit(policy, OutputFlags::SUCCESSFUL_ALLOCATIONS, format_args!("{}", leak));
                }
            }
            new
        })
    }

    /// Books an allocation the caller has already made.  A null `ptr` is
    /// logged as a failed allocation of `size` bytes.
    pub fn record_allocation(
        &self,
        ptr: *mut u8,
        size: usize,
        provenance: Option<Provenance>,
        policy: LogPolicy,
    ) {
        if !self.is_on() {
            return;
        }
        guard::untracked(|| {
            if ptr.is_null() {
                self.log_failure(size, provenance, policy);
                return;
            }
            let leak = Leak::new(ptr as usize, size, provenance);
            self.emit(policy, OutputFlags::SUCCESSFUL_ALLOCATIONS, format_args!("{}", leak));
            self.ledger.insert(leak);
        })
    }

    /// Books a deallocation the caller is about to make.  Must be called
    /// before the block is returned to the real allocator.
    pub fn record_deallocation(
        &self,
        ptr: *mut u8,
        provenance: Option<Provenance>,
        policy: LogPolicy,
    ) -> Deallocation {
        let on = self.is_on();
        guard::untracked(|| {
            if ptr.is_null() {
                if on {
                    self.emit(
                        policy,
                        OutputFlags::DEALLOCATIONS,
                        format_args!("Null pointer deallocated by {}", Origin(provenance)),
                    );
                }
                return Deallocation::Null;
            }
            let removed = self.ledger.remove(ptr as usize);
            if on {
                self.log_release(ptr, removed.as_ref(), provenance, policy);
            }
            match removed {
                Some(leak) => Deallocation::Tracked(leak),
                None => Deallocation::Untracked,
            }
        })
    }

    /// A snapshot of the outstanding allocations.
    pub fn leaks(&self) -> Leaks {
        guard::untracked(|| self.ledger.snapshot())
    }

    /// Writes one line per outstanding allocation to `out`.
    pub fn dump_leaks_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let leaks = self.leaks();
        for leak in leaks.iter() {
            writeln!(out, "{}", leak)?;
        }
        out.flush()
    }

    fn log_failure(&self, size: usize, provenance: Option<Provenance>, policy: LogPolicy) {
        self.emit(
            policy,
            OutputFlags::FAILED_ALLOCATIONS,
            format_args!("FAILED ALLOCATION of {} bytes by {}", size, Origin(provenance)),
        );
    }

    fn log_release(
        &self,
        ptr: *mut u8,
        removed: Option<&Leak>,
        provenance: Option<Provenance>,
        policy: LogPolicy,
    ) {
        match removed {
            Some(leak) => self.emit(
                policy,
                OutputFlags::DEALLOCATIONS,
                format_args!("{} deallocated by {}", leak, Origin(provenance)),
            ),
            None => self.emit(
                policy,
                OutputFlags::DEALLOCATIONS,
                format_args!(
                    "Pointer to unallocated memory at {:p} deallocated by {}",
                    ptr,
                    Origin(provenance)
                ),
            ),
        }
    }

    // Sink write errors are dropped: logging must never fail an allocation.
    fn emit(&self, policy: LogPolicy, category: OutputFlags, message: fmt::Arguments<'_>) {
        if policy.routine.contains(category) {
            let _ = self.routine.write_line(message);
        }
        if policy.error.contains(category) {
            let _ = self.error.write_line(message);
        }
    }
}

impl<R> fmt::Debug for Tracker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("outstanding", &self.ledger.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    const QUIET: LogPolicy = LogPolicy::QUIET;

    /// Sink that can be read back after the tracker has written to it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Counts real frees, and refuses allocations above a limit.
    #[derive(Default)]
    struct CountingAlloc {
        frees: AtomicUsize,
        limit: Option<usize>,
    }

    unsafe impl RawAlloc for CountingAlloc {
        unsafe fn malloc(&self, size: usize) -> *mut u8 {
            match self.limit {
                Some(limit) if size > limit => ptr::null_mut(),
                _ => Malloc.malloc(size),
            }
        }

        unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
            match self.limit {
                Some(limit) if size > limit => ptr::null_mut(),
                _ => Malloc.realloc(ptr, size),
            }
        }

        unsafe fn free(&self, ptr: *mut u8) {
            self.frees.fetch_add(1, Ordering::SeqCst);
            // Only release blocks the allocator really handed out.
            if !ptr.is_null() && ptr as usize > 0x10000 {
                Malloc.free(ptr)
            }
        }
    }

    fn captured<R: RawAlloc>(raw: R) -> (Tracker<R>, SharedBuffer, SharedBuffer) {
        let routine = SharedBuffer::default();
        let error = SharedBuffer::default();
        let tracker = Tracker::with_raw(raw).with_sinks(routine.clone(), error.clone());
        (tracker, routine, error)
    }

    #[test]
    fn allocation_is_recorded_with_stored_provenance() {
        let tracker = Tracker::new().with_sinks(io::sink(), io::sink());

        provenance::store_file_line("a.c", 10);
        let first = tracker.allocate(64, QUIET).unwrap();
        let leaks = tracker.leaks();
        assert_eq!(leaks.len(), 1);
        let leak = leaks.get(first.as_ptr() as usize).unwrap();
        assert_eq!(leak.size(), 64);
        assert_eq!(leak.file(), Some("a.c"));
        assert_eq!(leak.line(), 10);

        provenance::store_file_line("b.c", 20);
        let second = tracker.allocate(128, QUIET).unwrap();
        assert_eq!(tracker.leaks().len(), 2);

        let outcome = unsafe { tracker.deallocate(first.as_ptr(), QUIET) };
        assert!(outcome.is_tracked());
        let leaks = tracker.leaks();
        assert_eq!(leaks.len(), 1);
        assert!(!leaks.contains(first.as_ptr() as usize));

        let mut out = Vec::new();
        tracker.dump_leaks_to(&mut out).unwrap();
        let expected = format!(
            "128 bytes at {:#x} allocated by b.c(20)\n",
            second.as_ptr() as usize
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);

        unsafe { tracker.deallocate(second.as_ptr(), QUIET) };
        assert!(tracker.leaks().is_empty());
    }

    #[test]
    fn allocation_without_provenance_is_unknown() {
        let tracker = Tracker::new().with_sinks(io::sink(), io::sink());
        provenance::take();
        let p = tracker.allocate(8, QUIET).unwrap();
        let leaks = tracker.leaks();
        let leak = leaks.get(p.as_ptr() as usize).unwrap();
        assert_eq!(leak.file(), None);
        assert_eq!(leak.line(), 0);
        assert!(leak.to_string().ends_with("allocated by unknown"));
        unsafe { tracker.deallocate(p.as_ptr(), QUIET) };
    }

    #[test]
    fn provenance_is_consumed_by_one_allocation() {
        let tracker = Tracker::new().with_sinks(io::sink(), io::sink());
        provenance::store_file_line("once.rs", 3);
        let a = tracker.allocate(1, QUIET).unwrap();
        let b = tracker.allocate(1, QUIET).unwrap();
        let leaks = tracker.leaks();
        assert_eq!(leaks.get(a.as_ptr() as usize).unwrap().file(), Some("once.rs"));
        assert_eq!(leaks.get(b.as_ptr() as usize).unwrap().file(), None);
        unsafe {
            tracker.deallocate(a.as_ptr(), QUIET);
            tracker.deallocate(b.as_ptr(), QUIET);
        }
    }

    #[test]
    fn double_free_leaves_ledger_alone() {
        let (tracker, routine, _) = captured(CountingAlloc::default());
        let policy = LogPolicy::new(OutputFlags::DEALLOCATIONS, OutputFlags::NONE);
        provenance::take();

        let p = tracker.allocate(32, QUIET).unwrap().as_ptr();
        let keep = tracker.allocate(16, QUIET).unwrap().as_ptr();
        // Pretend the block was freed already so the real allocator is not
        // asked to release it twice.
        let first = tracker.record_deallocation(p, None, policy);
        assert!(first.is_tracked());
        unsafe { tracker.raw().free(p) };

        let second = tracker.record_deallocation(p, Some(Provenance::new("x.rs", 9)), policy);
        assert_eq!(second, Deallocation::Untracked);
        assert_eq!(tracker.leaks().len(), 1);
        assert!(tracker.leaks().contains(keep as usize));
        assert_eq!(tracker.raw().frees.load(Ordering::SeqCst), 1);

        let log = routine.contents();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("32 bytes at "));
        assert!(lines[0].ends_with("allocated by unknown deallocated by unknown"));
        assert_eq!(
            lines[1],
            format!("Pointer to unallocated memory at {:p} deallocated by x.rs(9)", p)
        );

        unsafe { tracker.deallocate(keep, QUIET) };
    }

    #[test]
    fn untracked_free_is_forwarded() {
        let (tracker, _, _) = captured(CountingAlloc::default());
        let foreign = 0x1000 as *mut u8;
        let outcome = unsafe { tracker.deallocate(foreign, QUIET) };
        assert_eq!(outcome, Deallocation::Untracked);
        assert_eq!(tracker.raw().frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_free_is_a_no_op() {
        let (tracker, routine, error) = captured(CountingAlloc::default());
        provenance::store_file_line("n.rs", 4);
        let outcome = unsafe { tracker.deallocate(ptr::null_mut(), LogPolicy::new(OutputFlags::ALL, OutputFlags::NONE)) };
        assert_eq!(outcome, Deallocation::Null);
        assert_eq!(tracker.raw().frees.load(Ordering::SeqCst), 0);
        assert_eq!(routine.contents(), "Null pointer deallocated by n.rs(4)\n");
        assert_eq!(error.contents(), "");
    }

    #[test]
    fn failed_allocation_signals_or_returns_null() {
        let raw = CountingAlloc {
            limit: Some(1024),
            ..CountingAlloc::default()
        };
        let (tracker, routine, error) = captured(raw);

        provenance::store_file_line("big.rs", 77);
        let err = tracker.allocate(4096, LogPolicy::default()).unwrap_err();
        assert_eq!(err, OutOfMemory { size: 4096 });
        assert_eq!(err.to_string(), "out of memory: failed to allocate 4096 bytes");

        let null = tracker.allocate_or_null(2048, LogPolicy::default());
        assert!(null.is_null());
        assert!(tracker.leaks().is_empty());

        assert_eq!(routine.contents(), "");
        assert_eq!(
            error.contents(),
            "FAILED ALLOCATION of 4096 bytes by big.rs(77)\n\
             FAILED ALLOCATION of 2048 bytes by unknown\n"
        );
    }

    #[test]
    fn policy_routes_categories_to_sinks() {
        let (tracker, routine, error) = captured(Malloc);
        let policy = LogPolicy::new(OutputFlags::SUCCESSFUL_ALLOCATIONS, OutputFlags::DEALLOCATIONS);

        provenance::store_file_line("r.rs", 1);
        let p = tracker.allocate(5, policy).unwrap().as_ptr();
        provenance::store_file_line("r.rs", 2);
        unsafe { tracker.deallocate(p, policy) };

        let line = format!("5 bytes at {:#x} allocated by r.rs(1)", p as usize);
        assert_eq!(routine.contents(), format!("{}\n", line));
        assert_eq!(error.contents(), format!("{} deallocated by r.rs(2)\n", line));
    }

    #[test]
    fn zero_size_passes_through() {
        let tracker = Tracker::new().with_sinks(io::sink(), io::sink());
        let p = tracker.allocate_or_null(0, QUIET);
        let leaks = tracker.leaks();
        if p.is_null() {
            assert!(leaks.is_empty());
        } else {
            assert_eq!(leaks.get(p as usize).map(Leak::size), Some(0));
            unsafe { tracker.deallocate(p, QUIET) };
        }
        assert!(tracker.leaks().is_empty());
    }

    #[test]
    fn stopped_tracker_forwards_without_recording() {
        let (tracker, routine, _) = captured(Malloc);
        let policy = LogPolicy::new(OutputFlags::ALL, OutputFlags::NONE);

        let tracked = tracker.allocate(10, policy).unwrap().as_ptr();
        tracker.stop();
        assert!(!tracker.is_on());
        let untracked = tracker.allocate(20, policy).unwrap().as_ptr();
        assert_eq!(tracker.leaks().len(), 1);

        // Frees while stopped still clear the record.
        let outcome = unsafe { tracker.deallocate(tracked, policy) };
        assert!(outcome.is_tracked());
        assert!(tracker.leaks().is_empty());
        assert_eq!(routine.contents().lines().count(), 1);

        tracker.start_with(LogPolicy::QUIET);
        assert!(tracker.is_on());
        assert_eq!(tracker.policy(), LogPolicy::QUIET);
        unsafe { tracker.deallocate(untracked, QUIET) };
    }

    #[test]
    fn reallocate_moves_the_record() {
        let tracker = Tracker::new().with_sinks(io::sink(), io::sink());
        provenance::store_file_line("grow.rs", 1);
        let p = tracker.allocate(16, QUIET).unwrap().as_ptr();
        provenance::store_file_line("grow.rs", 2);
        let q = unsafe { tracker.reallocate(p, 1 << 20, QUIET) };
        assert!(!q.is_null());

        let leaks = tracker.leaks();
        assert_eq!(leaks.len(), 1);
        let leak = leaks.get(q as usize).unwrap();
        assert_eq!(leak.size(), 1 << 20);
        assert_eq!(leak.line(), 2);

        let r = unsafe { tracker.reallocate(ptr::null_mut(), 4, QUIET) };
        assert_eq!(tracker.leaks().len(), 2);
        unsafe {
            tracker.deallocate(q, QUIET);
            tracker.deallocate(r, QUIET);
        }
        assert!(tracker.leaks().is_empty());
    }

    #[test]
    fn failed_reallocate_keeps_the_original() {
        let raw = CountingAlloc {
            limit: Some(64),
            ..CountingAlloc::default()
        };
        let (tracker, _, error) = captured(raw);
        let p = tracker.allocate(32, QUIET).unwrap().as_ptr();
        let q = unsafe { tracker.reallocate(p, 128, LogPolicy::default()) };
        assert!(q.is_null());
        assert!(tracker.leaks().contains(p as usize));
        assert_eq!(error.contents(), "FAILED ALLOCATION of 128 bytes by unknown\n");
        unsafe { tracker.deallocate(p, QUIET) };
    }

    #[test]
    fn concurrent_allocations_keep_their_own_provenance() {
        let tracker = Arc::new(Tracker::new().with_sinks(io::sink(), io::sink()));
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let mut blocks = Vec::new();
                    for _ in 0..100 {
                        provenance::store_file_line("worker.rs", i);
                        let p = tracker.allocate(i as usize + 1, QUIET).unwrap();
                        blocks.push(p.as_ptr() as usize);
                    }
                    blocks
                })
            })
            .collect();
        let blocks: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let leaks = tracker.leaks();
        assert_eq!(leaks.len(), 800);
        for (i, addresses) in blocks.iter().enumerate() {
            for address in addresses {
                let leak = leaks.get(*address).unwrap();
                assert_eq!(leak.line() as usize, i);
                assert_eq!(leak.size(), i + 1);
            }
        }
        drop(leaks);
        for address in blocks.iter().flatten() {
            unsafe { tracker.deallocate(*address as *mut u8, QUIET) };
        }
        assert!(tracker.leaks().is_empty());
    }

    #[test]
    fn stderr_logging_while_another_thread_holds_stderr() {
        let tracker = Arc::new(Tracker::new());
        let policy = LogPolicy::new(OutputFlags::SUCCESSFUL_ALLOCATIONS, OutputFlags::NONE);
        let (done, finished) = std::sync::mpsc::channel();
        let locked = Arc::new(std::sync::Barrier::new(2));

        let holder = {
            let (tracker, done, locked) = (tracker.clone(), done.clone(), locked.clone());
            std::thread::spawn(move || {
                let stderr = io::stderr();
                let _lock = stderr.lock();
                locked.wait();
                // Let the other thread get stuck on stderr inside the tracker first.
                std::thread::sleep(std::time::Duration::from_millis(50));
                let p = tracker.allocate(8, policy).unwrap();
                let _ = done.send(p.as_ptr() as usize);
            })
        };
        let writer = {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                locked.wait();
                let p = tracker.allocate(8, policy).unwrap();
                let _ = done.send(p.as_ptr() as usize);
            })
        };

        let timeout = std::time::Duration::from_secs(5);
        let first = finished.recv_timeout(timeout).expect("allocation blocked on stderr");
        let second = finished.recv_timeout(timeout).expect("allocation blocked on stderr");
        writer.join().unwrap();
        holder.join().unwrap();

        assert_eq!(tracker.leaks().len(), 2);
        unsafe {
            tracker.deallocate(first as *mut u8, QUIET);
            tracker.deallocate(second as *mut u8, QUIET);
        }
    }
}
