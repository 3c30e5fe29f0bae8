use std::{
    collections::BTreeMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{guard, leak::Leak};

// Outstanding allocations keyed by address.
type LeakMap = BTreeMap<usize, Leak>;

/// Mapping from block address to [`Leak`] record.  Every mutation happens
/// under the mutex; callers are expected to hold the re-entrancy guard so
/// that map nodes are not themselves tracked.
pub(crate) struct Ledger {
    map: Mutex<LeakMap>,
}

impl Ledger {
    pub(crate) const fn new() -> Self {
        Ledger {
            map: Mutex::new(BTreeMap::new()),
        }
    }

    // A panic while the lock is held cannot leave the map half-updated, so
    // a poisoned lock is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LeakMap> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `leak`, returning any record it displaced.  A displaced record
    /// means the block was released behind the tracker's back.
    pub(crate) fn insert(&self, leak: Leak) -> Option<Leak> {
        self.lock().insert(leak.address(), leak)
    }

    pub(crate) fn remove(&self, address: usize) -> Option<Leak> {
        self.lock().remove(&address)
    }

    pub(crate) fn snapshot(&self) -> Leaks {
        Leaks {
            map: self.lock().clone(),
        }
    }
}

/// An immutable snapshot of outstanding allocations, ordered by address.
///
/// The snapshot's storage is allocated and released with tracking
/// suppressed, so taking one never shows up in the ledger it describes.
#[derive(Default, PartialEq)]
pub struct Leaks {
    map: LeakMap,
}

impl Leaks {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&Leak> {
        self.map.get(&address)
    }

    pub fn contains(&self, address: usize) -> bool {
        self.map.contains_key(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Leak> + '_ {
        self.map.values()
    }

    /// Total number of bytes still outstanding.
    pub fn total_bytes(&self) -> usize {
        self.map.values().map(Leak::size).sum()
    }

    pub fn to_vec(&self) -> Vec<Leak> {
        self.map.values().cloned().collect()
    }
}

impl Clone for Leaks {
    fn clone(&self) -> Self {
        guard::untracked(|| Leaks {
            map: self.map.clone(),
        })
    }
}

impl Drop for Leaks {
    fn drop(&mut self) {
        let map = std::mem::take(&mut self.map);
        guard::untracked(move || drop(map));
    }
}

impl fmt::Debug for Leaks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.map.values()).finish()
    }
}

impl<'a> IntoIterator for &'a Leaks {
    type Item = &'a Leak;
    type IntoIter = std::collections::btree_map::Values<'a, usize, Leak>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.values()
    }
}
