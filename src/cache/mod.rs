//! Dedup cache: fingerprint -> cache slot.
//! Slots are individually heap-allocated and shared by `Arc`, so a slot
//! handed to the output side stays valid while the input side keeps
//! inserting. Only the input side inserts; only the output side fills, and
//! each slot is filled at most once with bytes borrowed from the [`pool::Pool`].

pub mod pool;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::key::Fingerprint;

/// Cached output for one fingerprint. Empty until the wrapped program's
/// answer for the first line with this key has been read.
#[derive(Debug)]
pub struct CacheSlot<'a> {
    fingerprint: Fingerprint,
    value: OnceCell<&'a [u8]>,
}

/// Shared reference to a slot, as carried through the work queue.
pub type SlotRef<'a> = Arc<CacheSlot<'a>>;

impl<'a> CacheSlot<'a> {
    fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            value: OnceCell::new(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Cached output line, if already produced.
    pub fn get(&self) -> Option<&'a [u8]> {
        self.value.get().copied()
    }

    pub fn is_filled(&self) -> bool {
        self.value.get().is_some()
    }

    /// Fill the slot. Returns false if it was already filled, leaving the
    /// first value in place.
    pub fn fill(&self, line: &'a [u8]) -> bool {
        self.value.set(line).is_ok()
    }
}

/// Insert-only map from fingerprint to slot. Grows for the process lifetime.
#[derive(Debug, Default)]
pub struct DedupCache<'a> {
    slots: HashMap<Fingerprint, SlotRef<'a>>,
}

impl<'a> DedupCache<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for `fingerprint`, creating an empty one if absent.
    /// The flag is true when the slot was created by this call.
    pub fn lookup_or_insert(&mut self, fingerprint: Fingerprint) -> (SlotRef<'a>, bool) {
        let mut is_new = false;
        let slot = self.slots.entry(fingerprint).or_insert_with(|| {
            is_new = true;
            Arc::new(CacheSlot::new(fingerprint))
        });
        (Arc::clone(slot), is_new)
    }

    /// Number of distinct fingerprints seen.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::pool::Pool;
    use super::*;

    #[test]
    fn first_lookup_inserts_and_repeat_hits() {
        let mut cache = DedupCache::new();
        let (a, new_a) = cache.lookup_or_insert(1);
        let (b, new_b) = cache.lookup_or_insert(2);
        let (a2, new_a2) = cache.lookup_or_insert(1);

        assert!(new_a && new_b && !new_a2);
        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn slot_fills_exactly_once() {
        let pool = Pool::new();
        let mut cache = DedupCache::new();
        let (slot, _) = cache.lookup_or_insert(7);
        assert!(!slot.is_filled());

        assert!(slot.fill(pool.allocate_and_copy(b"first")));
        assert!(!slot.fill(pool.allocate_and_copy(b"second")));
        assert_eq!(slot.get(), Some(&b"first"[..]));
    }

    #[test]
    fn slot_reference_survives_growth() {
        let pool = Pool::new();
        let mut cache = DedupCache::new();
        let (held, _) = cache.lookup_or_insert(0);
        for fp in 1..10_000 {
            cache.lookup_or_insert(fp);
        }
        assert!(held.fill(pool.allocate_and_copy(b"x")));

        let (again, is_new) = cache.lookup_or_insert(0);
        assert!(!is_new);
        assert_eq!(again.fingerprint(), 0);
        assert_eq!(again.get(), Some(&b"x"[..]));
    }

    #[test]
    fn filled_slot_is_visible_from_another_thread() {
        let pool = Pool::new();
        let mut cache = DedupCache::new();
        std::thread::scope(|scope| {
            let cache = &mut cache;
            let inserter = scope.spawn(move || {
                let (slot, _) = cache.lookup_or_insert(42);
                for fp in 0..1000 {
                    cache.lookup_or_insert(fp);
                }
                slot
            });
            let slot = inserter.join().unwrap();
            assert!(slot.fill(pool.allocate_and_copy(b"answer")));
        });
        let (slot, is_new) = cache.lookup_or_insert(42);
        assert!(!is_new);
        assert_eq!(slot.get(), Some(&b"answer"[..]));
    }
}
