//! Ordered-index collaborator backed by `crossbeam_skiplist::SkipMap`.
//!
//! The index is a concurrent ordered multi-set of [`EntryKey`]s. Insertion
//! order is `(key, born_seqno)`, so multiple versions of one key coexist and
//! iterate oldest-first. Removal is by exact entry identity, which is what
//! the reclamation pipeline needs: a tombstoned version is deleted without
//! disturbing its neighbours.
//!
//! Memory accounting is approximate: a fixed per-node overhead plus an
//! optional item-size function installed by the database (omitted when the
//! configuration asks to ignore item sizes).

use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;

use crate::item::{EntryKey, Item, KeyComparator};

mod builder;

pub use builder::{IndexBuilder, ItemCallback, Segment};

pub(crate) type MapEntry<'a> = crossbeam_skiplist::map::Entry<'a, EntryKey, ()>;

pub type ItemSizeFn = Box<dyn Fn(&Item) -> usize + Send + Sync>;

/// Fixed per-entry cost charged regardless of payload: tower links, entry
/// key, refcounts.
const NODE_OVERHEAD: u64 = 48;

pub struct SkipIndex {
    map: SkipMap<EntryKey, ()>,
    cmp: KeyComparator,
    bytes: AtomicU64,
    item_size: RwLock<Option<ItemSizeFn>>,
}

impl SkipIndex {
    pub fn new(cmp: KeyComparator) -> Self {
        Self {
            map: SkipMap::new(),
            cmp,
            bytes: AtomicU64::new(0),
            item_size: RwLock::new(None),
        }
    }

    pub fn set_item_size_fn(&self, f: ItemSizeFn) {
        *self.item_size.write() = Some(f);
    }

    fn entry_cost(&self, item: &Item) -> u64 {
        let payload = match &*self.item_size.read() {
            Some(f) => f(item) as u64,
            None => 0,
        };
        NODE_OVERHEAD + payload
    }

    /// Inserts `item` unless a live entry with the same key exists,
    /// whatever its `born_seqno`; tombstoned occurrences never block an
    /// insert. Returns the blocking or new entry and whether this call
    /// inserted it. A duplicate is not an error; the caller sees `false`.
    pub fn insert(&self, item: Arc<Item>) -> (EntryKey, bool) {
        // The newest version decides: older versions of a key are
        // necessarily tombstoned, so one liveness check covers the run.
        if let Some(existing) = self.latest(item.bytes()) {
            if existing.item().dead_seqno() == 0 {
                return (existing, false);
            }
        }

        let key = EntryKey::new(item, Arc::clone(&self.cmp));
        let entry = self.map.get_or_insert(key.clone(), ());
        let inserted = Arc::ptr_eq(entry.key().item(), key.item());
        if inserted {
            self.bytes
                .fetch_add(self.entry_cost(key.item()), AtomicOrdering::Relaxed);
        }
        (entry.key().clone(), inserted)
    }

    /// Physically removes the entry with this exact identity. Safe under
    /// concurrent readers: iterators positioned on the node keep a
    /// reference until they move on.
    pub fn remove(&self, key: &EntryKey) -> bool {
        match self.map.remove(key) {
            Some(removed) => {
                self.bytes.fetch_sub(
                    self.entry_cost(removed.key().item()),
                    AtomicOrdering::Relaxed,
                );
                true
            }
            None => false,
        }
    }

    pub(crate) fn probe(&self, data: Bytes) -> EntryKey {
        EntryKey::new(Arc::new(Item::probe(data)), Arc::clone(&self.cmp))
    }

    pub(crate) fn front(&self) -> Option<MapEntry<'_>> {
        self.map.front()
    }

    pub(crate) fn seek(&self, key: &[u8]) -> Option<MapEntry<'_>> {
        let probe = self.probe(Bytes::copy_from_slice(key));
        self.map.lower_bound(Bound::Included(&probe))
    }

    /// Newest version of `key`: the last entry in the equal-key run, alive
    /// or not. Callers decide what a tombstone means to them.
    pub fn latest(&self, key: &[u8]) -> Option<EntryKey> {
        let mut cur = self.seek(key)?;
        if (self.cmp)(cur.key().item().bytes(), key) != std::cmp::Ordering::Equal {
            return None;
        }
        loop {
            match cur.next() {
                Some(next)
                    if (self.cmp)(next.key().item().bytes(), key) == std::cmp::Ordering::Equal =>
                {
                    cur = next;
                }
                _ => break,
            }
        }
        Some(cur.key().clone())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Up to `shards - 1` keys that roughly equipartition the index, in
    /// ascending order. Linear in the entry count; callers use it to set up
    /// a full scan anyway.
    pub fn split_keys(&self, shards: usize) -> Vec<EntryKey> {
        if shards <= 1 {
            return Vec::new();
        }
        let len = self.map.len();
        let step = len / shards;
        if step == 0 {
            return Vec::new();
        }

        let mut pivots = Vec::with_capacity(shards - 1);
        for (i, entry) in self.map.iter().enumerate() {
            if i > 0 && i % step == 0 {
                pivots.push(entry.key().clone());
                if pivots.len() == shards - 1 {
                    break;
                }
            }
        }
        pivots
    }

    pub fn memory_in_use(&self) -> u64 {
        self.bytes.load(AtomicOrdering::Relaxed)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.map.len() as u64,
            bytes: self.memory_in_use(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: u64,
    pub bytes: u64,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entries={} bytes={}", self.entries, self.bytes)
    }
}
