//! Item: the multi-version value carrier.
//!
//! An item is a single opaque payload stamped with the sequence number that
//! created it (`born_seqno`) and, once deleted, the sequence number that
//! tombstoned it (`dead_seqno`). A snapshot taken at sequence `s` sees an
//! item iff `born_seqno <= s` and the item was not dead at `s`.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;

/// User-pluggable key comparator over item payloads.
///
/// The store orders whole payloads; a comparator that only inspects a key
/// prefix makes the remaining bytes an uninterpreted value.
pub type KeyComparator = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Byte-lexicographic comparison, the default order.
pub fn default_key_comparator() -> KeyComparator {
    Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}

#[derive(Debug)]
pub struct Item {
    data: Bytes,
    born_seqno: u32,
    dead_seqno: AtomicU32,
}

impl Item {
    pub(crate) fn new(data: Bytes, born_seqno: u32) -> Self {
        Self {
            data,
            born_seqno,
            dead_seqno: AtomicU32::new(0),
        }
    }

    /// Probe used for key-only seeks. `born_seqno` 0 sorts before every
    /// real version of the same key.
    pub(crate) fn probe(data: Bytes) -> Self {
        Self::new(data, 0)
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn payload(&self) -> Bytes {
        self.data.clone()
    }

    pub fn born_seqno(&self) -> u32 {
        self.born_seqno
    }

    pub fn dead_seqno(&self) -> u32 {
        self.dead_seqno.load(AtomicOrdering::SeqCst)
    }

    /// Tombstone transition. Succeeds only for the first deleter.
    pub(crate) fn mark_dead(&self, seqno: u32) -> bool {
        self.dead_seqno
            .compare_exchange(0, seqno, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_ok()
    }

    pub fn is_visible(&self, at_seqno: u32) -> bool {
        if self.born_seqno > at_seqno {
            return false;
        }
        let dead = self.dead_seqno();
        dead == 0 || dead > at_seqno
    }
}

/// Index entry: an item plus the comparator that orders it.
///
/// Entries order by `(comparator(payload), born_seqno)` so versions of one
/// key sit adjacent, oldest first. The `(payload, born_seqno)` pair is the
/// entry's identity; physical deletion removes exactly this pair.
#[derive(Clone)]
pub struct EntryKey {
    item: Arc<Item>,
    cmp: KeyComparator,
}

impl std::fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryKey").field("item", &self.item).finish()
    }
}

impl EntryKey {
    pub(crate) fn new(item: Arc<Item>, cmp: KeyComparator) -> Self {
        Self { item, cmp }
    }

    pub fn item(&self) -> &Arc<Item> {
        &self.item
    }
}

impl PartialEq for EntryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EntryKey {}

impl PartialOrd for EntryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.cmp)(self.item.bytes(), other.item.bytes()) {
            Ordering::Equal => self.item.born_seqno.cmp(&other.item.born_seqno),
            unequal => unequal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data: &'static [u8], born: u32) -> EntryKey {
        EntryKey::new(
            Arc::new(Item::new(Bytes::from_static(data), born)),
            default_key_comparator(),
        )
    }

    #[test]
    fn entry_ordering() {
        let a1 = entry(b"a", 1);
        let a5 = entry(b"a", 5);
        let b1 = entry(b"b", 1);

        assert!(a1 < a5);
        assert!(a5 < b1);
        assert_eq!(a1, entry(b"a", 1));
    }

    #[test]
    fn probe_sorts_before_every_version() {
        let probe = EntryKey::new(
            Arc::new(Item::probe(Bytes::from_static(b"a"))),
            default_key_comparator(),
        );
        assert!(probe < entry(b"a", 1));
        assert!(probe > entry(b"0", 9));
    }

    #[test]
    fn visibility_window() {
        let item = Item::new(Bytes::from_static(b"x"), 3);
        assert!(!item.is_visible(2));
        assert!(item.is_visible(3));
        assert!(item.is_visible(100));

        assert!(item.mark_dead(7));
        assert!(!item.mark_dead(9));
        assert!(item.is_visible(6));
        assert!(!item.is_visible(7));
    }
}
