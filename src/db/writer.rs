//! Per-thread write handles.
//!
//! A writer belongs to exactly one thread (`Send` but not `Sync`); many
//! writers mutate the index concurrently. Each writer keeps a local list
//! of entries it tombstoned; the next snapshot harvests those lists into
//! its retirement batch.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::db::Db;
use crate::item::{EntryKey, Item};

#[derive(Default)]
pub(crate) struct WriterShared {
    /// Tombstoned entries awaiting harvest by the next snapshot. Locked
    /// only by the owning thread and the snapshot harvest.
    pub(crate) retired: Mutex<Vec<EntryKey>>,
}

pub struct Writer {
    db: Db,
    shared: Arc<WriterShared>,
    _single_thread: PhantomData<Cell<()>>,
}

impl Writer {
    pub(crate) fn new(db: Db, shared: Arc<WriterShared>) -> Self {
        Self {
            db,
            shared,
            _single_thread: PhantomData,
        }
    }

    /// Inserts a new version of the payload stamped with the current
    /// sequence. Returns `false` when a live version of the key already
    /// exists; that is a no-op, not an error. Tombstoned remains of older
    /// versions never block a put.
    pub fn put(&mut self, data: impl Into<Bytes>) -> bool {
        let seqno = self.db.inner.current_seqno();
        let item = Arc::new(Item::new(data.into(), seqno));
        let (_, inserted) = self.db.inner.index.insert(item);
        if inserted {
            self.db.inner.count.fetch_add(1, AtomicOrdering::Relaxed);
        }
        inserted
    }

    /// Newest live version for `key`, or `None` when the newest version is
    /// a tombstone.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Bytes> {
        self.get_item(key).map(|item| item.payload())
    }

    pub fn get_item(&self, key: impl AsRef<[u8]>) -> Option<Arc<Item>> {
        self.live_entry(key.as_ref())
            .map(|entry| Arc::clone(entry.item()))
    }

    /// Deletes the newest live version for `key`. Returns `false` when no
    /// live version exists or another writer won the tombstone race.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> bool {
        match self.live_entry(key.as_ref()) {
            Some(entry) => self.delete_entry(entry),
            None => false,
        }
    }

    fn live_entry(&self, key: &[u8]) -> Option<EntryKey> {
        let entry = self.db.inner.index.latest(key)?;
        if entry.item().dead_seqno() != 0 {
            return None;
        }
        Some(entry)
    }

    fn delete_entry(&mut self, entry: EntryKey) -> bool {
        let seqno = self.db.inner.current_seqno();

        // Born in the current sequence window: no snapshot can have seen
        // it, so it can be unlinked right away.
        if entry.item().born_seqno() == seqno {
            let removed = self.db.inner.index.remove(&entry);
            if removed {
                self.db.inner.count.fetch_sub(1, AtomicOrdering::Relaxed);
            }
            return removed;
        }

        if entry.item().mark_dead(seqno) {
            self.shared.retired.lock().push(entry);
            self.db.inner.count.fetch_sub(1, AtomicOrdering::Relaxed);
            return true;
        }
        false
    }
}
