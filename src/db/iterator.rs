//! Snapshot-filtered iteration.
//!
//! Yield order: ascending key, and within one key ascending version. The
//! iterator silently advances past entries the snapshot cannot see, so
//! callers only ever observe the visible multi-set. Holding an iterator
//! keeps one snapshot reference; dropping it releases the reference.

use std::sync::Arc;

use bytes::Bytes;

use crate::db::Snapshot;
use crate::index::{MapEntry, SkipIndex};
use crate::item::{EntryKey, Item};

pub struct DbIterator<'a> {
    index: &'a SkipIndex,
    snap: Arc<Snapshot>,
    entry: Option<MapEntry<'a>>,
}

impl<'a> DbIterator<'a> {
    pub(crate) fn new(index: &'a SkipIndex, snap: Arc<Snapshot>) -> Self {
        Self {
            index,
            snap,
            entry: None,
        }
    }

    pub fn seek_to_first(&mut self) {
        self.entry = self.index.front();
        self.skip_invisible();
    }

    /// Positions at the first visible entry whose key is >= `key`.
    pub fn seek(&mut self, key: impl AsRef<[u8]>) {
        self.entry = self.index.seek(key.as_ref());
        self.skip_invisible();
    }

    pub fn valid(&self) -> bool {
        self.entry.is_some()
    }

    pub fn item(&self) -> Option<Arc<Item>> {
        self.entry
            .as_ref()
            .map(|entry| Arc::clone(entry.key().item()))
    }

    pub fn advance(&mut self) {
        let next = self.entry.as_ref().and_then(|entry| entry.next());
        self.entry = next;
        self.skip_invisible();
    }

    /// Current payload, then advance. `None` once the iterator runs off
    /// the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Bytes> {
        let payload = self
            .entry
            .as_ref()
            .map(|entry| entry.key().item().payload())?;
        self.advance();
        Some(payload)
    }

    pub(crate) fn entry_key(&self) -> Option<EntryKey> {
        self.entry.as_ref().map(|entry| entry.key().clone())
    }

    pub(crate) fn entry_key_ref(&self) -> Option<&EntryKey> {
        self.entry.as_ref().map(|entry| entry.key())
    }

    fn skip_invisible(&mut self) {
        loop {
            let next = match &self.entry {
                Some(entry) if !entry.key().item().is_visible(self.snap.seqno()) => entry.next(),
                _ => break,
            };
            self.entry = next;
        }
    }
}

impl Drop for DbIterator<'_> {
    fn drop(&mut self) {
        self.entry = None;
        self.snap.close();
    }
}
