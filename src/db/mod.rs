//! Database core.
//!
//! `Db` is a cheaply clonable handle. One database owns: the ordered
//! index, the sequence counter, the live and dead snapshot sets, the
//! bounded retirement channel, and the registry of writer handles whose
//! local tombstone lists each snapshot harvests.
//!
//! Sequencing contract: a snapshot publishes itself into the live set at
//! the current sequence, then bumps the sequence. Writes that load the
//! sequence afterwards carry a larger `born_seqno` and stay invisible to
//! the snapshot; tombstones that landed before carry a `dead_seqno` at or
//! below it and are correctly hidden.

mod iterator;
mod options;
pub(crate) mod snapshot;
mod writer;

pub use iterator::DbIterator;
pub use options::Config;
pub use snapshot::Snapshot;
pub use writer::Writer;

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering as AtomicOrdering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::db::writer::WriterShared;
use crate::error::{Error, Result};
use crate::index::{IndexStats, SkipIndex};
use crate::item::Item;
use crate::reclaim::{self, RetiredBatch};
use crate::registry;

#[derive(Clone)]
pub struct Db {
    pub(crate) inner: Arc<DbInner>,
}

pub(crate) struct DbInner {
    pub(crate) id: u64,
    pub(crate) config: Config,
    pub(crate) index: SkipIndex,
    curr_seqno: AtomicU32,
    pub(crate) count: AtomicI64,
    pub(crate) live: Mutex<BTreeMap<u32, Arc<Snapshot>>>,
    pub(crate) dead: Mutex<BTreeMap<u32, Arc<Snapshot>>>,
    pub(crate) least_unref_seqno: AtomicU32,
    pub(crate) last_gc_seqno: AtomicU32,
    pub(crate) is_gc_running: AtomicBool,
    /// Writer shared state plus snapshot-harvest serialization: writer
    /// registration and snapshot creation take this lock; writers never
    /// do on the data path.
    writers: Mutex<WriterRegistry>,
    pub(crate) retire_tx: Mutex<Option<SyncSender<RetiredBatch>>>,
    pub(crate) retire_rx: Mutex<Option<Receiver<RetiredBatch>>>,
    pub(crate) collector: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct WriterRegistry {
    writers: Vec<Arc<WriterShared>>,
    collector_started: bool,
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl Db {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let (tx, rx) = std::sync::mpsc::sync_channel(reclaim::RETIRE_QUEUE_DEPTH);
        let index = SkipIndex::new(Arc::clone(&config.key_comparator));
        if !config.ignore_item_size {
            index.set_item_size_fn(Box::new(|item: &Item| item.bytes().len()));
        }

        let inner = Arc::new(DbInner {
            id: registry::next_id(),
            config,
            index,
            curr_seqno: AtomicU32::new(1),
            count: AtomicI64::new(0),
            live: Mutex::new(BTreeMap::new()),
            dead: Mutex::new(BTreeMap::new()),
            least_unref_seqno: AtomicU32::new(0),
            last_gc_seqno: AtomicU32::new(0),
            is_gc_running: AtomicBool::new(false),
            writers: Mutex::new(WriterRegistry::default()),
            retire_tx: Mutex::new(Some(tx)),
            retire_rx: Mutex::new(Some(rx)),
            collector: Mutex::new(None),
        });
        registry::register(inner.id, Arc::downgrade(&inner));
        Self { inner }
    }

    /// Creates a write handle owned by the calling thread. The first
    /// writer starts the collector thread that drains retired entries.
    pub fn new_writer(&self) -> Writer {
        let shared = Arc::new(WriterShared::default());
        {
            let mut reg = self.inner.writers.lock();
            reg.writers.push(Arc::clone(&shared));
            if !reg.collector_started {
                reg.collector_started = true;
                reclaim::spawn_collector(&self.inner);
            }
        }
        Writer::new(self.clone(), shared)
    }

    /// Stamps a new snapshot at the current sequence and advances the
    /// sequence. Also harvests every writer's tombstone list into the new
    /// snapshot's retirement batch.
    pub fn new_snapshot(&self) -> Result<Arc<Snapshot>> {
        let writers = self.inner.writers.lock();

        let snap = Snapshot::new(
            Arc::clone(&self.inner),
            self.inner.current_seqno(),
            self.items_count(),
        );
        self.inner
            .live
            .lock()
            .insert(snap.seqno(), Arc::clone(&snap));

        let next = self
            .inner
            .curr_seqno
            .fetch_add(1, AtomicOrdering::SeqCst)
            .wrapping_add(1);
        if next == u32::MAX {
            self.inner.live.lock().remove(&snap.seqno());
            return Err(Error::SnapshotLimitReached);
        }

        let mut batch = Vec::new();
        for shared in &writers.writers {
            batch.append(&mut shared.retired.lock());
        }
        *snap.retired.lock() = batch;

        Ok(snap)
    }

    /// Iterator over everything `snap` can see. `None` when the snapshot
    /// has already fully closed.
    pub fn iter(&self, snap: &Arc<Snapshot>) -> Option<DbIterator<'_>> {
        if !snap.open() {
            return None;
        }
        Some(DbIterator::new(&self.inner.index, Arc::clone(snap)))
    }

    /// Live snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.inner.live.lock().values().cloned().collect()
    }

    pub fn items_count(&self) -> i64 {
        self.inner.count.load(AtomicOrdering::Relaxed)
    }

    pub fn memory_in_use(&self) -> u64 {
        self.inner.memory_in_use()
    }

    pub fn stats(&self) -> IndexStats {
        self.inner.index.stats()
    }

    /// Tears the database down: runs one unconditional reclamation pass,
    /// closes the retirement channel, joins the collector, and leaves the
    /// process-wide registry. Closing while snapshots or writers are in
    /// use elsewhere is a contract violation.
    pub fn close(&self) {
        reclaim::promote_all(&self.inner);
        self.inner.retire_tx.lock().take();
        let collector = self.inner.collector.lock().take();
        if let Some(handle) = collector {
            let _ = handle.join();
        }
        registry::deregister(self.inner.id);
    }
}

impl DbInner {
    pub(crate) fn current_seqno(&self) -> u32 {
        self.curr_seqno.load(AtomicOrdering::SeqCst)
    }

    /// Moves a fully closed snapshot from the live set to the dead set
    /// and recomputes the reclamation floor.
    pub(crate) fn retire_snapshot(&self, seqno: u32) {
        let retired = self.live.lock().remove(&seqno);
        if let Some(snap) = retired {
            self.dead.lock().insert(seqno, snap);
        }
        self.refresh_unref_floor();
    }

    /// Floor = (smallest live seqno) - 1. With no live snapshots the
    /// floor keeps its last value; it never moves down.
    fn refresh_unref_floor(&self) {
        let live = self.live.lock();
        if let Some((&seqno, _)) = live.first_key_value() {
            self.least_unref_seqno
                .store(seqno - 1, AtomicOrdering::SeqCst);
        }
    }

    pub(crate) fn memory_in_use(&self) -> u64 {
        let snapshot_cost = mem::size_of::<Snapshot>() as u64;
        let tracked = (self.live.lock().len() + self.dead.lock().len()) as u64;
        self.index.memory_in_use() + tracked * snapshot_cost
    }
}

impl Drop for DbInner {
    fn drop(&mut self) {
        registry::deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_refused_at_sequence_ceiling() {
        let db = Db::new();
        db.inner
            .curr_seqno
            .store(u32::MAX - 2, AtomicOrdering::SeqCst);

        let ok = db.new_snapshot().unwrap();
        assert_eq!(ok.seqno(), u32::MAX - 2);

        let err = db.new_snapshot();
        assert!(matches!(err, Err(Error::SnapshotLimitReached)));
        // The failed snapshot must not linger in the live set.
        assert_eq!(db.snapshots().len(), 1);

        ok.close();
        db.close();
    }

    #[test]
    fn unref_floor_tracks_smallest_live_snapshot() {
        let db = Db::new();
        let s1 = db.new_snapshot().unwrap();
        let s2 = db.new_snapshot().unwrap();
        let s3 = db.new_snapshot().unwrap();
        assert_eq!((s1.seqno(), s2.seqno(), s3.seqno()), (1, 2, 3));

        s1.close();
        assert_eq!(db.inner.least_unref_seqno.load(AtomicOrdering::SeqCst), 1);
        s2.close();
        assert_eq!(db.inner.least_unref_seqno.load(AtomicOrdering::SeqCst), 2);

        // Last close leaves the floor where it was.
        s3.close();
        assert_eq!(db.inner.least_unref_seqno.load(AtomicOrdering::SeqCst), 2);

        db.close();
    }

    #[test]
    fn open_refused_after_final_close() {
        let db = Db::new();
        let snap = db.new_snapshot().unwrap();
        assert!(snap.open());
        snap.close();
        snap.close();
        assert!(!snap.open());
        db.close();
    }
}
