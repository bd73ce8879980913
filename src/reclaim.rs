//! Deferred reclamation of tombstoned entries.
//!
//! Two stages. Promotion walks the dead-snapshot set in ascending seqno
//! and queues each retirement batch whose snapshot sits at or below the
//! reclamation floor (`least_unref_seqno`); at most one promotion pass
//! runs per database at a time. Collection is a single thread per
//! database draining the bounded queue and physically deleting entries;
//! it exits when the channel closes at teardown.
//!
//! An entry with `dead_seqno = d` is only reachable by snapshots at or
//! above `d`. Its batch is promoted once the smallest live snapshot is
//! beyond `d`, so no live reader can observe the entry when it is
//! unlinked.

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::db::DbInner;
use crate::item::EntryKey;

/// Bounded depth of the retirement queue. A slow collector backpressures
/// snapshot retirement instead of buffering without limit.
pub(crate) const RETIRE_QUEUE_DEPTH: usize = 256;

pub(crate) type RetiredBatch = Vec<EntryKey>;

/// Kicks a promotion pass on its own thread unless one is running.
pub(crate) fn maybe_spawn_promotion(inner: &Arc<DbInner>) {
    let claimed = inner
        .is_gc_running
        .compare_exchange(
            false,
            true,
            AtomicOrdering::SeqCst,
            AtomicOrdering::SeqCst,
        )
        .is_ok();
    if !claimed {
        return;
    }

    let inner = Arc::clone(inner);
    std::thread::spawn(move || {
        promotion_pass(&inner);
        inner.is_gc_running.store(false, AtomicOrdering::SeqCst);
    });
}

fn promotion_pass(inner: &DbInner) {
    let floor = inner.least_unref_seqno.load(AtomicOrdering::SeqCst);
    if floor == 0 || floor == inner.last_gc_seqno.load(AtomicOrdering::SeqCst) {
        return;
    }
    inner.last_gc_seqno.store(floor, AtomicOrdering::SeqCst);
    debug!(floor, "promoting reclaimable snapshots");
    promote_below(inner, floor);
}

fn promote_below(inner: &DbInner, floor: u32) {
    loop {
        let snap = {
            let mut dead = inner.dead.lock();
            match dead.first_key_value() {
                Some((&seqno, _)) if seqno <= floor => dead.remove(&seqno),
                _ => None,
            }
        };
        let Some(snap) = snap else { break };

        let batch = std::mem::take(&mut *snap.retired.lock());
        if batch.is_empty() {
            continue;
        }
        deliver(inner, batch);
    }
}

/// Shutdown pass: reclaims every dead snapshot's batch no matter where
/// the floor sits. Live snapshots at this point are a contract violation.
pub(crate) fn promote_all(inner: &DbInner) {
    loop {
        let snap = {
            let mut dead = inner.dead.lock();
            dead.pop_first().map(|(_, snap)| snap)
        };
        let Some(snap) = snap else { break };

        let batch = std::mem::take(&mut *snap.retired.lock());
        if batch.is_empty() {
            continue;
        }
        deliver(inner, batch);
    }
}

/// Hands a batch to the collector, or reclaims inline when no collector
/// exists (a database that never created a writer, or one mid-teardown).
fn deliver(inner: &DbInner, batch: RetiredBatch) {
    let tx = inner.retire_tx.lock().clone();
    let collector_running = inner.collector.lock().is_some();
    match tx {
        Some(tx) if collector_running => {
            trace!(entries = batch.len(), "queueing retired batch");
            if let Err(returned) = tx.send(batch) {
                reclaim_inline(inner, returned.0);
            }
        }
        _ => reclaim_inline(inner, batch),
    }
}

fn reclaim_inline(inner: &DbInner, batch: RetiredBatch) {
    for entry in batch {
        inner.index.remove(&entry);
    }
}

/// Starts the per-database collector thread. Called once, by the first
/// writer registration.
pub(crate) fn spawn_collector(inner: &Arc<DbInner>) {
    let rx = inner.retire_rx.lock().take();
    let Some(rx) = rx else { return };

    let worker = Arc::clone(inner);
    let handle = std::thread::spawn(move || {
        debug!(db = worker.id, "collector started");
        for batch in rx {
            trace!(entries = batch.len(), "deleting retired entries");
            for entry in batch {
                worker.index.remove(&entry);
            }
        }
        debug!(db = worker.id, "collector exiting");
    });
    *inner.collector.lock() = Some(handle);
}
