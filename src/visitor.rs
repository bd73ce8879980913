//! Parallel snapshot-consistent scan.
//!
//! The key space is cut at index split keys into up to `shards` ranges,
//! each owned by one iterator. `concurrency` worker threads pull shard
//! indices from a shared dispenser and stream their shard through the
//! callback, stopping at the next shard's first entry. Per-shard errors
//! are collected; after every worker has joined and every iterator is
//! closed, the first error in shard order is returned.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::db::{Db, Snapshot};
use crate::error::{Error, Result};
use crate::item::{EntryKey, Item};

impl Db {
    /// Applies `callback(item, shard)` to every item visible to `snap`,
    /// in parallel across key-range shards. Workers stop handing out work
    /// after the first callback error; the scan's order within a shard is
    /// ascending, but shards run concurrently.
    pub fn visit<F>(
        &self,
        snap: &Arc<Snapshot>,
        shards: usize,
        concurrency: usize,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(&Item, usize) -> Result<()> + Send + Sync,
    {
        let Some(mut first) = self.iter(snap) else {
            return Ok(());
        };
        first.seek_to_first();

        let mut iters = vec![first];
        let mut shard_starts: Vec<EntryKey> = Vec::new();
        for pivot in self.inner.index.split_keys(shards) {
            let Some(mut it) = self.iter(snap) else { break };
            it.seek(pivot.item().bytes());
            match it.entry_key() {
                // A shard whose first entry coincides with the previous
                // shard's start would duplicate work; drop it.
                Some(start) if shard_starts.last() != Some(&start) => {
                    shard_starts.push(start);
                    iters.push(it);
                }
                _ => {}
            }
        }

        // Shard i terminates where shard i+1 begins; the last one runs to
        // the end of the index.
        let mut stops: Vec<Option<EntryKey>> =
            shard_starts.into_iter().map(Some).collect();
        stops.push(None);

        let shard_count = iters.len();
        let iters: Vec<Mutex<_>> = iters.into_iter().map(Mutex::new).collect();
        let errors: Vec<Mutex<Option<Error>>> =
            (0..shard_count).map(|_| Mutex::new(None)).collect();
        let next_shard = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..concurrency.max(1) {
                scope.spawn(|| loop {
                    let shard = next_shard.fetch_add(1, AtomicOrdering::SeqCst);
                    if shard >= shard_count {
                        return;
                    }

                    let mut it = iters[shard].lock();
                    let stop = &stops[shard];
                    while it.valid() {
                        if let (Some(stop), Some(cur)) = (stop.as_ref(), it.entry_key_ref()) {
                            if stop == cur {
                                break;
                            }
                        }
                        let Some(item) = it.item() else { break };
                        if let Err(err) = callback(&item, shard) {
                            *errors[shard].lock() = Some(err);
                            return;
                        }
                        it.advance();
                    }
                });
            }
        });

        drop(iters);

        for slot in errors {
            if let Some(err) = slot.into_inner() {
                return Err(err);
            }
        }
        Ok(())
    }
}
