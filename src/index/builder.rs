//! Bulk-load path: sorted shard segments assembled into an index.
//!
//! Used when rebuilding a database from disk. Each reader thread fills its
//! own [`Segment`]; [`IndexBuilder::assemble`] then inserts all segments
//! concurrently. The skiplist tolerates interleaved inserts, so assembly
//! needs no merge step.

use std::sync::Arc;

use rayon::prelude::*;

use crate::index::SkipIndex;
use crate::item::Item;

/// Invoked for every item that lands in the index during assembly.
pub type ItemCallback = Arc<dyn Fn(&Item) + Send + Sync>;

#[derive(Default)]
pub struct IndexBuilder;

impl IndexBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn new_segment(&self) -> Segment {
        Segment {
            items: Vec::new(),
            on_item: None,
        }
    }

    /// Inserts every segment's items into `index`, returning how many were
    /// added. Duplicate slots are skipped, same as the write path.
    pub fn assemble(&self, index: &SkipIndex, segments: Vec<Segment>) -> u64 {
        segments
            .into_par_iter()
            .map(|segment| {
                let Segment { items, on_item } = segment;
                let mut added = 0u64;
                for item in items {
                    let (entry, inserted) = index.insert(item);
                    if inserted {
                        added += 1;
                        if let Some(cb) = &on_item {
                            cb(entry.item());
                        }
                    }
                }
                added
            })
            .sum()
    }
}

pub struct Segment {
    items: Vec<Arc<Item>>,
    on_item: Option<ItemCallback>,
}

impl Segment {
    pub fn add(&mut self, item: Arc<Item>) {
        self.items.push(item);
    }

    pub fn set_item_callback(&mut self, cb: ItemCallback) {
        self.on_item = Some(cb);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
