//! `emberdb` is an in-memory, ordered, multi-version key-value store.
//!
//! This crate is intentionally opinionated about concurrency first:
//! - Readers and writers never block each other; the index is a
//!   lock-free skiplist.
//! - Reads are snapshot-consistent: a snapshot is a sequence-number
//!   stamp, taken in O(1), and sees exactly the items that committed
//!   before it.
//! - Deletes are tombstones. Tombstoned entries are physically removed
//!   by a background collector only after every snapshot that could see
//!   them has closed.
//! - Durability is explicit: a snapshot can be exported to sharded files
//!   and loaded back; there is no write-ahead log.
//!
//! Writers are per-thread handles created with [`Db::new_writer`]; many
//! writers mutate one database concurrently. Snapshots are reference
//! counted and cheap to share across threads.

pub mod db;
pub mod error;
pub mod index;
pub mod item;
pub mod persist;
pub mod registry;

pub(crate) mod reclaim;
mod visitor;

pub use db::{Config, Db, DbIterator, Snapshot, Writer};
pub use error::{Error, Result};
pub use index::{IndexBuilder, IndexStats, ItemCallback, Segment};
pub use item::{default_key_comparator, EntryKey, Item, KeyComparator};
pub use persist::{FileReader, FileType, FileWriter};
pub use registry::memory_in_use;
