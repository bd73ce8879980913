//! Process-wide registry of open databases.
//!
//! Every database registers under a monotone id at construction and
//! leaves on close (or drop). The registry holds weak references, so an
//! abandoned handle never keeps a database alive for accounting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Weak;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::db::DbInner;

static NEXT_DB_ID: AtomicU64 = AtomicU64::new(1);

static INSTANCES: Lazy<Mutex<BTreeMap<u64, Weak<DbInner>>>> =
    Lazy::new(|| Mutex::new(BTreeMap::new()));

pub(crate) fn next_id() -> u64 {
    NEXT_DB_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

pub(crate) fn register(id: u64, db: Weak<DbInner>) {
    INSTANCES.lock().insert(id, db);
}

pub(crate) fn deregister(id: u64) {
    INSTANCES.lock().remove(&id);
}

/// Memory in use across every open database in this process.
pub fn memory_in_use() -> u64 {
    INSTANCES
        .lock()
        .values()
        .filter_map(Weak::upgrade)
        .map(|db| db.memory_in_use())
        .sum()
}
