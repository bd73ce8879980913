//! Point-in-time snapshots.
//!
//! A snapshot is a stamp (`seqno`) plus a reference count. Creation costs
//! one atomic increment of the database sequence; no data is copied.
//! While any holder keeps the snapshot open, every item visible at its
//! seqno stays physically present in the index. The last `close` moves the
//! snapshot to the dead set, where the reclamation engine picks up its
//! retirement batch once no older reader remains.

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::db::DbInner;
use crate::error::{Error, Result};
use crate::item::EntryKey;
use crate::reclaim;

pub struct Snapshot {
    seqno: u32,
    refcount: AtomicU32,
    count: i64,
    pub(crate) db: Arc<DbInner>,
    /// Entries tombstoned before this snapshot was taken, harvested from
    /// the writers at creation. Physically deleted once this snapshot and
    /// everything older is gone.
    pub(crate) retired: Mutex<Vec<EntryKey>>,
}

impl Snapshot {
    pub(crate) fn new(db: Arc<DbInner>, seqno: u32, count: i64) -> Arc<Self> {
        Arc::new(Self {
            seqno,
            refcount: AtomicU32::new(1),
            count,
            db,
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Largest sequence number visible to this snapshot.
    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    /// Live items at the time the snapshot was taken.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Takes an additional reference. Refused once the refcount has hit
    /// zero: the snapshot is already retiring.
    pub fn open(&self) -> bool {
        self.refcount
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n + 1)
                }
            })
            .is_ok()
    }

    /// Drops one reference. The final close retires the snapshot: it moves
    /// to the dead set, the reclamation floor is recomputed, and a
    /// promotion pass is kicked if none is running.
    pub fn close(&self) {
        let prev = self.refcount.fetch_sub(1, AtomicOrdering::SeqCst);
        debug_assert!(prev > 0, "snapshot closed more times than opened");
        if prev == 1 {
            self.db.retire_snapshot(self.seqno);
            reclaim::maybe_spawn_promotion(&self.db);
        }
    }

    /// Writes the 4-byte big-endian seqno frame through `buf`.
    pub fn encode<W: Write>(&self, buf: &mut [u8], w: &mut W) -> Result<()> {
        if buf.len() < 4 {
            return Err(Error::NotEnoughSpace);
        }
        buf[..4].copy_from_slice(&self.seqno.to_be_bytes());
        w.write_all(&buf[..4])?;
        Ok(())
    }

    /// Reads a frame produced by [`Snapshot::encode`], returning the
    /// stored seqno.
    pub fn decode<R: Read>(buf: &mut [u8], r: &mut R) -> Result<u32> {
        if buf.len() < 4 {
            return Err(Error::NotEnoughSpace);
        }
        r.read_exact(&mut buf[..4])?;
        let mut frame = [0u8; 4];
        frame.copy_from_slice(&buf[..4]);
        Ok(u32::from_be_bytes(frame))
    }

    pub(crate) fn refcount(&self) -> u32 {
        self.refcount.load(AtomicOrdering::SeqCst)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("seqno", &self.seqno)
            .field("refcount", &self.refcount())
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() -> Result<()> {
        let db = crate::Db::new();
        let snap = db.new_snapshot()?;

        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        snap.encode(&mut buf, &mut out)?;
        assert_eq!(out.len(), 4);

        let seqno = Snapshot::decode(&mut buf, &mut out.as_slice())?;
        assert_eq!(seqno, snap.seqno());

        snap.close();
        db.close();
        Ok(())
    }

    #[test]
    fn encode_rejects_short_buffer() -> Result<()> {
        let db = crate::Db::new();
        let snap = db.new_snapshot()?;

        let mut buf = [0u8; 3];
        let mut out = Vec::new();
        assert!(matches!(
            snap.encode(&mut buf, &mut out),
            Err(Error::NotEnoughSpace)
        ));
        assert!(matches!(
            Snapshot::decode(&mut buf, &mut out.as_slice()),
            Err(Error::NotEnoughSpace)
        ));

        snap.close();
        db.close();
        Ok(())
    }
}
