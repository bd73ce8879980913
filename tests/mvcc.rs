use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use emberdb::{Config, Db, KeyComparator, Snapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Orders items by the bytes before the first `:`; the rest is value.
fn key_prefix_comparator() -> KeyComparator {
    fn key_of(data: &[u8]) -> &[u8] {
        match data.iter().position(|&b| b == b':') {
            Some(pos) => &data[..pos],
            None => data,
        }
    }
    Arc::new(|a: &[u8], b: &[u8]| key_of(a).cmp(key_of(b)))
}

fn visible(db: &Db, snap: &Arc<Snapshot>) -> Vec<Bytes> {
    let mut iter = db.iter(snap).expect("snapshot is open");
    iter.seek_to_first();
    let mut out = Vec::new();
    while let Some(payload) = iter.next() {
        out.push(payload);
    }
    out
}

#[test]
fn snapshot_sees_state_at_creation() {
    let db = Db::new();
    let mut writer = db.new_writer();

    assert!(writer.put(&b"a"[..]));
    let before = db.new_snapshot().unwrap();

    assert!(writer.delete(b"a"));
    let after = db.new_snapshot().unwrap();

    assert_eq!(visible(&db, &before), vec![Bytes::from_static(b"a")]);
    assert!(visible(&db, &after).is_empty());

    before.close();
    after.close();
    db.close();
}

#[test]
fn concurrent_writers_fill_disjoint_ranges() {
    let db = Db::new();
    let w1 = db.new_writer();
    let w2 = db.new_writer();

    let fill = |mut writer: emberdb::Writer, prefix: char| {
        std::thread::spawn(move || {
            for i in 0..1000u32 {
                assert!(writer.put(format!("{prefix}{i:04}")));
            }
        })
    };
    let h1 = fill(w1, 'a');
    let h2 = fill(w2, 'b');
    h1.join().unwrap();
    h2.join().unwrap();

    let snap = db.new_snapshot().unwrap();
    assert_eq!(db.items_count(), 2000);
    assert_eq!(snap.count(), 2000);

    let got = visible(&db, &snap);
    assert_eq!(got.len(), 2000);
    assert!(got.windows(2).all(|w| w[0] < w[1]));

    snap.close();
    db.close();
}

#[test]
fn old_snapshot_survives_update_of_its_key() {
    let mut config = Config::default();
    config.set_key_comparator(key_prefix_comparator());
    let db = Db::with_config(config);
    let mut writer = db.new_writer();

    assert!(writer.put(&b"k:v0"[..]));
    let old = db.new_snapshot().unwrap();

    // Update in the usual delete-then-put shape. The tombstoned version
    // does not block the re-insert within the same sequence window.
    assert!(writer.delete(b"k"));
    assert!(writer.put(&b"k:v1"[..]));
    let new = db.new_snapshot().unwrap();

    assert_eq!(visible(&db, &old), vec![Bytes::from_static(b"k:v0")]);
    assert_eq!(visible(&db, &new), vec![Bytes::from_static(b"k:v1")]);
    assert_eq!(db.items_count(), 1);

    old.close();
    new.close();
    db.close();
}

#[test]
fn get_returns_newest_live_version() {
    let mut config = Config::default();
    config.set_key_comparator(key_prefix_comparator());
    let db = Db::with_config(config);
    let mut writer = db.new_writer();

    assert!(writer.put(&b"k:v0"[..]));
    let pin = db.new_snapshot().unwrap();
    assert!(writer.delete(b"k"));
    assert!(writer.put(&b"k:v1"[..]));

    // Both versions are physically present; get walks the run and picks
    // the live one.
    assert_eq!(writer.get(b"k"), Some(Bytes::from_static(b"k:v1")));

    pin.close();
    db.close();
}

#[test]
fn live_key_blocks_put_across_snapshots() {
    let db = Db::new();
    let mut writer = db.new_writer();

    assert!(writer.put(&b"x"[..]));
    let pin = db.new_snapshot().unwrap();

    // A later sequence window changes nothing: the key still has a live
    // version, so the put is a no-op.
    assert!(!writer.put(&b"x"[..]));
    assert_eq!(db.items_count(), 1);

    let snap = db.new_snapshot().unwrap();
    assert_eq!(visible(&db, &snap), vec![Bytes::from_static(b"x")]);

    pin.close();
    snap.close();
    db.close();
}

#[test]
fn count_survives_delete_put_cycle() {
    let db = Db::new();
    let mut writer = db.new_writer();

    assert!(writer.put(&b"x"[..]));
    assert!(writer.delete(b"x"));
    assert!(writer.put(&b"x"[..]));
    assert_eq!(db.items_count(), 1);

    db.close();
}

#[test]
fn duplicate_put_is_a_noop() {
    let db = Db::new();
    let mut writer = db.new_writer();

    assert!(writer.put(&b"d"[..]));
    assert!(!writer.put(&b"d"[..]));
    assert_eq!(db.items_count(), 1);

    let snap = db.new_snapshot().unwrap();
    assert_eq!(visible(&db, &snap), vec![Bytes::from_static(b"d")]);
    snap.close();
    db.close();
}

#[test]
fn delete_of_absent_key_is_a_noop() {
    let db = Db::new();
    let mut writer = db.new_writer();

    assert!(!writer.delete(b"nope"));

    assert!(writer.put(&b"gone"[..]));
    assert!(writer.delete(b"gone"));
    assert!(writer.get(b"gone").is_none());
    assert!(!writer.delete(b"gone"));

    db.close();
}

#[test]
fn open_close_leaves_refcount_unchanged() {
    let db = Db::new();
    let snap = db.new_snapshot().unwrap();

    assert!(snap.open());
    snap.close();

    // The creator's reference is still good.
    assert_eq!(visible(&db, &snap), Vec::<Bytes>::new());
    snap.close();
    assert!(!snap.open());

    db.close();
}

#[test]
fn randomized_workload_matches_model() {
    let db = Db::new();
    let mut writer = db.new_writer();
    let mut model: BTreeSet<Vec<u8>> = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for step in 0..500 {
        // Advance the sequence every so often so puts and deletes cross
        // snapshot generations, not just the first window.
        if step % 50 == 0 {
            db.new_snapshot().unwrap().close();
        }
        let key = format!("k{:02}", rng.gen_range(0..40)).into_bytes();
        if rng.gen_bool(0.6) {
            assert_eq!(writer.put(key.clone()), model.insert(key));
        } else {
            assert_eq!(writer.delete(&key), model.remove(&key));
        }
    }

    assert_eq!(db.items_count(), model.len() as i64);
    let snap = db.new_snapshot().unwrap();
    let got: Vec<Vec<u8>> = visible(&db, &snap).iter().map(|b| b.to_vec()).collect();
    let want: Vec<Vec<u8>> = model.into_iter().collect();
    assert_eq!(got, want);

    snap.close();
    db.close();
}
