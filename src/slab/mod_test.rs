use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::{env, fs, path};

use super::*;

fn scratch(name: &str) -> path::PathBuf {
    let mut dir = env::temp_dir();
    dir.push(format!("stratum-{}-{:x}", name, random::<u64>()));
    fs::remove_dir_all(&dir).ok();
    dir
}

fn small_opts() -> Opts {
    Opts {
        map_size: 10_000_000,
        max_dbs: 16,
        ..Opts::default()
    }
}

#[test]
fn test_slab_put_get() {
    let dir = scratch("slab-put-get");
    let slab = Slab::open(&dir, small_opts()).unwrap();
    let db = slab.init_db("kv", false).unwrap();

    let mut txn = slab.begin_write().unwrap();
    txn.put(db, b"foo", b"bar").unwrap();
    txn.put(db, b"baz", b"quux").unwrap();
    assert_eq!(txn.get(db, b"foo").unwrap().unwrap(), b"bar");
    txn.commit().unwrap();

    assert_eq!(slab.get(db, b"foo").unwrap().unwrap(), b"bar");
    assert_eq!(slab.get(db, b"missing").unwrap(), None);
    assert_eq!(slab.last(db).unwrap().unwrap().0, b"foo".to_vec());

    // replace returns the old value, pop removes it.
    let mut txn = slab.begin_write().unwrap();
    let oldv = txn.replace(db, b"foo", b"bar2").unwrap();
    assert_eq!(oldv.unwrap(), b"bar");
    let oldv = txn.pop(db, b"baz").unwrap();
    assert_eq!(oldv.unwrap(), b"quux");
    assert_eq!(txn.pop(db, b"baz").unwrap(), None);
    assert!(!txn.put_if_absent(db, b"foo", b"nope").unwrap());
    assert!(txn.put_if_absent(db, b"fresh", b"yes").unwrap());
    txn.commit().unwrap();

    assert_eq!(slab.get(db, b"foo").unwrap().unwrap(), b"bar2");
    assert_eq!(slab.get(db, b"baz").unwrap(), None);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_slab_abort() {
    let dir = scratch("slab-abort");
    let slab = Slab::open(&dir, small_opts()).unwrap();
    let db = slab.init_db("kv", false).unwrap();

    let mut txn = slab.begin_write().unwrap();
    txn.put(db, b"foo", b"bar").unwrap();
    txn.abort();

    assert_eq!(slab.get(db, b"foo").unwrap(), None);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_slab_dups() {
    let dir = scratch("slab-dups");
    let slab = Slab::open(&dir, small_opts()).unwrap();
    let db = slab.init_db("dups", true).unwrap();

    let mut txn = slab.begin_write().unwrap();
    txn.put_dup(db, b"key", b"v2").unwrap();
    txn.put_dup(db, b"key", b"v1").unwrap();
    txn.put_dup(db, b"key", b"v1").unwrap(); // no-op
    txn.put_dup(db, b"kez", b"v3").unwrap();
    txn.commit().unwrap();

    let items: Vec<(Vec<u8>, Vec<u8>)> =
        slab.scan_by_dups(db, b"key").map(|x| x.unwrap()).collect();
    // duplicates are sorted by value.
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].1, b"v1");
    assert_eq!(items[1].1, b"v2");

    let mut txn = slab.begin_write().unwrap();
    assert!(txn.del_dup(db, b"key", b"v1").unwrap());
    assert!(!txn.del_dup(db, b"key", b"v1").unwrap());
    txn.commit().unwrap();

    let items: Vec<(Vec<u8>, Vec<u8>)> =
        slab.scan_by_dups(db, b"key").map(|x| x.unwrap()).collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].1, b"v2");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_slab_scans() {
    let seed: u128 = random();
    println!("test_slab_scans {}", seed);
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());

    let dir = scratch("slab-scans");
    let slab = Slab::open(&dir, small_opts()).unwrap();
    let db = slab.init_db("kv", false).unwrap();

    // enough rows to force several chunks.
    let n: u32 = 2500 + (rng.gen::<u32>() % 1000);
    let mut txn = slab.begin_write().unwrap();
    for i in 0..n {
        let key = format!("key-{:08}", i);
        txn.put(db, key.as_bytes(), &i.to_be_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let rows: Vec<(Vec<u8>, Vec<u8>)> = slab.scan_full(db).map(|x| x.unwrap()).collect();
    assert_eq!(rows.len(), n as usize);
    assert_eq!(rows[0].0, b"key-00000000".to_vec());

    let rows: Vec<(Vec<u8>, Vec<u8>)> = slab
        .scan_by_pref(db, b"key-000000")
        .map(|x| x.unwrap())
        .collect();
    assert_eq!(rows.len(), 100);

    // range scans are inclusive on both ends.
    let rows: Vec<(Vec<u8>, Vec<u8>)> = slab
        .scan_by_range(db, b"key-00000010", b"key-00000020")
        .map(|x| x.unwrap())
        .collect();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[0].0, b"key-00000010".to_vec());
    assert_eq!(rows[10].0, b"key-00000020".to_vec());

    // backward scan from the middle.
    let rows: Vec<(Vec<u8>, Vec<u8>)> = slab
        .scan_back(db, b"key-00000010")
        .map(|x| x.unwrap())
        .collect();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[0].0, b"key-00000010".to_vec());
    assert_eq!(rows[10].0, b"key-00000000".to_vec());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_slab_scan_pref_keys() {
    let dir = scratch("slab-pref-keys");
    let slab = Slab::open(&dir, small_opts()).unwrap();
    let db = slab.init_db("kv", false).unwrap();

    let mut txn = slab.begin_write().unwrap();
    txn.put(db, b"aa-1", b"x").unwrap();
    txn.put(db, b"aa-2", b"x").unwrap();
    txn.put(db, b"ab-1", b"x").unwrap();
    // rows written in this very transaction are visible.
    let keys = txn.scan_pref_keys(db, b"aa-").unwrap();
    assert_eq!(keys, vec![b"aa-1".to_vec(), b"aa-2".to_vec()]);
    txn.commit().unwrap();

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_slab_readonly() {
    let dir = scratch("slab-readonly");
    {
        let slab = Slab::open(&dir, small_opts()).unwrap();
        let db = slab.init_db("kv", false).unwrap();
        let mut txn = slab.begin_write().unwrap();
        txn.put(db, b"foo", b"bar").unwrap();
        txn.commit().unwrap();
    }

    let opts = Opts {
        readonly: true,
        ..small_opts()
    };
    let slab = Slab::open(&dir, opts).unwrap();
    assert!(slab.is_readonly());
    let db = slab.init_db("kv", false).unwrap();
    assert_eq!(slab.get(db, b"foo").unwrap().unwrap(), b"bar");
    assert!(slab.begin_write().is_err());

    fs::remove_dir_all(&dir).ok();
}
