use rand::prelude::random;

use std::{env, fs, path, sync::Arc};

use super::*;
use crate::slab::Opts;

fn scratch(name: &str) -> path::PathBuf {
    let mut dir = env::temp_dir();
    dir.push(format!("stratum-{}-{:x}", name, random::<u64>()));
    fs::remove_dir_all(&dir).ok();
    dir
}

fn open_slab(dir: &path::Path) -> Arc<Slab> {
    let opts = Opts {
        map_size: 10_000_000,
        max_dbs: 8,
        ..Opts::default()
    };
    Arc::new(Slab::open(dir, opts).unwrap())
}

#[test]
fn test_abrv_assign() {
    let dir = scratch("abrv-assign");
    let slab = open_slab(&dir);
    let abrvs = NameAbrv::new(Arc::clone(&slab), "propabrv").unwrap();

    let mut txn = slab.begin_write().unwrap();
    let a0 = abrvs.to_abrv(&mut txn, b"inet:fqdn").unwrap();
    let a1 = abrvs.to_abrv(&mut txn, b"inet:ipv4").unwrap();
    // identifiers are monotonic and stable within the transaction.
    assert_eq!(a0, util::u64_to_key(0));
    assert_eq!(a1, util::u64_to_key(1));
    assert_eq!(abrvs.to_abrv(&mut txn, b"inet:fqdn").unwrap(), a0);
    txn.commit().unwrap();

    assert_eq!(abrvs.lookup(b"inet:fqdn").unwrap(), Some(a0));
    assert_eq!(abrvs.lookup(b"inet:url").unwrap(), None);

    assert_eq!(abrvs.to_byts(&a0).unwrap().unwrap(), b"inet:fqdn".to_vec());
    assert_eq!(abrvs.to_byts(&a1).unwrap().unwrap(), b"inet:ipv4".to_vec());
    assert_eq!(abrvs.to_byts(&util::u64_to_key(99)).unwrap(), None);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_abrv_stability() {
    let dir = scratch("abrv-stability");
    let a0 = {
        let slab = open_slab(&dir);
        let abrvs = NameAbrv::new(Arc::clone(&slab), "propabrv").unwrap();
        let mut txn = slab.begin_write().unwrap();
        let a0 = abrvs.to_abrv(&mut txn, b"inet:fqdn").unwrap();
        txn.commit().unwrap();
        a0
    };

    // assignments survive reopen and the counter resumes past them.
    let slab = open_slab(&dir);
    let abrvs = NameAbrv::new(Arc::clone(&slab), "propabrv").unwrap();
    assert_eq!(abrvs.lookup(b"inet:fqdn").unwrap(), Some(a0));

    let mut txn = slab.begin_write().unwrap();
    assert_eq!(abrvs.to_abrv(&mut txn, b"inet:fqdn").unwrap(), a0);
    let a1 = abrvs.to_abrv(&mut txn, b"inet:ipv6").unwrap();
    txn.commit().unwrap();
    assert_eq!(a1, util::u64_to_key(1));

    fs::remove_dir_all(&dir).ok();
}
