use rand::prelude::random;

use std::{env, fs, path, sync::Arc, thread, time};

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
fn test_seqn_add_iter() {
    let dir = scratch("seqn-add");
    let seqn = Seqn::new(open_slab(&dir), "nodeedits").unwrap();

    assert_eq!(seqn.index(), 0);
    assert_eq!(seqn.last::<String>().unwrap(), None);

    for i in 0..10_u64 {
        let offs = seqn.add(format!("item-{}", i)).unwrap();
        assert_eq!(offs, i);
    }
    assert_eq!(seqn.index(), 10);

    let (offs, item) = seqn.last::<String>().unwrap().unwrap();
    assert_eq!((offs, item.as_str()), (9, "item-9"));

    assert_eq!(seqn.get::<String>(3).unwrap().unwrap(), "item-3");
    assert_eq!(seqn.get::<String>(99).unwrap(), None);

    let items: Vec<(u64, String)> = seqn.iter(4).map(|x| x.unwrap()).collect();
    assert_eq!(items.len(), 6);
    assert_eq!(items[0], (4, "item-4".to_string()));

    let items: Vec<(u64, String)> = seqn.slice(2, 3).map(|x| x.unwrap()).collect();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2], (4, "item-4".to_string()));

    let items: Vec<(u64, String)> = seqn.iter_back(5).map(|x| x.unwrap()).collect();
    assert_eq!(items.len(), 6);
    assert_eq!(items[0], (5, "item-5".to_string()));
    assert_eq!(items[5], (0, "item-0".to_string()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_seqn_save_reopen() {
    let dir = scratch("seqn-save");
    {
        let seqn = Seqn::new(open_slab(&dir), "nodeedits").unwrap();
        let offs = seqn.save(vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(offs, 0);
        let offs = seqn.save(vec!["c".to_string()]).unwrap();
        assert_eq!(offs, 2);
    }

    // the offset counter resumes from storage.
    let seqn = Seqn::new(open_slab(&dir), "nodeedits").unwrap();
    assert_eq!(seqn.index(), 3);
    let items: Vec<(u64, String)> = seqn.iter(0).map(|x| x.unwrap()).collect();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2], (2, "c".to_string()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_seqn_wait_for_offset() {
    let dir = scratch("seqn-wait");
    let seqn = Arc::new(Seqn::new(open_slab(&dir), "nodeedits").unwrap());

    seqn.add("first".to_string()).unwrap();
    // already written offsets come back immediately.
    assert!(seqn.wait_for_offset(0, Some(time::Duration::from_millis(1))));

    // future offsets time out until something is appended.
    assert!(!seqn.wait_for_offset(5, Some(time::Duration::from_millis(10))));

    let event = seqn.get_offset_event(3);
    assert!(!event.is_set());

    let writer = {
        let seqn = Arc::clone(&seqn);
        thread::spawn(move || {
            for i in 0..5 {
                thread::sleep(time::Duration::from_millis(10));
                seqn.add(format!("late-{}", i)).unwrap();
            }
        })
    };

    assert!(event.wait(Some(time::Duration::from_secs(10))));
    assert!(seqn.wait_for_offset(3, Some(time::Duration::from_secs(10))));
    writer.join().unwrap();

    fs::remove_dir_all(&dir).ok();
}
