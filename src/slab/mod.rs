//! Module implement the embedded key-value backend.
//!
//! A [Slab] wraps one memory-mapped LMDB environment holding named
//! sub-databases. Regular databases hold one value per key, dup
//! databases hold many sorted values under one key (here, always a
//! buid). Writes go through a single [WriteTxn] at a time, readers use
//! their own MVCC snapshots and never block the writer.
//!
//! Scans are chunked: a [Scan] pulls up to [SCAN_CHUNK] rows under one
//! read transaction, remembers its position and re-seeks under a fresh
//! snapshot for the next chunk. This keeps long lifts live across
//! concurrent write commits and lets scan values outlive any single
//! transaction.

use lmdb::{Cursor, Transaction};

use std::{fs, path, sync::Arc, vec};

use crate::{Error, Result};

/// Number of rows a [Scan] fetches under a single read transaction.
pub const SCAN_CHUNK: usize = 1000;

/// Handle to a named sub-database.
pub type Db = lmdb::Database;

/// Options while opening a [Slab] environment.
#[derive(Clone, Debug)]
pub struct Opts {
    pub readonly: bool,
    pub lockmemory: bool,
    pub map_size: usize,
    pub max_dbs: u32,
}

impl Default for Opts {
    fn default() -> Opts {
        Opts {
            readonly: false,
            lockmemory: false,
            map_size: crate::config::MAP_SIZE,
            max_dbs: crate::config::MAX_DBS,
        }
    }
}

/// One LMDB environment and its named sub-databases.
pub struct Slab {
    dir: path::PathBuf,
    env: Arc<lmdb::Environment>,
    readonly: bool,
}

impl Slab {
    /// Open the environment under `dir`, creating the directory when
    /// it does not exist and the slab is writable.
    pub fn open(dir: &path::Path, opts: Opts) -> Result<Slab> {
        if !opts.readonly {
            err_at!(IOError, fs::create_dir_all(dir), "slab dir {:?}", dir)?;
        }

        let mut flags = lmdb::EnvironmentFlags::empty();
        flags.insert(lmdb::EnvironmentFlags::NO_TLS);
        if opts.readonly {
            flags.insert(lmdb::EnvironmentFlags::READ_ONLY);
        }
        // TODO: wire opts.lockmemory to mlock once the lmdb crate
        // exposes a control for it.

        let env = {
            let mut builder = lmdb::Environment::new();
            builder
                .set_flags(flags)
                .set_max_dbs(opts.max_dbs)
                .set_map_size(opts.map_size);
            err_at!(BackendFail, builder.open(dir), "open slab {:?}", dir)?
        };

        let val = Slab {
            dir: dir.to_path_buf(),
            env: Arc::new(env),
            readonly: opts.readonly,
        };

        Ok(val)
    }

    /// Create, or open when read-only, the named sub-database.
    pub fn init_db(&self, name: &str, dupsort: bool) -> Result<Db> {
        if self.readonly {
            return err_at!(BackendFail, self.env.open_db(Some(name)), "db {}", name);
        }

        let mut flags = lmdb::DatabaseFlags::empty();
        if dupsort {
            flags.insert(lmdb::DatabaseFlags::DUP_SORT);
        }
        err_at!(BackendFail, self.env.create_db(Some(name), flags), "db {}", name)
    }

    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    #[inline]
    pub fn to_dir(&self) -> path::PathBuf {
        self.dir.clone()
    }

    /// Flush dirty pages to disk.
    pub fn sync(&self) -> Result<()> {
        err_at!(BackendFail, self.env.sync(true))
    }

    /// Environment wide statistics `(entries, depth, branch_pages, leaf_pages)`.
    pub fn stat(&self) -> Result<(usize, u32, usize, usize)> {
        let stat = err_at!(BackendFail, self.env.stat())?;
        Ok((
            stat.entries(),
            stat.depth(),
            stat.branch_pages(),
            stat.leaf_pages(),
        ))
    }

    /// Point lookup, return a copy of the value, or None. On dup
    /// databases this returns the first duplicate.
    pub fn get(&self, db: Db, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = err_at!(BackendFail, self.env.begin_ro_txn())?;
        let val = match txn.get(db, &key) {
            Ok(val) => Some(val.to_vec()),
            Err(lmdb::Error::NotFound) => None,
            Err(err) => err_at!(BackendFail, Err(err))?,
        };
        Ok(val)
    }

    /// Return the last `(key, value)` row of the database, or None when
    /// empty.
    pub fn last(&self, db: Db) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let txn = err_at!(BackendFail, self.env.begin_ro_txn())?;
        let cursor = err_at!(BackendFail, txn.open_ro_cursor(db))?;
        match cursor.get(None, None, lmdb_sys::MDB_LAST) {
            Ok((Some(key), val)) => Ok(Some((key.to_vec(), val.to_vec()))),
            Ok((None, _)) => Ok(None),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Begin the environment's single write transaction.
    pub fn begin_write(&self) -> Result<WriteTxn> {
        if self.readonly {
            err_at!(ReadOnly, msg: "write on read-only slab {:?}", self.dir)?;
        }
        let txn = err_at!(BackendFail, self.env.begin_rw_txn())?;
        Ok(WriteTxn { txn })
    }

    /// Scan every row of `db` in key order.
    pub fn scan_full(&self, db: Db) -> Scan {
        Scan::new(Arc::clone(&self.env), db, ScanKind::Full)
    }

    /// Scan rows whose key starts with `pref`, in key order. On dup
    /// databases every duplicate is yielded.
    pub fn scan_by_pref(&self, db: Db, pref: &[u8]) -> Scan {
        let kind = ScanKind::Pref {
            pref: pref.to_vec(),
        };
        Scan::new(Arc::clone(&self.env), db, kind)
    }

    /// Scan rows with `lo <= key <= hi`, in key order.
    pub fn scan_by_range(&self, db: Db, lo: &[u8], hi: &[u8]) -> Scan {
        let kind = ScanKind::Range {
            lo: lo.to_vec(),
            hi: hi.to_vec(),
        };
        Scan::new(Arc::clone(&self.env), db, kind)
    }

    /// Scan every duplicate stored under `key` in a dup database.
    pub fn scan_by_dups(&self, db: Db, key: &[u8]) -> Scan {
        self.scan_by_range(db, key, key)
    }

    /// Scan rows with `key <= from` in reverse key order. Meant for
    /// non-dup databases.
    pub fn scan_back(&self, db: Db, from: &[u8]) -> BackScan {
        BackScan {
            env: Arc::clone(&self.env),
            db,
            from: from.to_vec(),
            last: None,
            batch: vec![].into_iter(),
            done: false,
        }
    }
}

/// Single write transaction over a [Slab]. All mutations of one
/// node-edit batch ride one value of this type and commit atomically.
pub struct WriteTxn<'a> {
    txn: lmdb::RwTransaction<'a>,
}

impl<'a> WriteTxn<'a> {
    /// Read through the uncommitted transaction state.
    pub fn get(&self, db: Db, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.txn.get(db, &key) {
            Ok(val) => Ok(Some(val.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Insert or overwrite `key` in a regular database.
    pub fn put(&mut self, db: Db, key: &[u8], val: &[u8]) -> Result<()> {
        let flags = lmdb::WriteFlags::empty();
        err_at!(BackendFail, self.txn.put(db, &key, &val, flags))
    }

    /// Insert `key` only when absent. Return whether the row was
    /// inserted.
    pub fn put_if_absent(&mut self, db: Db, key: &[u8], val: &[u8]) -> Result<bool> {
        let flags = lmdb::WriteFlags::NO_OVERWRITE;
        match self.txn.put(db, &key, &val, flags) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::KeyExist) => Ok(false),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Insert a duplicate row into a dup database. Re-inserting an
    /// existing `(key, val)` pair is a no-op.
    pub fn put_dup(&mut self, db: Db, key: &[u8], val: &[u8]) -> Result<()> {
        let flags = lmdb::WriteFlags::NO_DUP_DATA;
        match self.txn.put(db, &key, &val, flags) {
            Ok(()) | Err(lmdb::Error::KeyExist) => Ok(()),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Delete `key` from a regular database. Return whether a row was
    /// removed.
    pub fn del(&mut self, db: Db, key: &[u8]) -> Result<bool> {
        match self.txn.del(db, &key, None) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Delete one `(key, val)` duplicate from a dup database.
    pub fn del_dup(&mut self, db: Db, key: &[u8], val: &[u8]) -> Result<bool> {
        match self.txn.del(db, &key, Some(val)) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(err) => err_at!(BackendFail, Err(err)),
        }
    }

    /// Overwrite `key` and return the previous value, if any.
    pub fn replace(&mut self, db: Db, key: &[u8], val: &[u8]) -> Result<Option<Vec<u8>>> {
        let oldv = self.get(db, key)?;
        self.put(db, key, val)?;
        Ok(oldv)
    }

    /// Delete `key` and return the previous value, if any.
    pub fn pop(&mut self, db: Db, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let oldv = self.get(db, key)?;
        if oldv.is_some() {
            self.del(db, key)?;
        }
        Ok(oldv)
    }

    /// Collect the keys starting with `pref`, reading through the
    /// uncommitted transaction state.
    pub fn scan_pref_keys(&self, db: Db, pref: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut cursor = err_at!(BackendFail, self.txn.open_ro_cursor(db))?;
        let mut keys = vec![];
        for item in cursor.iter_from(pref.to_vec()) {
            let (key, _) = item;
            if !key.starts_with(pref) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Bulk insert rows whose keys sort after every existing key.
    pub fn append(&mut self, db: Db, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let flags = lmdb::WriteFlags::APPEND;
        for (key, val) in rows {
            err_at!(BackendFail, self.txn.put(db, key, val, flags))?;
        }
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        err_at!(BackendFail, self.txn.commit())
    }

    /// Discard the transaction, nothing reaches the backend.
    pub fn abort(self) {
        self.txn.abort()
    }
}

enum ScanKind {
    Full,
    Pref { pref: Vec<u8> },
    Range { lo: Vec<u8>, hi: Vec<u8> },
}

/// Chunked forward scan over one database. Refer [Slab::scan_by_pref],
/// [Slab::scan_by_range], [Slab::scan_by_dups] and [Slab::scan_full].
pub struct Scan {
    env: Arc<lmdb::Environment>,
    db: Db,
    kind: ScanKind,
    last: Option<(Vec<u8>, Vec<u8>)>,
    batch: vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    done: bool,
}

impl Scan {
    fn new(env: Arc<lmdb::Environment>, db: Db, kind: ScanKind) -> Scan {
        Scan {
            env,
            db,
            kind,
            last: None,
            batch: vec![].into_iter(),
            done: false,
        }
    }

    fn refill(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = err_at!(BackendFail, self.env.begin_ro_txn())?;
        let mut cursor = err_at!(BackendFail, txn.open_ro_cursor(self.db))?;

        let start: Option<Vec<u8>> = match (&self.last, &self.kind) {
            (Some((key, _)), _) => Some(key.clone()),
            (None, ScanKind::Full) => None,
            (None, ScanKind::Pref { pref }) => Some(pref.clone()),
            (None, ScanKind::Range { lo, .. }) => Some(lo.clone()),
        };

        let iter = match &start {
            Some(key) => cursor.iter_from(key.clone()),
            None => cursor.iter_start(),
        };

        let mut batch = Vec::with_capacity(SCAN_CHUNK);
        for item in iter {
            let (key, val) = item;
            // skip rows already yielded from the previous chunk.
            if let Some((lkey, lval)) = &self.last {
                if key == lkey.as_slice() && val <= lval.as_slice() {
                    continue;
                }
            }
            match &self.kind {
                ScanKind::Full => (),
                ScanKind::Pref { pref } => {
                    if !key.starts_with(pref) {
                        break;
                    }
                }
                ScanKind::Range { hi, .. } => {
                    if key > hi.as_slice() {
                        break;
                    }
                }
            }
            batch.push((key.to_vec(), val.to_vec()));
            if batch.len() >= SCAN_CHUNK {
                break;
            }
        }

        Ok(batch)
    }
}

impl Iterator for Scan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, val)) = self.batch.next() {
                self.last = Some((key.clone(), val.clone()));
                return Some(Ok((key, val)));
            }
            if self.done {
                return None;
            }
            match self.refill() {
                Ok(batch) => {
                    if batch.len() < SCAN_CHUNK {
                        self.done = true;
                    }
                    if batch.is_empty() {
                        return None;
                    }
                    self.batch = batch.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Chunked reverse scan, refer [Slab::scan_back].
pub struct BackScan {
    env: Arc<lmdb::Environment>,
    db: Db,
    from: Vec<u8>,
    last: Option<Vec<u8>>,
    batch: vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    done: bool,
}

impl BackScan {
    fn refill(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = err_at!(BackendFail, self.env.begin_ro_txn())?;
        let cursor = err_at!(BackendFail, txn.open_ro_cursor(self.db))?;

        let bound = match &self.last {
            Some(key) => key.clone(),
            None => self.from.clone(),
        };

        // position at the highest key <= bound.
        let mut entry = match cursor.get(Some(bound.as_slice()), None, lmdb_sys::MDB_SET_RANGE) {
            Ok((Some(key), val)) => {
                if key > bound.as_slice() {
                    prev_entry(&cursor)?
                } else {
                    Some((key.to_vec(), val.to_vec()))
                }
            }
            Ok((None, _)) | Err(lmdb::Error::NotFound) => {
                match cursor.get(None, None, lmdb_sys::MDB_LAST) {
                    Ok((Some(key), val)) => Some((key.to_vec(), val.to_vec())),
                    Ok((None, _)) | Err(lmdb::Error::NotFound) => None,
                    Err(err) => err_at!(BackendFail, Err(err))?,
                }
            }
            Err(err) => err_at!(BackendFail, Err(err))?,
        };

        let mut batch = Vec::with_capacity(SCAN_CHUNK);
        while let Some((key, val)) = entry.take() {
            let skip = match &self.last {
                Some(lkey) => key >= *lkey,
                None => false,
            };
            if !skip {
                batch.push((key, val));
                if batch.len() >= SCAN_CHUNK {
                    break;
                }
            }
            entry = prev_entry(&cursor)?;
        }

        Ok(batch)
    }
}

fn prev_entry(cursor: &lmdb::RoCursor) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    match cursor.get(None, None, lmdb_sys::MDB_PREV) {
        Ok((Some(key), val)) => Ok(Some((key.to_vec(), val.to_vec()))),
        Ok((None, _)) | Err(lmdb::Error::NotFound) => Ok(None),
        Err(err) => err_at!(BackendFail, Err(err)),
    }
}

impl Iterator for BackScan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, val)) = self.batch.next() {
                self.last = Some(key.clone());
                return Some(Ok((key, val)));
            }
            if self.done {
                return None;
            }
            match self.refill() {
                Ok(batch) => {
                    if batch.len() < SCAN_CHUNK {
                        self.done = true;
                    }
                    if batch.is_empty() {
                        return None;
                    }
                    self.batch = batch.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
