//! Module implement write-coalescing counters.
//!
//! A [HotCount] keeps its authoritative values in process and writes
//! them through the caller's transaction, one row per counter. Used for
//! per-form node counts and for log/replication offsets.

use std::{
    collections::HashMap,
    convert::TryInto,
    sync::{Arc, Mutex},
};

use crate::{
    slab::{Db, Slab, WriteTxn},
    Error, Result,
};

/// Durable map of named `i64` counters.
pub struct HotCount {
    db: Db,
    cache: Mutex<HashMap<String, i64>>,
}

impl HotCount {
    /// Open the `name` counter database within `slab` and warm the
    /// cache with every persisted counter.
    pub fn new(slab: &Arc<Slab>, name: &str) -> Result<HotCount> {
        let db = slab.init_db(name, false)?;

        let mut cache = HashMap::new();
        for item in slab.scan_full(db) {
            let (key, data) = item?;
            let name = match String::from_utf8(key) {
                Ok(name) => name,
                Err(err) => err_at!(DecodeFail, msg: "counter name {}", err)?,
            };
            cache.insert(name, decode_count(&data)?);
        }

        Ok(HotCount {
            db,
            cache: Mutex::new(cache),
        })
    }

    /// Read a counter, None when never written.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.cache.lock().unwrap().get(name).copied()
    }

    /// Set a counter to an absolute value.
    pub fn set(&self, txn: &mut WriteTxn, name: &str, valu: i64) -> Result<()> {
        txn.put(self.db, name.as_bytes(), &valu.to_be_bytes())?;
        self.cache.lock().unwrap().insert(name.to_string(), valu);
        Ok(())
    }

    /// Add `delta` to a counter, creating it at zero when absent.
    /// Return the new value.
    pub fn inc(&self, txn: &mut WriteTxn, name: &str, delta: i64) -> Result<i64> {
        let valu = self.get(name).unwrap_or(0) + delta;
        self.set(txn, name, valu)?;
        Ok(valu)
    }

    /// Snapshot every counter.
    pub fn pack(&self) -> HashMap<String, i64> {
        self.cache.lock().unwrap().clone()
    }
}

fn decode_count(data: &[u8]) -> Result<i64> {
    let byts: [u8; 8] = match data.try_into() {
        Ok(byts) => byts,
        Err(_) => err_at!(DecodeFail, msg: "counter row {} bytes", data.len())?,
    };
    Ok(i64::from_be_bytes(byts))
}

#[cfg(test)]
#[path = "hotcount_test.rs"]
mod hotcount_test;
