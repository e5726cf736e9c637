//! Module implement name abbreviations.
//!
//! Index keys embed `(form, prop)` style tuples; abbreviations compress
//! each distinct byte-string into a monotonically assigned 8-byte
//! identifier so every index key prefix is fixed width. Assignments are
//! durable, never reused and never removed. The forward and reverse
//! rows in the backend are authoritative; in-process maps accelerate
//! the read side and only grow.

use std::{
    collections::HashMap,
    convert::TryInto,
    sync::{Arc, Mutex},
};

use crate::{
    slab::{Db, Slab, WriteTxn},
    util, Error, Result,
};

/// Width of an abbreviation identifier in index keys.
pub const ABRV_SIZE: usize = 8;

/// Bidirectional bytes <-> 8-byte-identifier map.
pub struct NameAbrv {
    byts2abrv: Db,
    abrv2byts: Db,
    slab: Arc<Slab>,
    next: Mutex<u64>,
    fwd: Mutex<HashMap<Vec<u8>, [u8; ABRV_SIZE]>>,
    rev: Mutex<HashMap<[u8; ABRV_SIZE], Vec<u8>>>,
}

impl NameAbrv {
    /// Open the `name` abbreviation map within `slab`, resuming the
    /// identifier counter from storage.
    pub fn new(slab: Arc<Slab>, name: &str) -> Result<NameAbrv> {
        let byts2abrv = slab.init_db(&format!("{}:byts2abrv", name), false)?;
        let abrv2byts = slab.init_db(&format!("{}:abrv2byts", name), false)?;

        let next = match slab.last(abrv2byts)? {
            Some((key, _)) => util::key_to_u64(&key)? + 1,
            None => 0,
        };

        let val = NameAbrv {
            byts2abrv,
            abrv2byts,
            slab,
            next: Mutex::new(next),
            fwd: Mutex::new(HashMap::new()),
            rev: Mutex::new(HashMap::new()),
        };

        Ok(val)
    }

    /// Return the abbreviation for `byts`, assigning the next identifier
    /// when absent. Assignment rides the caller's write transaction, so
    /// it commits or aborts along with the rows that embed it.
    pub fn to_abrv(&self, txn: &mut WriteTxn, byts: &[u8]) -> Result<[u8; ABRV_SIZE]> {
        if let Some(abrv) = txn.get(self.byts2abrv, byts)? {
            return as_abrv(&abrv);
        }

        let mut next = err_at!(Fatal, self.next.lock())?;
        let abrv = util::u64_to_key(*next);
        *next += 1;
        drop(next);

        txn.put(self.byts2abrv, byts, &abrv)?;
        txn.put(self.abrv2byts, &abrv, byts)?;

        Ok(abrv)
    }

    /// Return the abbreviation for `byts` when already assigned. Lift
    /// paths use this so that reading never grows the map.
    pub fn lookup(&self, byts: &[u8]) -> Result<Option<[u8; ABRV_SIZE]>> {
        if let Some(abrv) = err_at!(Fatal, self.fwd.lock())?.get(byts) {
            return Ok(Some(*abrv));
        }

        match self.slab.get(self.byts2abrv, byts)? {
            Some(data) => {
                let abrv = as_abrv(&data)?;
                err_at!(Fatal, self.fwd.lock())?.insert(byts.to_vec(), abrv);
                Ok(Some(abrv))
            }
            None => Ok(None),
        }
    }

    /// Reverse lookup, from identifier back to the assigned bytes.
    pub fn to_byts(&self, abrv: &[u8]) -> Result<Option<Vec<u8>>> {
        let abrv = as_abrv(abrv)?;

        if let Some(byts) = err_at!(Fatal, self.rev.lock())?.get(&abrv) {
            return Ok(Some(byts.clone()));
        }

        match self.slab.get(self.abrv2byts, &abrv)? {
            Some(byts) => {
                err_at!(Fatal, self.rev.lock())?.insert(abrv, byts.clone());
                Ok(Some(byts))
            }
            None => Ok(None),
        }
    }
}

fn as_abrv(data: &[u8]) -> Result<[u8; ABRV_SIZE]> {
    match data.try_into() {
        Ok(abrv) => Ok(abrv),
        Err(_) => err_at!(DecodeFail, msg: "abbreviation {} bytes", data.len()),
    }
}

#[cfg(test)]
#[path = "abrv_test.rs"]
mod abrv_test;
