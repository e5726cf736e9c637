//! Module implement the append-only sequence log.
//!
//! Items are keyed by a monotonic 8-byte big-endian offset, so scanning
//! the backing database in key order replays the log in append order.
//! Waiters can register for an offset and are woken as soon as the log
//! grows past it.

use cbordata::{FromCbor, IntoCbor};

use std::{
    cmp,
    collections::BinaryHeap,
    marker::PhantomData,
    sync::{Arc, Mutex},
    time,
};

use crate::{
    slab::{BackScan, Db, Scan, Slab},
    util::{self, Event},
    Error, Result,
};

/// Durable append-only log of CBOR-serialized items.
pub struct Seqn {
    slab: Arc<Slab>,
    db: Db,
    indx: Mutex<u64>,
    waiters: Mutex<Waiters>,
}

struct Waiters {
    heap: BinaryHeap<cmp::Reverse<OffsetWait>>,
    counter: u64,
}

struct OffsetWait {
    offs: u64,
    counter: u64,
    event: Event,
}

// the counter gives FIFO order among waiters for the same offset.
impl PartialEq for OffsetWait {
    fn eq(&self, other: &Self) -> bool {
        (self.offs, self.counter) == (other.offs, other.counter)
    }
}

impl Eq for OffsetWait {}

impl PartialOrd for OffsetWait {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OffsetWait {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        (self.offs, self.counter).cmp(&(other.offs, other.counter))
    }
}

impl Seqn {
    /// Open the named sequence within `slab`, resuming the offset
    /// counter from storage.
    pub fn new(slab: Arc<Slab>, name: &str) -> Result<Seqn> {
        let db = slab.init_db(name, false)?;

        let indx = match slab.last(db)? {
            Some((key, _)) => util::key_to_u64(&key)? + 1,
            None => 0,
        };

        let val = Seqn {
            slab,
            db,
            indx: Mutex::new(indx),
            waiters: Mutex::new(Waiters {
                heap: BinaryHeap::new(),
                counter: 0,
            }),
        };

        Ok(val)
    }

    /// Append a single item, return its offset.
    pub fn add<T>(&self, item: T) -> Result<u64>
    where
        T: IntoCbor,
    {
        let data = util::into_cbor_bytes(item)?;

        let mut indx = err_at!(Fatal, self.indx.lock())?;
        let offs = *indx;

        let mut txn = self.slab.begin_write()?;
        txn.append(self.db, &[(util::u64_to_key(offs).to_vec(), data)])?;
        txn.commit()?;

        *indx += 1;
        let next = *indx;
        drop(indx);

        self.wake_waiters(next);

        Ok(offs)
    }

    /// Append a batch of items in one transaction, return the offset of
    /// the first item.
    pub fn save<T>(&self, items: Vec<T>) -> Result<u64>
    where
        T: IntoCbor,
    {
        let mut indx = err_at!(Fatal, self.indx.lock())?;
        let offs = *indx;

        let mut rows = vec![];
        for item in items {
            let key = util::u64_to_key(*indx + (rows.len() as u64));
            rows.push((key.to_vec(), util::into_cbor_bytes(item)?));
        }

        let mut txn = self.slab.begin_write()?;
        txn.append(self.db, &rows)?;
        txn.commit()?;

        *indx += rows.len() as u64;
        let next = *indx;
        drop(indx);

        self.wake_waiters(next);

        Ok(offs)
    }

    /// Fetch a single item by offset.
    pub fn get<T>(&self, offs: u64) -> Result<Option<T>>
    where
        T: FromCbor,
    {
        match self.slab.get(self.db, &util::u64_to_key(offs))? {
            Some(data) => Ok(Some(util::from_cbor_bytes(&data)?.0)),
            None => Ok(None),
        }
    }

    /// Return the last `(offset, item)` or None when the log is empty.
    pub fn last<T>(&self) -> Result<Option<(u64, T)>>
    where
        T: FromCbor,
    {
        match self.slab.last(self.db)? {
            Some((key, data)) => {
                let offs = util::key_to_u64(&key)?;
                Ok(Some((offs, util::from_cbor_bytes(&data)?.0)))
            }
            None => Ok(None),
        }
    }

    /// Next offset that will be assigned.
    pub fn index(&self) -> u64 {
        *self.indx.lock().unwrap()
    }

    /// Iterate items in offset order starting from `from`.
    pub fn iter<T>(&self, from: u64) -> SeqnIter<T>
    where
        T: FromCbor,
    {
        let scan = self.slab.scan_by_range(
            self.db,
            &util::u64_to_key(from),
            &[0xff_u8; 8],
        );
        SeqnIter {
            scan,
            limit: None,
            _item: PhantomData,
        }
    }

    /// Iterate at most `size` items starting from `from`.
    pub fn slice<T>(&self, from: u64, size: usize) -> SeqnIter<T>
    where
        T: FromCbor,
    {
        let mut iter = self.iter(from);
        iter.limit = Some(size);
        iter
    }

    /// Iterate items in reverse offset order starting from `from`.
    pub fn iter_back<T>(&self, from: u64) -> SeqnBackIter<T>
    where
        T: FromCbor,
    {
        let scan = self.slab.scan_back(self.db, &util::u64_to_key(from));
        SeqnBackIter {
            scan,
            _item: PhantomData,
        }
    }

    /// Return an [Event] that fires once `offs` is written. The event
    /// comes back already set when the log has grown past `offs`.
    pub fn get_offset_event(&self, offs: u64) -> Event {
        let event = Event::new();

        if offs < self.index() {
            event.set();
            return event;
        }

        let mut waiters = self.waiters.lock().unwrap();
        let wait = OffsetWait {
            offs,
            counter: waiters.counter,
            event: event.clone(),
        };
        waiters.counter += 1;
        waiters.heap.push(cmp::Reverse(wait));

        event
    }

    /// Block until offset `offs` is written, return false on timeout.
    pub fn wait_for_offset(&self, offs: u64, timeout: Option<time::Duration>) -> bool {
        if offs < self.index() {
            return true;
        }
        self.get_offset_event(offs).wait(timeout)
    }

    fn wake_waiters(&self, indx: u64) {
        let mut waiters = self.waiters.lock().unwrap();
        while let Some(cmp::Reverse(wait)) = waiters.heap.peek() {
            if wait.offs >= indx {
                break;
            }
            let cmp::Reverse(wait) = waiters.heap.pop().unwrap();
            wait.event.set();
        }
    }
}

/// Forward iterator over `(offset, item)` pairs, refer [Seqn::iter].
pub struct SeqnIter<T> {
    scan: Scan,
    limit: Option<usize>,
    _item: PhantomData<T>,
}

impl<T> Iterator for SeqnIter<T>
where
    T: FromCbor,
{
    type Item = Result<(u64, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(0) = self.limit {
            return None;
        }
        let (key, data) = match self.scan.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        if let Some(limit) = self.limit.as_mut() {
            *limit -= 1;
        }
        let item = || -> Result<(u64, T)> {
            let offs = util::key_to_u64(&key)?;
            Ok((offs, util::from_cbor_bytes(&data)?.0))
        }();
        Some(item)
    }
}

/// Reverse iterator over `(offset, item)` pairs, refer [Seqn::iter_back].
pub struct SeqnBackIter<T> {
    scan: BackScan,
    _item: PhantomData<T>,
}

impl<T> Iterator for SeqnBackIter<T>
where
    T: FromCbor,
{
    type Item = Result<(u64, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, data) = match self.scan.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        let item = || -> Result<(u64, T)> {
            let offs = util::key_to_u64(&key)?;
            Ok((offs, util::from_cbor_bytes(&data)?.0))
        }();
        Some(item)
    }
}

#[cfg(test)]
#[path = "seqn_test.rs"]
mod seqn_test;
