//! Module implement common utility functions and types.

use cbordata::{Cbor, FromCbor, IntoCbor};
use rand::Rng;

use std::{
    convert::TryInto,
    sync::{Arc, Condvar, Mutex},
    time,
};

use crate::{Error, Result};

/// Helper function to serialize value `T` implementing IntoCbor, into byte-string.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let n = err_at!(
        FailCbor,
        err_at!(FailCbor, val.into_cbor())?.encode(&mut data)
    )?;
    if n != data.len() {
        err_at!(Fatal, msg: "cbor encoding len mistmatch {} {}", n, data.len())
    } else {
        Ok(data)
    }
}

/// Helper function to deserialize value `T` implementing FromCbor, from byte-string.
/// Return (value, bytes-consumed)
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    Ok((err_at!(FailCbor, T::from_cbor(val))?, n))
}

/// Encode a log offset / abbreviation id into its big-endian key form.
#[inline]
pub fn u64_to_key(offs: u64) -> [u8; 8] {
    offs.to_be_bytes()
}

/// Decode a big-endian 8-byte key back into its offset.
pub fn key_to_u64(key: &[u8]) -> Result<u64> {
    let byts: [u8; 8] = match key.try_into() {
        Ok(byts) => byts,
        Err(_) => err_at!(DecodeFail, msg: "offset key {} bytes", key.len())?,
    };
    Ok(u64::from_be_bytes(byts))
}

/// Return current wall-clock time as milliseconds since UNIX epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a 32-hexdigit identifier, useful to name layers and peers.
pub fn guid() -> String {
    let mut rng = rand::thread_rng();
    let (a, b): (u64, u64) = (rng.gen(), rng.gen());
    format!("{:016x}{:016x}", a, b)
}

/// One-shot synchronization event, clones share the same state.
///
/// Used by the sequence-log offset waiters and the upstream-offset
/// waiters. Once set an event stays set.
#[derive(Clone, Default)]
pub struct Event {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Event {
    pub fn new() -> Event {
        Event::default()
    }

    pub fn set(&self) {
        let (lock, cvar) = &*self.state;
        let mut fired = lock.lock().unwrap();
        *fired = true;
        cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.state;
        *lock.lock().unwrap()
    }

    /// Block until the event fires. `timeout` of None waits forever.
    /// Return whether the event fired within the allowed time.
    pub fn wait(&self, timeout: Option<time::Duration>) -> bool {
        let (lock, cvar) = &*self.state;
        let mut fired = lock.lock().unwrap();
        match timeout {
            Some(timeout) => {
                let deadline = time::Instant::now() + timeout;
                while !*fired {
                    let now = time::Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, res) = cvar.wait_timeout(fired, deadline - now).unwrap();
                    fired = guard;
                    if res.timed_out() && !*fired {
                        return false;
                    }
                }
                true
            }
            None => {
                while !*fired {
                    fired = cvar.wait(fired).unwrap();
                }
                true
            }
        }
    }
}
