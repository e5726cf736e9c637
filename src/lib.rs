//! Stratum implement a transactional graph storage layer. A layer maps
//! opaque 32-byte node identifiers, called `buid`, to a structured record
//! made of a primary form value, secondary properties, tags, tag-properties
//! and opaque node-data blobs. Every stored value is mirrored into typed,
//! order-preserving secondary indexes so that nodes can be lifted by
//! equality, range, prefix, regex and geo comparisons.
//!
//! Mutations enter through node-edits, a `(buid, form, [edit, ..])` batch.
//! Applied edits are recorded in a durable append-only sequence log which
//! doubles as the write-ahead stream, the live subscription feed and the
//! replication payload for downstream follower layers.
//!
//! Quick tour of the modules:
//!
//! * [slab] wraps the embedded LMDB backend, single-writer/multi-reader.
//! * [seqn] is the append-only edit log with offset wait events.
//! * [abrv] compresses name tuples into fixed-width index prefixes.
//! * [stortypes] maps storage-type codes to index encoders and lifters.
//! * [layer] owns everything and exposes the storage API.

use std::result;

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(ReadOnly, msg: "write on read-only layer")
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path), "reading {:?}", file_path)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

mod error;
pub mod util;

pub mod abrv;
pub mod config;
pub mod gis;
pub mod hotcount;
pub mod layer;
pub mod seqn;
pub mod slab;
pub mod stortypes;
pub mod types;

pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::layer::{Layer, StorNode, Upstream};
pub use crate::types::{Buid, Edit, EditMeta, NodeEdit, Valu};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
