//! Module implement the storage-type dispatch.
//!
//! Every property value carries a storage-type code that selects how the
//! value is rendered into order-preserving index bytes and which
//! comparators can lift it back. Handlers are stateless; the per-lift
//! context travels in an [IndxBy], which bundles the dup database, the
//! abbreviation prefix and enough of the layer to re-read stored values
//! for post-filtering lifters.

use lazy_static::lazy_static;
use log::warn;

use crate::{
    slab::{Db, Slab},
    types::{
        self, Buid, FormRow, PropRow, Valu, ROW_PROP, ROW_TAGPROP, STOR_FLAG_ARRAY,
    },
    util, Error, Result,
};

mod int;
mod misc;
mod utf8;

pub use int::{StorTypeInt, StorTypeTime};
pub use misc::{StorTypeGuid, StorTypeIpv6, StorTypeIval, StorTypeLatLong, StorTypeMsgp};
pub use utf8::{StorTypeFqdn, StorTypeHier, StorTypeUtf8};

/// One storage-type handler: value to index bytes, comparator to buids.
pub trait StorType: Send + Sync {
    /// Render `valu` into one or more index keys. Scalars produce
    /// exactly one, arrays are handled a level above by [stor_indx].
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>>;

    /// Lift the buids whose indexed value satisfies `cmpr` against
    /// `valu`. Unknown comparators fail with `NoSuchCmpr`.
    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>>;
}

lazy_static! {
    static ref STOR_TYPES: Vec<Box<dyn StorType>> = vec![
        Box::new(Unknown),
        Box::new(StorTypeUtf8),
        Box::new(StorTypeInt::new(1, false)),
        Box::new(StorTypeInt::new(2, false)),
        Box::new(StorTypeInt::new(4, false)),
        Box::new(StorTypeInt::new(8, false)),
        Box::new(StorTypeInt::new(1, true)),
        Box::new(StorTypeInt::new(2, true)),
        Box::new(StorTypeInt::new(4, true)),
        Box::new(StorTypeInt::new(8, true)),
        Box::new(StorTypeGuid),
        Box::new(StorTypeTime::new()),
        Box::new(StorTypeIval::new()),
        Box::new(StorTypeMsgp),
        Box::new(StorTypeLatLong::new()),
        Box::new(StorTypeHier::new('.')),
        Box::new(StorTypeHier::new('.')),
        Box::new(StorTypeFqdn::new()),
        Box::new(StorTypeIpv6),
        Box::new(StorTypeInt::new(16, false)),
        Box::new(StorTypeInt::new(16, true)),
    ];
}

struct Unknown;

impl StorType for Unknown {
    fn indx(&self, _valu: &Valu) -> Result<Vec<Vec<u8>>> {
        err_at!(InvalidInput, msg: "storage type 0")
    }

    fn lift(&self, _ixby: &IndxBy, _cmpr: &str, _valu: &Valu) -> Result<Vec<Buid>> {
        err_at!(InvalidInput, msg: "storage type 0")
    }
}

/// Resolve a scalar storage-type code to its handler.
pub fn get(stortype: u16) -> Result<&'static dyn StorType> {
    let code = (stortype & !STOR_FLAG_ARRAY) as usize;
    match STOR_TYPES.get(code) {
        Some(handler) if code > 0 => Ok(handler.as_ref()),
        _ => err_at!(InvalidInput, msg: "no storage type {}", stortype),
    }
}

/// Render `valu` into index keys, handling the array flag: arrays
/// produce the concatenation of per-element keys of the real type.
pub fn stor_indx(stortype: u16, valu: &Valu) -> Result<Vec<Vec<u8>>> {
    if stortype & STOR_FLAG_ARRAY != 0 {
        let realtype = stortype & !STOR_FLAG_ARRAY;
        let items = match valu.as_list() {
            Some(items) => items,
            None => err_at!(InvalidInput, msg: "array storage type on scalar value")?,
        };
        let mut keys = vec![];
        for item in items {
            keys.extend(stor_indx(realtype, item)?);
        }
        Ok(keys)
    } else {
        get(stortype)?.indx(valu)
    }
}

/// Where an [IndxBy] can re-read the stored value for a buid, used by
/// post-filtering lifters (regex, interval filters).
pub enum NodeValuSrc {
    /// The form value row.
    Form,
    /// A secondary property row, whole value (arrays included).
    Prop(String),
    /// A tag-property row.
    TagProp { tag: String, prop: String },
    /// No re-read possible in this context.
    None,
}

/// Lift context: the dup database to scan, the abbreviation prefix to
/// scan under, and the value source for re-reading lifters.
pub struct IndxBy<'a> {
    pub slab: &'a Slab,
    pub db: Db,
    pub bybuid: Db,
    pub abrv: Vec<u8>,
    pub src: NodeValuSrc,
}

impl<'a> IndxBy<'a> {
    fn key(&self, indx: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.abrv.len() + indx.len());
        key.extend_from_slice(&self.abrv);
        key.extend_from_slice(indx);
        key
    }

    /// Buids stored under exactly `abrv + indx`.
    pub fn buids_by_dups(&self, indx: &[u8]) -> Result<Vec<Buid>> {
        let mut buids = vec![];
        for item in self.slab.scan_by_dups(self.db, &self.key(indx)) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        Ok(buids)
    }

    /// Buids under every key starting with `abrv + indx`.
    pub fn buids_by_pref(&self, indx: &[u8]) -> Result<Vec<Buid>> {
        let mut buids = vec![];
        for item in self.slab.scan_by_pref(self.db, &self.key(indx)) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        Ok(buids)
    }

    /// Buids under keys between `abrv + lo` and `abrv + hi`, inclusive.
    pub fn buids_by_range(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<Buid>> {
        let mut buids = vec![];
        for item in self.slab.scan_by_range(self.db, &self.key(lo), &self.key(hi)) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        Ok(buids)
    }

    /// Like [Self::buids_by_pref] but keeps the index key, for lifters
    /// that inspect key suffixes.
    pub fn scan_by_pref(&self, indx: &[u8]) -> Result<Vec<(Vec<u8>, Buid)>> {
        let mut items = vec![];
        for item in self.slab.scan_by_pref(self.db, &self.key(indx)) {
            let (key, val) = item?;
            items.push((key, Buid::from_slice(&val)));
        }
        Ok(items)
    }

    /// Like [Self::buids_by_range] but keeps the index key.
    pub fn scan_by_range(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<(Vec<u8>, Buid)>> {
        let mut items = vec![];
        for item in self.slab.scan_by_range(self.db, &self.key(lo), &self.key(hi)) {
            let (key, val) = item?;
            items.push((key, Buid::from_slice(&val)));
        }
        Ok(items)
    }

    /// Re-read the stored value behind `buid` for this context.
    /// Undecodable rows are logged and skipped, contexts without a
    /// value source fail with `NoSuchImpl`.
    pub fn get_node_valu(&self, buid: &Buid) -> Result<Option<Valu>> {
        let bkey = match &self.src {
            NodeValuSrc::Form => {
                let mut bkey = buid.as_bytes().to_vec();
                bkey.push(types::ROW_FORM);
                bkey
            }
            NodeValuSrc::Prop(prop) => {
                let mut bkey = buid.as_bytes().to_vec();
                bkey.push(ROW_PROP);
                bkey.extend_from_slice(prop.as_bytes());
                bkey
            }
            NodeValuSrc::TagProp { tag, prop } => {
                let mut bkey = buid.as_bytes().to_vec();
                bkey.push(ROW_TAGPROP);
                bkey.extend_from_slice(tag.as_bytes());
                bkey.push(b':');
                bkey.extend_from_slice(prop.as_bytes());
                bkey
            }
            NodeValuSrc::None => {
                err_at!(NoSuchImpl, msg: "no value source in this lift context")?
            }
        };

        let data = match self.slab.get(self.bybuid, &bkey)? {
            Some(data) => data,
            None => return Ok(None),
        };

        let valu = match &self.src {
            NodeValuSrc::Form => match util::from_cbor_bytes::<FormRow>(&data) {
                Ok((row, _)) => Some(row.valu),
                Err(err) => {
                    warn!(target: "stratum", "undecodable form row {:?}: {}", buid, err);
                    None
                }
            },
            _ => match util::from_cbor_bytes::<PropRow>(&data) {
                Ok((row, _)) => Some(row.valu),
                Err(err) => {
                    warn!(target: "stratum", "undecodable prop row {:?}: {}", buid, err);
                    None
                }
            },
        };

        Ok(valu)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
