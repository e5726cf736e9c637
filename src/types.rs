//! Module define the wire and storage types shared across the layer.
//!
//! Values are self-describing [Valu] variants. Storage-type codes select
//! the index encoding for a value, they never change its in-row
//! representation. Node-edits and their applied records both use the
//! [NodeEdit] shape; the sequence log stores `(changes, meta)` pairs as
//! [LogEntry].

use cbordata::{Cbor, Cborize, Error as CborError, FromCbor, IntoCbor};
use sha2::{Digest, Sha256};

use std::{cmp, fmt, result};

use crate::{util, Result};

/// Storage type for UTF-8 strings.
pub const STOR_TYPE_UTF8: u16 = 1;

pub const STOR_TYPE_U8: u16 = 2;
pub const STOR_TYPE_U16: u16 = 3;
pub const STOR_TYPE_U32: u16 = 4;
pub const STOR_TYPE_U64: u16 = 5;

pub const STOR_TYPE_I8: u16 = 6;
pub const STOR_TYPE_I16: u16 = 7;
pub const STOR_TYPE_I32: u16 = 8;
pub const STOR_TYPE_I64: u16 = 9;

pub const STOR_TYPE_GUID: u16 = 10;
pub const STOR_TYPE_TIME: u16 = 11;
pub const STOR_TYPE_IVAL: u16 = 12;
pub const STOR_TYPE_MSGP: u16 = 13;
pub const STOR_TYPE_LATLONG: u16 = 14;

pub const STOR_TYPE_LOC: u16 = 15;
pub const STOR_TYPE_TAG: u16 = 16;
pub const STOR_TYPE_FQDN: u16 = 17;
pub const STOR_TYPE_IPV6: u16 = 18;

pub const STOR_TYPE_U128: u16 = 19;
pub const STOR_TYPE_I128: u16 = 20;

/// Values of type `stortype | STOR_FLAG_ARRAY` are arrays of the real type.
pub const STOR_FLAG_ARRAY: u16 = 0x8000;

/// Row-kind discriminator on `bybuid` keys, the form value row.
pub const ROW_FORM: u8 = 0x00;
/// Row-kind discriminator, one secondary property row.
pub const ROW_PROP: u8 = 0x01;
/// Row-kind discriminator, one tag row.
pub const ROW_TAG: u8 = 0x02;
/// Row-kind discriminator, one tag-property row.
pub const ROW_TAGPROP: u8 = 0x03;

/// Opaque 32-byte node identifier, content-addressed from (form, value).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Buid(pub [u8; 32]);

impl Buid {
    /// Derive the identifier for `(form, valu)`, the canonical hash of its
    /// serialized form.
    pub fn from_ndef(form: &str, valu: &Valu) -> Result<Buid> {
        let data = util::into_cbor_bytes(NdefRow {
            form: form.to_string(),
            valu: valu.clone(),
        })?;
        Ok(Buid::hash(&data))
    }

    /// Hash arbitrary bytes into a buid-shaped content address.
    pub fn hash(data: &[u8]) -> Buid {
        let digest = Sha256::digest(data);
        let mut buid = [0_u8; 32];
        buid.copy_from_slice(&digest);
        Buid(buid)
    }

    /// Interpret `byts` as a buid. Longer slices are truncated, shorter
    /// slices are zero-padded on the right.
    pub fn from_slice(byts: &[u8]) -> Buid {
        let mut buid = [0_u8; 32];
        let n = cmp::min(byts.len(), 32);
        buid[..n].copy_from_slice(&byts[..n]);
        Buid(buid)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Buid {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        for byt in self.0.iter() {
            write!(f, "{:02x}", byt)?;
        }
        Ok(())
    }
}

impl IntoCbor for Buid {
    fn into_cbor(self) -> cbordata::Result<Cbor> {
        self.0.to_vec().into_cbor()
    }
}

impl FromCbor for Buid {
    fn from_cbor(val: Cbor) -> cbordata::Result<Buid> {
        let byts = Vec::<u8>::from_cbor(val)?;
        Ok(Buid::from_slice(&byts))
    }
}

const VALU_VER: u32 = 0x000A0001;

/// Self describing value, the currency between callers, rows and
/// index encoders.
///
/// 128-bit integers are carried as two u64 halves; signed 128-bit
/// values travel in the same carrier as two's complement.
#[derive(Clone, Debug, PartialEq)]
pub enum Valu {
    Nil,
    Bool { v: bool },
    Int { v: i64 },
    Huge { hi: u64, lo: u64 },
    Float { v: f64 },
    Str { v: String },
    Bytes { v: Vec<u8> },
    List { items: Vec<Valu> },
}

impl Default for Valu {
    fn default() -> Valu {
        Valu::Nil
    }
}

// Hand-written in place of `#[derive(Cborize)]`: cbordata-derive 0.6.0's
// enum codegen produces mismatched match-arm types whenever a unit
// variant (`Nil`) is mixed with struct-like variants, so the derive
// cannot be used here. This mirrors exactly the encoding the derive
// would otherwise produce for this shape (tag id, variant name, then
// each field in declaration order; `Vec<u8>` fields go through
// `Cbor::from_bytes`/`into_bytes` like the derive's byte-field case).
impl IntoCbor for Valu {
    fn into_cbor(self) -> cbordata::Result<Cbor> {
        let mut items: Vec<Cbor> = Vec::default();

        let id = Valu::ID.into_cbor()?;
        items.push(cbordata::Tag::from_identifier(id).into());

        match self {
            Valu::Nil => items.push("Nil".into_cbor()?),
            Valu::Bool { v } => {
                items.push("Bool".into_cbor()?);
                items.push(v.into_cbor()?);
            }
            Valu::Int { v } => {
                items.push("Int".into_cbor()?);
                items.push(v.into_cbor()?);
            }
            Valu::Huge { hi, lo } => {
                items.push("Huge".into_cbor()?);
                items.push(hi.into_cbor()?);
                items.push(lo.into_cbor()?);
            }
            Valu::Float { v } => {
                items.push("Float".into_cbor()?);
                items.push(v.into_cbor()?);
            }
            Valu::Str { v } => {
                items.push("Str".into_cbor()?);
                items.push(v.into_cbor()?);
            }
            Valu::Bytes { v } => {
                items.push("Bytes".into_cbor()?);
                items.push(Cbor::from_bytes(v)?);
            }
            Valu::List { items: elems } => {
                items.push("List".into_cbor()?);
                items.push(elems.into_cbor()?);
            }
        }

        items.into_cbor()
    }
}

impl FromCbor for Valu {
    fn from_cbor(value: Cbor) -> cbordata::Result<Valu> {
        let mut items = Vec::<Cbor>::from_cbor(value)?;

        if items.len() < 2 {
            cbordata::err_at!(FailConvert, msg: "empty msg for Valu")?;
        }
        let data_id = items.remove(0);
        let type_id: Cbor = {
            let id = Valu::ID.into_cbor()?;
            cbordata::Tag::from_identifier(id).into()
        };
        if data_id != type_id {
            cbordata::err_at!(FailConvert, msg: "bad id for Valu")?;
        }

        let variant_name = String::from_cbor(items.remove(0))?;

        let check_arity = |n_fields: usize, items: &Vec<Cbor>| -> cbordata::Result<()> {
            if n_fields != items.len() {
                cbordata::err_at!(FailConvert, msg: "bad arity {} {}", n_fields, items.len())?;
            }
            Ok(())
        };

        let val = match variant_name.as_str() {
            "Nil" => {
                check_arity(0, &items)?;
                Valu::Nil
            }
            "Bool" => {
                check_arity(1, &items)?;
                Valu::Bool { v: FromCbor::from_cbor(items.remove(0))? }
            }
            "Int" => {
                check_arity(1, &items)?;
                Valu::Int { v: FromCbor::from_cbor(items.remove(0))? }
            }
            "Huge" => {
                check_arity(2, &items)?;
                Valu::Huge {
                    hi: FromCbor::from_cbor(items.remove(0))?,
                    lo: FromCbor::from_cbor(items.remove(0))?,
                }
            }
            "Float" => {
                check_arity(1, &items)?;
                Valu::Float { v: FromCbor::from_cbor(items.remove(0))? }
            }
            "Str" => {
                check_arity(1, &items)?;
                Valu::Str { v: FromCbor::from_cbor(items.remove(0))? }
            }
            "Bytes" => {
                check_arity(1, &items)?;
                Valu::Bytes { v: items.remove(0).into_bytes()? }
            }
            "List" => {
                check_arity(1, &items)?;
                Valu::List { items: FromCbor::from_cbor(items.remove(0))? }
            }
            _ => cbordata::err_at!(FailConvert, msg: "invalid variant_name {}", variant_name)?,
        };
        Ok(val)
    }
}

impl Valu {
    const ID: u32 = VALU_VER;

    #[inline]
    pub fn int(v: i64) -> Valu {
        Valu::Int { v }
    }

    #[inline]
    pub fn huge(v: u128) -> Valu {
        Valu::Huge {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }

    #[inline]
    pub fn float(v: f64) -> Valu {
        Valu::Float { v }
    }

    pub fn str(v: &str) -> Valu {
        Valu::Str { v: v.to_string() }
    }

    #[inline]
    pub fn bytes(v: Vec<u8>) -> Valu {
        Valu::Bytes { v }
    }

    #[inline]
    pub fn list(items: Vec<Valu>) -> Valu {
        Valu::List { items }
    }

    /// Time interval `[lo, hi)` in epoch milliseconds.
    pub fn ival(lo: i64, hi: i64) -> Valu {
        Valu::List {
            items: vec![Valu::int(lo), Valu::int(hi)],
        }
    }

    /// Geo point, latitude and longitude in degrees.
    pub fn latlong(lat: f64, lon: f64) -> Valu {
        Valu::List {
            items: vec![Valu::float(lat), Valu::float(lon)],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Valu::Str { v } => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Valu::Int { v } => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Valu::Float { v } => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Valu]> {
        match self {
            Valu::List { items } => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Valu::Nil)
    }
}

const EDIT_VER: u32 = 0x000B0001;

/// One mutation against a node. The same shape records both the
/// requested edit and, after application, what actually changed.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub enum Edit {
    NodeAdd {
        valu: Valu,
        stortype: u16,
    },
    NodeDel {
        valu: Valu,
        stortype: u16,
    },
    PropSet {
        prop: String,
        valu: Valu,
        oldv: Valu,
        stortype: u16,
    },
    PropDel {
        prop: String,
        oldv: Valu,
        stortype: u16,
    },
    TagSet {
        tag: String,
        valu: Valu,
        oldv: Valu,
    },
    TagDel {
        tag: String,
        oldv: Valu,
    },
    TagPropSet {
        tag: String,
        prop: String,
        valu: Valu,
        oldv: Valu,
        stortype: u16,
    },
    TagPropDel {
        tag: String,
        prop: String,
        oldv: Valu,
        stortype: u16,
    },
    NodeDataSet {
        name: String,
        valu: Valu,
        oldv: Valu,
    },
    NodeDataDel {
        name: String,
        oldv: Valu,
    },
}

impl Edit {
    const ID: u32 = EDIT_VER;
}

const NODE_EDIT_VER: u32 = 0x000C0001;

/// Unit of atomic mutation, all edits apply to the same node.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct NodeEdit {
    pub buid: Buid,
    pub form: String,
    pub edits: Vec<Edit>,
}

impl NodeEdit {
    const ID: u32 = NODE_EDIT_VER;

    pub fn new(buid: Buid, form: &str, edits: Vec<Edit>) -> NodeEdit {
        NodeEdit {
            buid,
            form: form.to_string(),
            edits,
        }
    }
}

const EDIT_META_VER: u32 = 0x000D0001;

/// Caller supplied provenance recorded alongside each logged batch.
/// Empty string / zero mean unset.
#[derive(Clone, Debug, Default, PartialEq, Cborize)]
pub struct EditMeta {
    pub user: String,
    pub time: i64,
    pub prov: String,
}

impl EditMeta {
    const ID: u32 = EDIT_META_VER;
}

const LOG_ENTRY_VER: u32 = 0x000E0001;

/// One record of the nodeedit sequence log: the edits that were
/// actually applied, plus the caller's meta.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct LogEntry {
    pub changes: Vec<NodeEdit>,
    pub meta: EditMeta,
}

impl LogEntry {
    const ID: u32 = LOG_ENTRY_VER;
}

const NDEF_ROW_VER: u32 = 0x000F0001;

/// Canonical (form, value) pair, hashed to derive buids.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct NdefRow {
    pub form: String,
    pub valu: Valu,
}

impl NdefRow {
    const ID: u32 = NDEF_ROW_VER;
}

const FORM_ROW_VER: u32 = 0x00110001;

/// Payload of the `bybuid` form row: the node's kind, its primary
/// value and the storage type the value is indexed under.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct FormRow {
    pub form: String,
    pub valu: Valu,
    pub stortype: u16,
}

impl FormRow {
    const ID: u32 = FORM_ROW_VER;
}

const PROP_ROW_VER: u32 = 0x00120001;

/// Payload of a `bybuid` property or tag-property row.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct PropRow {
    pub valu: Valu,
    pub stortype: u16,
}

impl PropRow {
    const ID: u32 = PROP_ROW_VER;
}

const MODEL_VERS_VER: u32 = 0x00100001;

/// Data-model version stamped into the layer info, `(-1, -1, -1)`
/// until explicitly set.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub struct ModelVers {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl ModelVers {
    const ID: u32 = MODEL_VERS_VER;
}

impl Default for ModelVers {
    fn default() -> ModelVers {
        ModelVers {
            major: -1,
            minor: -1,
            patch: -1,
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
