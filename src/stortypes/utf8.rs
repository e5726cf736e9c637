//! Storage types for strings: plain UTF-8, hierarchical names and
//! reversed domain names.

use xxhash_rust::xxh64::xxh64;

use crate::{
    stortypes::{IndxBy, StorType},
    types::{Buid, Valu},
    Error, Result,
};

// index values longer than this are cut down to a prefix plus a digest
// of the full encoding.
const TRUNC_AT: usize = 256;
const TRUNC_KEEP: usize = 248;

fn utf8_indx(valu: &str) -> Vec<u8> {
    let indx = valu.as_bytes();
    if indx.len() <= TRUNC_AT {
        return indx.to_vec();
    }

    let mut key = indx[..TRUNC_KEEP].to_vec();
    key.extend_from_slice(&xxh64(indx, 0).to_be_bytes());
    key
}

fn as_str<'a>(valu: &'a Valu) -> Result<&'a str> {
    match valu.as_str() {
        Some(s) => Ok(s),
        None => err_at!(InvalidInput, msg: "string storage type on {:?}", valu),
    }
}

/// Handler for plain UTF-8 strings: equality, prefix, range and regex.
pub struct StorTypeUtf8;

impl StorTypeUtf8 {
    fn lift_regex(&self, ixby: &IndxBy, valu: &Valu) -> Result<Vec<Buid>> {
        let regx = err_at!(InvalidInput, regex::Regex::new(as_str(valu)?))?;

        // the index may be truncated, re-read the stored value and
        // filter on the full string.
        let mut buids = vec![];
        for buid in ixby.buids_by_pref(&[])? {
            match ixby.get_node_valu(&buid)? {
                Some(Valu::Str { v }) if regx.is_match(&v) => buids.push(buid),
                _ => (),
            }
        }
        Ok(buids)
    }
}

impl StorType for StorTypeUtf8 {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![utf8_indx(as_str(valu)?)])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&utf8_indx(as_str(valu)?)),
            "^=" => ixby.buids_by_pref(&utf8_indx(as_str(valu)?)),
            "range=" => {
                let items = match valu.as_list() {
                    Some(items) if items.len() == 2 => items,
                    _ => err_at!(InvalidInput, msg: "range= wants a (min, max) pair")?,
                };
                let lo = utf8_indx(as_str(&items[0])?);
                let hi = utf8_indx(as_str(&items[1])?);
                ixby.buids_by_range(&lo, &hi)
            }
            "~=" => self.lift_regex(ixby, valu),
            _ => err_at!(NoSuchCmpr, msg: "utf8 storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for hierarchical names (locations, tags). A trailing
/// separator is appended before encoding so that `^=foo.bar` stays
/// boundary aware: `foo.bar.baz` matches, `foo.barbaz` does not.
pub struct StorTypeHier {
    sepr: char,
}

impl StorTypeHier {
    pub fn new(sepr: char) -> StorTypeHier {
        StorTypeHier { sepr }
    }

    fn hier_indx(&self, valu: &str) -> Vec<u8> {
        let mut name = valu.to_string();
        name.push(self.sepr);
        name.into_bytes()
    }
}

impl StorType for StorTypeHier {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![self.hier_indx(as_str(valu)?)])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&self.hier_indx(as_str(valu)?)),
            "^=" => ixby.buids_by_pref(&self.hier_indx(as_str(valu)?)),
            _ => err_at!(NoSuchCmpr, msg: "hierarchical storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for fully-qualified domain names. The string is indexed
/// reversed so that `*.example.com` becomes an ordinary prefix lift.
pub struct StorTypeFqdn {
    inner: StorTypeUtf8,
}

impl StorTypeFqdn {
    pub fn new() -> StorTypeFqdn {
        StorTypeFqdn {
            inner: StorTypeUtf8,
        }
    }

    fn rev(valu: &str) -> String {
        valu.chars().rev().collect()
    }
}

impl Default for StorTypeFqdn {
    fn default() -> Self {
        StorTypeFqdn::new()
    }
}

impl StorType for StorTypeFqdn {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![utf8_indx(&Self::rev(as_str(valu)?))])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => {
                let fqdn = as_str(valu)?;
                match fqdn.strip_prefix('*') {
                    Some(rest) => {
                        let indx = utf8_indx(&Self::rev(rest));
                        ixby.buids_by_pref(&indx)
                    }
                    None => {
                        self.inner.lift(ixby, "=", &Valu::str(&Self::rev(fqdn)))
                    }
                }
            }
            _ => err_at!(NoSuchCmpr, msg: "fqdn storage type has no {:?}", cmpr),
        }
    }
}
