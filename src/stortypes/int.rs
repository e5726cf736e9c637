//! Storage types for fixed-width integers and timestamps.

use crate::{
    stortypes::{IndxBy, StorType},
    types::{Buid, Valu},
    Error, Result,
};

/// Handler for the integer storage types, widths 1/2/4/8/16 bytes,
/// signed or unsigned.
///
/// Index bytes are the big-endian value after adding the sign bias
/// `2^(8W-1)`, so byte order equals numeric order: the signed minimum
/// of a width encodes to all-zero bytes and the maximum to all-one
/// bytes. Comparators do their arithmetic on the biased value, which
/// keeps the full unsigned 16-byte domain reachable.
pub struct StorTypeInt {
    size: usize,
    signed: bool,
}

impl StorTypeInt {
    pub fn new(size: usize, signed: bool) -> StorTypeInt {
        StorTypeInt { size, signed }
    }

    fn zerobyts(&self) -> Vec<u8> {
        vec![0x00; self.size]
    }

    fn fullbyts(&self) -> Vec<u8> {
        vec![0xff; self.size]
    }

    // largest biased value for this width.
    fn max_biased(&self) -> u128 {
        if self.size == 16 {
            u128::MAX
        } else {
            (1_u128 << (self.size * 8)) - 1
        }
    }

    // map `valu` to its order-preserving biased form, validating the
    // width's domain.
    fn to_biased(&self, valu: &Valu) -> Result<u128> {
        if self.signed {
            let v: i128 = match valu {
                Valu::Int { v } => *v as i128,
                // the 128-bit carrier holds two's complement.
                Valu::Huge { hi, lo } => (((*hi as u128) << 64) | (*lo as u128)) as i128,
                _ => err_at!(InvalidInput, msg: "integer storage type on {:?}", valu)?,
            };
            if self.size < 16 {
                let lim = 1_i128 << (self.size * 8 - 1);
                if v < -lim || v >= lim {
                    err_at!(InvalidInput, msg: "{} outside {}-byte domain", v, self.size)?;
                }
            }
            let bias: u128 = 1_u128 << (self.size * 8 - 1);
            Ok((v as u128).wrapping_add(bias) & self.max_biased())
        } else {
            let v: u128 = match valu {
                Valu::Int { v } if *v >= 0 => *v as u128,
                Valu::Int { v } => {
                    err_at!(InvalidInput, msg: "{} on unsigned storage type", v)?
                }
                Valu::Huge { hi, lo } => ((*hi as u128) << 64) | (*lo as u128),
                _ => err_at!(InvalidInput, msg: "integer storage type on {:?}", valu)?,
            };
            if v > self.max_biased() {
                err_at!(InvalidInput, msg: "{} outside {}-byte domain", v, self.size)?;
            }
            Ok(v)
        }
    }

    fn enc_biased(&self, biased: u128) -> Vec<u8> {
        biased.to_be_bytes()[16 - self.size..].to_vec()
    }

    /// Encode one value into its biased big-endian bytes.
    pub fn enc(&self, valu: &Valu) -> Result<Vec<u8>> {
        Ok(self.enc_biased(self.to_biased(valu)?))
    }

    fn range_bounds(&self, valu: &Valu) -> Result<(u128, u128)> {
        let items = match valu.as_list() {
            Some(items) if items.len() == 2 => items,
            _ => err_at!(InvalidInput, msg: "range= wants a (min, max) pair")?,
        };
        Ok((self.to_biased(&items[0])?, self.to_biased(&items[1])?))
    }
}

impl StorType for StorTypeInt {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![self.enc(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&self.enc(valu)?),
            ">=" => {
                let biased = self.to_biased(valu)?;
                ixby.buids_by_range(&self.enc_biased(biased), &self.fullbyts())
            }
            "<=" => {
                let biased = self.to_biased(valu)?;
                ixby.buids_by_range(&self.zerobyts(), &self.enc_biased(biased))
            }
            ">" => {
                let biased = self.to_biased(valu)?;
                if biased == self.max_biased() {
                    Ok(vec![])
                } else {
                    ixby.buids_by_range(&self.enc_biased(biased + 1), &self.fullbyts())
                }
            }
            "<" => {
                let biased = self.to_biased(valu)?;
                if biased == 0 {
                    Ok(vec![])
                } else {
                    ixby.buids_by_range(&self.zerobyts(), &self.enc_biased(biased - 1))
                }
            }
            "range=" => {
                let (lo, hi) = self.range_bounds(valu)?;
                ixby.buids_by_range(&self.enc_biased(lo), &self.enc_biased(hi))
            }
            _ => err_at!(NoSuchCmpr, msg: "integer storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for timestamps: signed 64-bit milliseconds, plus interval
/// containment.
pub struct StorTypeTime {
    inner: StorTypeInt,
}

impl StorTypeTime {
    pub fn new() -> StorTypeTime {
        StorTypeTime {
            inner: StorTypeInt::new(8, true),
        }
    }

    /// Encode one timestamp, used by the interval storage type too.
    pub fn enc(&self, valu: i64) -> Result<Vec<u8>> {
        self.inner.enc(&Valu::int(valu))
    }
}

impl Default for StorTypeTime {
    fn default() -> Self {
        StorTypeTime::new()
    }
}

impl StorType for StorTypeTime {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        self.inner.indx(valu)
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            // containment within the right-open interval [lo, hi).
            "@=" => {
                let items = match valu.as_list() {
                    Some(items) if items.len() == 2 => items,
                    _ => err_at!(InvalidInput, msg: "@= wants a (lo, hi) interval")?,
                };
                let (lo, hi) = match (items[0].as_int(), items[1].as_int()) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => err_at!(InvalidInput, msg: "@= bounds must be timestamps")?,
                };
                if hi <= lo {
                    return Ok(vec![]);
                }
                ixby.buids_by_range(&self.enc(lo)?, &self.enc(hi - 1)?)
            }
            cmpr => self.inner.lift(ixby, cmpr, valu),
        }
    }
}
