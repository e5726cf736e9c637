//! Storage types for guids, intervals, opaque blobs, geo points and
//! IPv6 addresses.

use crate::{
    gis,
    stortypes::{int::StorTypeTime, IndxBy, StorType},
    types::{Buid, Valu},
    util, Error, Result,
};

/// Handler for guid values: 32 hex digits (hyphenated accepted),
/// indexed as the 16 raw bytes. Equality only.
pub struct StorTypeGuid;

impl StorTypeGuid {
    fn guid_indx(valu: &Valu) -> Result<Vec<u8>> {
        let text = match valu.as_str() {
            Some(text) => text,
            None => err_at!(InvalidInput, msg: "guid storage type on {:?}", valu)?,
        };
        let guid = err_at!(InvalidInput, uuid::Uuid::parse_str(text), "guid {:?}", text)?;
        Ok(guid.as_bytes().to_vec())
    }
}

impl StorType for StorTypeGuid {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![Self::guid_indx(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&Self::guid_indx(valu)?),
            _ => err_at!(NoSuchCmpr, msg: "guid storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for time intervals `[lo, hi)`: the concatenation of the two
/// timestamp encodings. `=` matches the exact interval, `@=` matches
/// any overlap.
pub struct StorTypeIval {
    timetype: StorTypeTime,
}

impl StorTypeIval {
    pub fn new() -> StorTypeIval {
        StorTypeIval {
            timetype: StorTypeTime::new(),
        }
    }

    fn ival_bounds(valu: &Valu) -> Result<(i64, i64)> {
        let items = match valu.as_list() {
            Some(items) if items.len() == 2 => items,
            _ => err_at!(InvalidInput, msg: "interval wants a (lo, hi) pair")?,
        };
        match (items[0].as_int(), items[1].as_int()) {
            (Some(lo), Some(hi)) => Ok((lo, hi)),
            _ => err_at!(InvalidInput, msg: "interval bounds must be timestamps"),
        }
    }

    fn ival_indx(&self, valu: &Valu) -> Result<Vec<u8>> {
        let (lo, hi) = Self::ival_bounds(valu)?;
        let mut indx = self.timetype.enc(lo)?;
        indx.extend_from_slice(&self.timetype.enc(hi)?);
        Ok(indx)
    }
}

impl Default for StorTypeIval {
    fn default() -> Self {
        StorTypeIval::new()
    }
}

impl StorType for StorTypeIval {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![self.ival_indx(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&self.ival_indx(valu)?),
            "@=" => {
                let (lo, hi) = Self::ival_bounds(valu)?;
                let minindx = self.timetype.enc(lo)?;
                let maxindx = self.timetype.enc(hi)?;

                let mut buids = vec![];
                for (lkey, buid) in ixby.scan_by_pref(&[])? {
                    if lkey.len() < 16 {
                        continue;
                    }
                    let tick = &lkey[lkey.len() - 16..lkey.len() - 8];
                    let tock = &lkey[lkey.len() - 8..];

                    // right-open on both sides, reject non-overlap.
                    if tick >= maxindx.as_slice() {
                        continue;
                    }
                    if tock <= minindx.as_slice() {
                        continue;
                    }
                    buids.push(buid);
                }
                Ok(buids)
            }
            _ => err_at!(NoSuchCmpr, msg: "interval storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for opaque values: indexed by the 32-byte content hash of
/// the serialized value. Equality only. Whole-array index rows use
/// this type as well.
pub struct StorTypeMsgp;

impl StorTypeMsgp {
    fn msgp_indx(valu: &Valu) -> Result<Vec<u8>> {
        let data = util::into_cbor_bytes(valu.clone())?;
        Ok(Buid::hash(&data).as_bytes().to_vec())
    }
}

impl StorType for StorTypeMsgp {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![Self::msgp_indx(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&Self::msgp_indx(valu)?),
            _ => err_at!(NoSuchCmpr, msg: "opaque storage type has no {:?}", cmpr),
        }
    }
}

const GEO_SCALE: f64 = 100_000_000.0;
const LAT_SPACE: f64 = 90.0 * GEO_SCALE;
const LON_SPACE: f64 = 180.0 * GEO_SCALE;

/// Handler for geo points. Coordinates are scaled to 10^-8 degree
/// units, biased non-negative and emitted as `lon_5bytes ‖ lat_5bytes`,
/// longitude first so `near=` can range-scan one axis.
pub struct StorTypeLatLong;

impl StorTypeLatLong {
    pub fn new() -> StorTypeLatLong {
        StorTypeLatLong
    }

    fn as_num(valu: &Valu) -> Result<f64> {
        match valu {
            Valu::Float { v } => Ok(*v),
            Valu::Int { v } => Ok(*v as f64),
            _ => err_at!(InvalidInput, msg: "number wanted, got {:?}", valu),
        }
    }

    fn check_num(valu: f64) -> Result<f64> {
        if valu.is_nan() {
            err_at!(NotANumber, msg: "NaN in geo comparison")
        } else {
            Ok(valu)
        }
    }

    fn latlong(valu: &Valu) -> Result<(f64, f64)> {
        let items = match valu.as_list() {
            Some(items) if items.len() == 2 => items,
            _ => err_at!(InvalidInput, msg: "geo point wants a (lat, lon) pair")?,
        };
        let lat = Self::check_num(Self::as_num(&items[0])?)?;
        let lon = Self::check_num(Self::as_num(&items[1])?)?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            err_at!(InvalidInput, msg: "geo point ({}, {}) out of range", lat, lon)?;
        }
        Ok((lat, lon))
    }

    fn lat_byts(lat: f64) -> [u8; 5] {
        Self::five_byts((lat * GEO_SCALE + LAT_SPACE) as u64)
    }

    fn lon_byts(lon: f64) -> [u8; 5] {
        Self::five_byts((lon * GEO_SCALE + LON_SPACE) as u64)
    }

    fn five_byts(valu: u64) -> [u8; 5] {
        let byts = valu.to_be_bytes();
        [byts[3], byts[4], byts[5], byts[6], byts[7]]
    }

    fn unscale(byts: &[u8], space: f64) -> f64 {
        let mut wide = [0_u8; 8];
        wide[3..].copy_from_slice(byts);
        (u64::from_be_bytes(wide) as f64 - space) / GEO_SCALE
    }

    fn latlong_indx(valu: &Valu) -> Result<Vec<u8>> {
        let (lat, lon) = Self::latlong(valu)?;
        let mut indx = Self::lon_byts(lon).to_vec();
        indx.extend_from_slice(&Self::lat_byts(lat));
        Ok(indx)
    }
}

impl Default for StorTypeLatLong {
    fn default() -> Self {
        StorTypeLatLong::new()
    }
}

impl StorType for StorTypeLatLong {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![Self::latlong_indx(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&Self::latlong_indx(valu)?),
            "near=" => {
                let items = match valu.as_list() {
                    Some(items) if items.len() == 2 => items,
                    _ => err_at!(InvalidInput, msg: "near= wants ((lat, lon), dist)")?,
                };
                let (lat, lon) = Self::latlong(&items[0])?;
                let dist = Self::check_num(Self::as_num(&items[1])?)?;

                let (latmin, latmax, lonmin, lonmax) = gis::bbox(lat, lon, dist);

                let latminb = Self::lat_byts(latmin);
                let latmaxb = Self::lat_byts(latmax);

                // scan by the lon axis, down-select the rest.
                let mut buids = vec![];
                let lo = Self::lon_byts(lonmin);
                let hi = Self::lon_byts(lonmax);
                for (lkey, buid) in ixby.scan_by_range(&lo, &hi)? {
                    if lkey.len() < 10 {
                        continue;
                    }
                    let latb = &lkey[lkey.len() - 5..];
                    if latb > latmaxb.as_ref() || latb < latminb.as_ref() {
                        continue;
                    }
                    let lonb = &lkey[lkey.len() - 10..lkey.len() - 5];

                    let latv = Self::unscale(latb, LAT_SPACE);
                    let lonv = Self::unscale(lonb, LON_SPACE);
                    if gis::haversine((lat, lon), (latv, lonv)) <= dist {
                        buids.push(buid);
                    }
                }
                Ok(buids)
            }
            _ => err_at!(NoSuchCmpr, msg: "geo storage type has no {:?}", cmpr),
        }
    }
}

/// Handler for IPv6 addresses, indexed as the 16-byte packed form.
pub struct StorTypeIpv6;

impl StorTypeIpv6 {
    fn ipv6_indx(valu: &Valu) -> Result<Vec<u8>> {
        let text = match valu.as_str() {
            Some(text) => text,
            None => err_at!(InvalidInput, msg: "ipv6 storage type on {:?}", valu)?,
        };
        let addr: std::net::Ipv6Addr =
            err_at!(InvalidInput, text.parse(), "ipv6 {:?}", text)?;
        Ok(addr.octets().to_vec())
    }
}

impl StorType for StorTypeIpv6 {
    fn indx(&self, valu: &Valu) -> Result<Vec<Vec<u8>>> {
        Ok(vec![Self::ipv6_indx(valu)?])
    }

    fn lift(&self, ixby: &IndxBy, cmpr: &str, valu: &Valu) -> Result<Vec<Buid>> {
        match cmpr {
            "=" => ixby.buids_by_dups(&Self::ipv6_indx(valu)?),
            "range=" => {
                let items = match valu.as_list() {
                    Some(items) if items.len() == 2 => items,
                    _ => err_at!(InvalidInput, msg: "range= wants a (min, max) pair")?,
                };
                let lo = Self::ipv6_indx(&items[0])?;
                let hi = Self::ipv6_indx(&items[1])?;
                ixby.buids_by_range(&lo, &hi)
            }
            _ => err_at!(NoSuchCmpr, msg: "ipv6 storage type has no {:?}", cmpr),
        }
    }
}
