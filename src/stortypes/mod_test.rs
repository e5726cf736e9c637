use super::*;
use crate::types::{
    STOR_TYPE_FQDN, STOR_TYPE_GUID, STOR_TYPE_I128, STOR_TYPE_I16, STOR_TYPE_I32,
    STOR_TYPE_I64, STOR_TYPE_I8, STOR_TYPE_IPV6, STOR_TYPE_IVAL, STOR_TYPE_LATLONG,
    STOR_TYPE_LOC, STOR_TYPE_MSGP, STOR_TYPE_TAG, STOR_TYPE_TIME, STOR_TYPE_U128,
    STOR_TYPE_U64, STOR_TYPE_U8, STOR_TYPE_UTF8,
};

fn one_indx(stortype: u16, valu: &Valu) -> Vec<u8> {
    let mut keys = stor_indx(stortype, valu).unwrap();
    assert_eq!(keys.len(), 1);
    keys.remove(0)
}

#[test]
fn test_int_boundaries() {
    // signed extremes encode to all-zero and all-one byte patterns.
    assert_eq!(one_indx(STOR_TYPE_I8, &Valu::int(-128)), vec![0x00]);
    assert_eq!(one_indx(STOR_TYPE_I8, &Valu::int(127)), vec![0xff]);
    assert_eq!(one_indx(STOR_TYPE_I16, &Valu::int(i16::MIN as i64)), vec![0x00; 2]);
    assert_eq!(one_indx(STOR_TYPE_I16, &Valu::int(i16::MAX as i64)), vec![0xff; 2]);
    assert_eq!(one_indx(STOR_TYPE_I32, &Valu::int(i32::MIN as i64)), vec![0x00; 4]);
    assert_eq!(one_indx(STOR_TYPE_I32, &Valu::int(i32::MAX as i64)), vec![0xff; 4]);
    assert_eq!(one_indx(STOR_TYPE_I64, &Valu::int(i64::MIN)), vec![0x00; 8]);
    assert_eq!(one_indx(STOR_TYPE_I64, &Valu::int(i64::MAX)), vec![0xff; 8]);

    assert_eq!(one_indx(STOR_TYPE_U8, &Valu::int(0)), vec![0x00]);
    assert_eq!(one_indx(STOR_TYPE_U8, &Valu::int(255)), vec![0xff]);
    assert_eq!(one_indx(STOR_TYPE_U64, &Valu::int(0)), vec![0x00; 8]);

    // the 128-bit carrier, two's complement for the signed type.
    assert_eq!(
        one_indx(STOR_TYPE_I128, &Valu::huge(1_u128 << 127)),
        vec![0x00; 16]
    );
    assert_eq!(
        one_indx(STOR_TYPE_I128, &Valu::huge(i128::MAX as u128)),
        vec![0xff; 16]
    );

    // the unsigned 16-byte width spans the full carrier.
    assert_eq!(one_indx(STOR_TYPE_U128, &Valu::huge(0)), vec![0x00; 16]);
    assert_eq!(one_indx(STOR_TYPE_U128, &Valu::huge(u128::MAX)), vec![0xff; 16]);

    // out-of-domain values refuse to encode.
    assert!(stor_indx(STOR_TYPE_I8, &Valu::int(128)).is_err());
    assert!(stor_indx(STOR_TYPE_I8, &Valu::int(-129)).is_err());
    assert!(stor_indx(STOR_TYPE_U8, &Valu::int(-1)).is_err());
    assert!(stor_indx(STOR_TYPE_U8, &Valu::int(256)).is_err());
}

#[test]
fn test_int_ordering() {
    // byte order equals numeric order across the sign boundary.
    let vals = [-300, -1, 0, 1, 2, 255, 300, 70_000];
    let mut keys: Vec<Vec<u8>> = vals
        .iter()
        .map(|v| one_indx(STOR_TYPE_I64, &Valu::int(*v)))
        .collect();
    let sorted = keys.clone();
    keys.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_utf8_truncation() {
    // up to 256 bytes stored verbatim.
    let s256 = "x".repeat(256);
    let indx = one_indx(STOR_TYPE_UTF8, &Valu::str(&s256));
    assert_eq!(indx, s256.as_bytes());

    // 257 bytes triggers truncate-and-hash down to 248 + 8 bytes.
    let s257 = "x".repeat(257);
    let indx = one_indx(STOR_TYPE_UTF8, &Valu::str(&s257));
    assert_eq!(indx.len(), 256);
    assert_eq!(&indx[..248], &s257.as_bytes()[..248]);

    // distinct strings sharing a 248-byte prefix hash to distinct
    // suffixes.
    let mut s1 = "a".repeat(248);
    let mut s2 = s1.clone();
    s1.push_str("bbbbbbbbb");
    s2.push_str("ccccccccc");
    let i1 = one_indx(STOR_TYPE_UTF8, &Valu::str(&s1));
    let i2 = one_indx(STOR_TYPE_UTF8, &Valu::str(&s2));
    assert_eq!(&i1[..248], &i2[..248]);
    assert_ne!(&i1[248..], &i2[248..]);
}

#[test]
fn test_hier_indx() {
    // trailing separator keeps prefix lifts boundary aware.
    assert_eq!(one_indx(STOR_TYPE_TAG, &Valu::str("foo.bar")), b"foo.bar.");
    assert_eq!(one_indx(STOR_TYPE_LOC, &Valu::str("us.ca")), b"us.ca.");

    let parent = one_indx(STOR_TYPE_TAG, &Valu::str("foo.bar"));
    let child = one_indx(STOR_TYPE_TAG, &Valu::str("foo.bar.baz"));
    let sibling = one_indx(STOR_TYPE_TAG, &Valu::str("foo.barbaz"));
    assert!(child.starts_with(&parent));
    assert!(!sibling.starts_with(&parent));
}

#[test]
fn test_fqdn_indx() {
    assert_eq!(one_indx(STOR_TYPE_FQDN, &Valu::str("example.com")), b"moc.elpmaxe");
}

#[test]
fn test_guid_indx() {
    let indx = one_indx(
        STOR_TYPE_GUID,
        &Valu::str("000102030405060708090a0b0c0d0e0f"),
    );
    assert_eq!(
        indx,
        vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
    );
    assert!(stor_indx(STOR_TYPE_GUID, &Valu::str("not-a-guid")).is_err());
}

#[test]
fn test_time_ival_indx() {
    let t100 = one_indx(STOR_TYPE_TIME, &Valu::int(100));
    let t200 = one_indx(STOR_TYPE_TIME, &Valu::int(200));
    assert_eq!(t100.len(), 8);
    assert!(t100 < t200);

    // interval index is the two timestamp encodings end to end.
    let ival = one_indx(STOR_TYPE_IVAL, &Valu::ival(100, 200));
    assert_eq!(ival.len(), 16);
    assert_eq!(&ival[..8], t100.as_slice());
    assert_eq!(&ival[8..], t200.as_slice());
}

#[test]
fn test_msgp_indx() {
    let i1 = one_indx(STOR_TYPE_MSGP, &Valu::list(vec![Valu::int(1), Valu::str("x")]));
    let i2 = one_indx(STOR_TYPE_MSGP, &Valu::list(vec![Valu::int(1), Valu::str("x")]));
    let i3 = one_indx(STOR_TYPE_MSGP, &Valu::list(vec![Valu::int(2), Valu::str("x")]));
    assert_eq!(i1.len(), 32);
    assert_eq!(i1, i2);
    assert_ne!(i1, i3);
}

#[test]
fn test_latlong_indx() {
    let indx = one_indx(STOR_TYPE_LATLONG, &Valu::latlong(0.0, 0.0));
    assert_eq!(indx.len(), 10);

    // longitude leads, so points sort west to east.
    let west = one_indx(STOR_TYPE_LATLONG, &Valu::latlong(0.0, -10.0));
    let east = one_indx(STOR_TYPE_LATLONG, &Valu::latlong(0.0, 10.0));
    assert!(west < east);

    assert!(stor_indx(STOR_TYPE_LATLONG, &Valu::latlong(91.0, 0.0)).is_err());
    assert!(stor_indx(STOR_TYPE_LATLONG, &Valu::latlong(0.0, 181.0)).is_err());
    assert!(stor_indx(STOR_TYPE_LATLONG, &Valu::latlong(f64::NAN, 0.0)).is_err());
}

#[test]
fn test_ipv6_indx() {
    let indx = one_indx(STOR_TYPE_IPV6, &Valu::str("::1"));
    let mut want = vec![0_u8; 16];
    want[15] = 1;
    assert_eq!(indx, want);
    assert!(stor_indx(STOR_TYPE_IPV6, &Valu::str("not-an-addr")).is_err());
}

#[test]
fn test_array_indx() {
    let stortype = STOR_TYPE_UTF8 | STOR_FLAG_ARRAY;
    let valu = Valu::list(vec![Valu::str("x"), Valu::str("y")]);

    // one realtype key per element.
    let keys = stor_indx(stortype, &valu).unwrap();
    assert_eq!(keys, vec![b"x".to_vec(), b"y".to_vec()]);

    // array flag on a scalar value refuses.
    assert!(stor_indx(stortype, &Valu::str("scalar")).is_err());
}

#[test]
fn test_dispatch() {
    assert!(get(0).is_err());
    assert!(get(21).is_err());
    for code in 1..=20 {
        get(code).unwrap();
    }
    // array-flagged codes resolve to the real type's handler.
    get(STOR_TYPE_UTF8 | STOR_FLAG_ARRAY).unwrap();
}
