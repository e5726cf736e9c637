use super::*;
use crate::util::{from_cbor_bytes, into_cbor_bytes};

#[test]
fn test_buid() {
    let b1 = Buid::from_ndef("inet:fqdn", &Valu::str("example.com")).unwrap();
    let b2 = Buid::from_ndef("inet:fqdn", &Valu::str("example.com")).unwrap();
    let b3 = Buid::from_ndef("inet:fqdn", &Valu::str("example.org")).unwrap();
    let b4 = Buid::from_ndef("inet:ipv4", &Valu::str("example.com")).unwrap();

    assert_eq!(b1, b2);
    assert_ne!(b1, b3);
    assert_ne!(b1, b4);
    assert_eq!(b1.as_bytes().len(), 32);

    let b5 = Buid::from_slice(&[0xab; 40]);
    assert_eq!(b5.as_bytes(), &[0xab; 32][..]);
    let b6 = Buid::from_slice(&[0xab; 4]);
    assert_eq!(&b6.as_bytes()[..4], &[0xab; 4][..]);
    assert_eq!(&b6.as_bytes()[4..], &[0x00; 28][..]);

    let data = into_cbor_bytes(b1).unwrap();
    let (b7, _) = from_cbor_bytes::<Buid>(&data).unwrap();
    assert_eq!(b1, b7);
}

#[test]
fn test_valu_cbor() {
    let valus = vec![
        Valu::Nil,
        Valu::Bool { v: true },
        Valu::int(-42),
        Valu::huge(u128::MAX),
        Valu::float(3.25),
        Valu::str("foo"),
        Valu::bytes(vec![1, 2, 3]),
        Valu::list(vec![Valu::int(1), Valu::str("x")]),
        Valu::ival(100, 200),
        Valu::latlong(12.5, -77.25),
    ];

    for valu in valus {
        let data = into_cbor_bytes(valu.clone()).unwrap();
        let (back, _) = from_cbor_bytes::<Valu>(&data).unwrap();
        assert_eq!(valu, back);
    }
}

#[test]
fn test_valu_accessors() {
    assert_eq!(Valu::int(7).as_int(), Some(7));
    assert_eq!(Valu::str("x").as_str(), Some("x"));
    assert_eq!(Valu::float(1.5).as_float(), Some(1.5));
    assert_eq!(Valu::int(7).as_str(), None);
    assert!(Valu::Nil.is_nil());
    assert!(!Valu::int(0).is_nil());

    let huge = Valu::huge(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
    match huge {
        Valu::Huge { hi, lo } => {
            assert_eq!(hi, 0x0102_0304_0506_0708);
            assert_eq!(lo, 0x090a_0b0c_0d0e_0f10);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_edit_cbor() {
    let edits = vec![
        Edit::NodeAdd {
            valu: Valu::str("foo"),
            stortype: STOR_TYPE_UTF8,
        },
        Edit::PropSet {
            prop: ".created".to_string(),
            valu: Valu::int(1_600_000_000_000),
            oldv: Valu::Nil,
            stortype: STOR_TYPE_TIME,
        },
        Edit::TagDel {
            tag: "foo.bar".to_string(),
            oldv: Valu::ival(1, 2),
        },
    ];
    let ne = NodeEdit::new(Buid::hash(b"x"), "inet:fqdn", edits);

    let entry = LogEntry {
        changes: vec![ne.clone()],
        meta: EditMeta {
            user: "root".to_string(),
            time: 12345,
            prov: String::new(),
        },
    };

    let data = into_cbor_bytes(entry.clone()).unwrap();
    let (back, _) = from_cbor_bytes::<LogEntry>(&data).unwrap();
    assert_eq!(entry, back);
    assert_eq!(back.changes[0], ne);
}

#[test]
fn test_model_vers() {
    let vers = ModelVers::default();
    assert_eq!((vers.major, vers.minor, vers.patch), (-1, -1, -1));

    let vers = ModelVers {
        major: 0,
        minor: 2,
        patch: 1,
    };
    let data = into_cbor_bytes(vers.clone()).unwrap();
    let (back, _) = from_cbor_bytes::<ModelVers>(&data).unwrap();
    assert_eq!(vers, back);
}
