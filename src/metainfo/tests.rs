use std::path::PathBuf;

use super::*;
use crate::bencode::{encode, Value};
use crate::testutil::{payload, piece_hashes, torrent_bytes, two_file_torrent, ANNOUNCE};
use bytes::Bytes;

fn info_dict(pieces: usize) -> Value {
    Value::dict([
        ("name", Value::string("file.bin")),
        ("piece length", Value::Integer(16384)),
        ("pieces", Value::Bytes(Bytes::from(vec![0u8; 20 * pieces]))),
        ("length", Value::Integer(16384 * pieces as i64)),
    ])
}

fn root_with(info: Value) -> Value {
    Value::dict([("announce", Value::string(ANNOUNCE)), ("info", info)])
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hex = "0123456789abcdef0123456789abcdef01234567";
    let hash = InfoHash::from_hex(hex).unwrap();
    assert_eq!(hash.to_hex(), hex);
    assert_eq!(hash.to_string(), hex);
    assert!(InfoHash::from_hex("abc").is_none());
    assert!(InfoHash::from_bytes(&[0u8; 19]).is_none());
}

#[test]
fn test_single_file_torrent() {
    let data = payload(40000);
    let bytes = torrent_bytes("movie.bin", &[("movie.bin", 40000)], 16384, &data);
    let meta = Metainfo::from_bytes(&bytes).unwrap();

    assert_eq!(meta.announce, ANNOUNCE);
    assert_eq!(meta.info.name, "movie.bin");
    assert_eq!(meta.info.piece_count(), 3);
    assert_eq!(meta.info.total_length, 40000);
    assert_eq!(meta.info.files.len(), 1);

    let file = &meta.info.files[0];
    assert_eq!(file.path, PathBuf::from("movie.bin"));
    assert_eq!((file.offset, file.first_piece, file.last_piece), (0, 0, 2));
    assert!(file.selected);
}

#[test]
fn test_multi_file_offsets_and_piece_ranges() {
    let (meta, _) = two_file_torrent();
    let files = &meta.info.files;

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, PathBuf::from("pair").join("a.bin"));
    assert_eq!(files[1].path, PathBuf::from("pair").join("sub").join("b.bin"));
    assert_eq!((files[0].offset, files[0].first_piece, files[0].last_piece), (0, 0, 0));
    assert_eq!((files[1].offset, files[1].first_piece, files[1].last_piece), (12288, 0, 1));
    assert_eq!(meta.info.total_length, 20480);
}

#[test]
fn test_piece_sizes() {
    let (meta, _) = two_file_torrent();
    assert_eq!(meta.info.piece_size(0), 16384);
    assert_eq!(meta.info.piece_size(1), 4096);
    assert_eq!(meta.info.piece_size(2), 0);
    assert_eq!(meta.info.piece_range(1), (16384, 20480));
}

#[test]
fn test_info_hash_uses_canonical_encoding() {
    let info = info_dict(1);
    let expected = InfoHash::from_info_bytes(&encode(&info).unwrap());
    let meta = Metainfo::from_value(&root_with(info)).unwrap();
    assert_eq!(meta.info_hash, expected);

    // Same dictionary written with unsorted keys hashes identically.
    let mut raw = b"d8:announce".to_vec();
    raw.extend_from_slice(format!("{}:{}", ANNOUNCE.len(), ANNOUNCE).as_bytes());
    raw.extend_from_slice(b"4:infod6:lengthi16384e4:name8:file.bin6:pieces20:");
    raw.extend_from_slice(&[0u8; 20]);
    raw.extend_from_slice(b"12:piece lengthi16384eee");
    assert_eq!(Metainfo::from_bytes(&raw).unwrap().info_hash, expected);
}

#[test]
fn test_missing_required_fields() {
    let no_announce = Value::dict([("info", info_dict(1))]);
    assert!(matches!(
        Metainfo::from_value(&no_announce),
        Err(MetainfoError::MissingField("announce"))
    ));

    let no_info = Value::dict([("announce", Value::string(ANNOUNCE))]);
    assert!(matches!(
        Metainfo::from_value(&no_info),
        Err(MetainfoError::MissingField("info"))
    ));

    for field in ["name", "piece length", "pieces"] {
        let mut info = info_dict(1);
        if let Value::Dict(d) = &mut info {
            d.remove(field.as_bytes());
        }
        match Metainfo::from_value(&root_with(info)) {
            Err(MetainfoError::MissingField(name)) => assert_eq!(name, field),
            other => panic!("expected missing {field}, got {other:?}"),
        }
    }
}

#[test]
fn test_pieces_not_multiple_of_twenty() {
    let mut info = info_dict(1);
    if let Value::Dict(d) = &mut info {
        d.insert(Bytes::from_static(b"pieces"), Value::Bytes(Bytes::from(vec![0u8; 30])));
    }
    assert!(matches!(
        Metainfo::from_value(&root_with(info)),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_piece_count_must_cover_payload() {
    let mut info = info_dict(1);
    if let Value::Dict(d) = &mut info {
        d.insert(Bytes::from_static(b"length"), Value::Integer(16385));
    }
    assert!(matches!(
        Metainfo::from_value(&root_with(info)),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_overflowing_file_lengths_rejected() {
    let file = |name: &str| {
        Value::dict([
            ("length", Value::Integer(i64::MAX)),
            ("path", Value::List(vec![Value::string(name)])),
        ])
    };
    let info = Value::dict([
        ("name", Value::string("huge")),
        ("piece length", Value::Integer(16384)),
        ("pieces", Value::Bytes(Bytes::from(vec![0u8; 20]))),
        ("files", Value::List(vec![file("a"), file("b"), file("c")])),
    ]);

    assert!(matches!(
        Metainfo::from_value(&root_with(info)),
        Err(MetainfoError::InvalidField("length"))
    ));
}

#[test]
fn test_zero_piece_length_rejected() {
    let mut info = info_dict(1);
    if let Value::Dict(d) = &mut info {
        d.insert(Bytes::from_static(b"piece length"), Value::Integer(0));
    }
    assert!(matches!(
        Metainfo::from_value(&root_with(info)),
        Err(MetainfoError::InvalidField("piece length"))
    ));
}

#[test]
fn test_malformed_bencode() {
    assert!(matches!(
        Metainfo::from_bytes(b"d8:announce"),
        Err(MetainfoError::Bencode(_))
    ));
}

#[test]
fn test_trackers_deduplicated_in_order() {
    let root = Value::dict([
        ("announce", Value::string("udp://a/announce")),
        (
            "announce-list",
            Value::List(vec![
                Value::List(vec![Value::string("udp://a/announce"), Value::string("http://b")]),
                Value::List(vec![Value::string("http://c"), Value::string("http://b")]),
            ]),
        ),
        ("info", info_dict(1)),
    ]);
    let meta = Metainfo::from_value(&root).unwrap();
    assert_eq!(
        meta.trackers(),
        vec!["udp://a/announce", "http://b", "http://c"]
    );
}

#[test]
fn test_optional_fields() {
    let root = Value::dict([
        ("announce", Value::string(ANNOUNCE)),
        ("comment", Value::string("hello")),
        ("created by", Value::string("maker")),
        ("creation date", Value::Integer(1700000000)),
        ("info", info_dict(1)),
    ]);
    let meta = Metainfo::from_value(&root).unwrap();
    assert_eq!(meta.comment.as_deref(), Some("hello"));
    assert_eq!(meta.created_by.as_deref(), Some("maker"));
    assert_eq!(meta.creation_date, Some(1700000000));
    assert!(!meta.info.private);
}

#[test]
fn test_select_file_and_wanted_pieces() {
    let data = payload(48 * 1024);
    let bytes = torrent_bytes(
        "three",
        &[("a", 16 * 1024), ("b", 16 * 1024), ("c", 16 * 1024)],
        16 * 1024,
        &data,
    );
    let mut meta = Metainfo::from_bytes(&bytes).unwrap();

    meta.select_file(1, false).unwrap();
    assert!(meta.info.piece_is_wanted(0));
    assert!(!meta.info.piece_is_wanted(1));
    assert!(meta.info.piece_is_wanted(2));
    assert_eq!(meta.info.selected_length(), 32 * 1024);

    assert!(matches!(
        meta.select_file(3, true),
        Err(MetainfoError::InvalidFileIndex { index: 3, count: 3 })
    ));
}

#[test]
fn test_load_torrent_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.torrent");
    let data = payload(100);
    std::fs::write(&path, torrent_bytes("x", &[("x", 100)], 16384, &data)).unwrap();

    let meta = load_torrent(&path).unwrap();
    assert_eq!(meta.info.pieces[0].to_vec(), piece_hashes(&data, 16384));

    assert!(matches!(
        load_torrent(dir.path().join("missing.torrent")),
        Err(MetainfoError::Io(_))
    ));
}
