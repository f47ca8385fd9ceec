//! On-disk layout of built archives, checked against the raw bytes.

mod common;

use std::fs;

use car::archive::{self, EntryType, Header, TocRecord, HEADER_SIZE, TOC_RECORD_SIZE};
use common::{craft, sample_tree, write_archive, HELLO};

fn build_bytes(root: &std::path::Path) -> (tempfile::TempDir, Vec<u8>) {
    let work = tempfile::tempdir().unwrap();
    let pak = work.path().join("a.car");
    archive::build(root, &pak).unwrap();
    let bytes = fs::read(&pak).unwrap();
    (work, bytes)
}

fn name_at(bytes: &[u8], header: &Header, rec: &TocRecord) -> String {
    let start = header.string_offset as usize + rec.name_offset as usize;
    let end = start + bytes[start..].iter().position(|&b| b == 0).unwrap();
    assert!(end < header.data_offset as usize, "name runs into the data blob");
    String::from_utf8(bytes[start..end].to_vec()).unwrap()
}

#[test]
fn empty_directory_is_a_single_root_entry() {
    let root = tempfile::tempdir().unwrap();
    let (_work, bytes) = build_bytes(root.path());
    let header = Header::from_bytes(&bytes).unwrap();

    assert_eq!(header.string_offset, 56);
    assert_eq!(header.data_offset, 58);
    assert_eq!(bytes.len(), 58);
    assert_eq!(&bytes[56..58], b"/\0");

    let rec = TocRecord::read_at(&bytes, HEADER_SIZE).unwrap();
    assert_eq!(rec.kind, EntryType::Directory);
    assert_eq!(rec.name_offset, 0);
    assert_eq!(rec.size, 0);
}

#[test]
fn single_file_layout() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("a"), b"12345").unwrap();
    let (_work, bytes) = build_bytes(root.path());
    let header = Header::from_bytes(&bytes).unwrap();

    // Two records, "/\0/a\0", five payload bytes.
    assert_eq!(header.string_offset, 80);
    assert_eq!(header.data_offset, 85);
    assert_eq!(bytes.len(), 90);
    assert_eq!(&bytes[85..], b"12345");
}

#[test]
fn regions_are_contiguous_and_records_in_bounds() {
    let tree = sample_tree();
    let (_work, bytes) = build_bytes(tree.path());
    let header = Header::from_bytes(&bytes).unwrap();
    let count = header.entry_count().unwrap();
    assert_eq!(count, 4);
    assert_eq!(
        u64::from(header.string_offset),
        HEADER_SIZE + count * TOC_RECORD_SIZE
    );

    let mut names_len = 0u64;
    let mut data_len = 0u64;
    let mut next_name = 0u32;
    let mut next_data = 0u64;
    for i in 0..count {
        let rec = TocRecord::read_at(&bytes, HEADER_SIZE + i * TOC_RECORD_SIZE).unwrap();
        let name = name_at(&bytes, &header, &rec);

        // Names and payloads are packed in TOC order.
        assert_eq!(rec.name_offset, next_name);
        assert_eq!(rec.data_offset, next_data);
        next_name += name.len() as u32 + 1;
        next_data += rec.size;
        names_len += name.len() as u64 + 1;
        data_len += rec.size;

        let start = (header.data_offset + rec.data_offset) as usize;
        let payload = &bytes[start..start + rec.size as usize];
        match rec.kind {
            EntryType::Regular => assert_eq!(payload, HELLO),
            EntryType::Symlink => assert_eq!(payload, b"file.txt\0"),
            EntryType::Directory => assert!(payload.is_empty()),
        }
    }

    assert_eq!(header.data_offset, u64::from(header.string_offset) + names_len);
    assert_eq!(bytes.len() as u64, header.data_offset + data_len);
}

#[test]
fn zero_entry_archive_is_valid() {
    let work = tempfile::tempdir().unwrap();
    let bytes = craft(&[]);
    assert_eq!(bytes.len(), 32);
    let pak = write_archive(work.path(), &bytes);

    assert!(archive::validate(&pak));
    assert!(archive::list(&pak).unwrap().is_empty());
    assert_eq!(archive::info(&pak).unwrap().entry_count, 0);
}

#[test]
fn duplicate_names_are_listed_in_order() {
    let work = tempfile::tempdir().unwrap();
    let bytes = craft(&[
        ("/", EntryType::Directory, b""),
        ("/a", EntryType::Regular, b"first"),
        ("/a", EntryType::Regular, b"second"),
    ]);
    let pak = write_archive(work.path(), &bytes);

    assert!(archive::validate(&pak));
    assert_eq!(archive::list(&pak).unwrap(), ["/", "/a", "/a"]);
}
