//! Shared helpers for the integration tests.
//!
//! Each integration test file compiles as its own crate and uses a subset of
//! these helpers.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use car::archive::{
    checksum, EntryType, Header, Layout, TocRecord, HEADER_CHECKED_LEN, HEADER_SIZE,
    TOC_RECORD_SIZE,
};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const HELLO: &[u8] = b"hello, world!";

/// What a path in a tree looks like, independent of traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(Vec<u8>),
    Dir,
    Link(PathBuf),
}

/// root/
///   file.txt  ("hello, world!", 13 bytes)
///   sub/      (empty)
///   link -> file.txt
pub fn sample_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file.txt"), HELLO).unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    symlink("file.txt", dir.path().join("link")).unwrap();
    dir
}

/// Maps every path under `root` (as a '/'-rooted relative name) to its node.
pub fn snapshot(root: &Path) -> BTreeMap<String, Node> {
    let mut out = BTreeMap::new();
    for ent in WalkDir::new(root).follow_links(false) {
        let ent = ent.unwrap();
        let rel = ent.path().strip_prefix(root).unwrap();
        let name = format!("/{}", rel.to_string_lossy());
        let name = if name == "/" { name } else { name.trim_end_matches('/').to_string() };
        let ft = ent.file_type();
        let node = if ft.is_dir() {
            Node::Dir
        } else if ft.is_symlink() {
            Node::Link(fs::read_link(ent.path()).unwrap())
        } else {
            Node::File(fs::read(ent.path()).unwrap())
        };
        out.insert(name, node);
    }
    out
}

/// Writes a well-formed archive for `entries` by hand, bypassing the
/// builder, so tests can produce archives enumeration never would
/// (duplicate names, zero entries).
pub fn craft(entries: &[(&str, EntryType, &[u8])]) -> Vec<u8> {
    let names_len: u64 = entries.iter().map(|(n, _, _)| n.len() as u64 + 1).sum();
    let data_len: u64 = entries.iter().map(|(_, _, p)| p.len() as u64).sum();
    let layout = Layout::compute(entries.len() as u64, names_len, data_len).unwrap();
    let mut buf = vec![0u8; layout.total_size as usize];

    let string_base = layout.string_offset as usize;
    let data_base = layout.data_offset as usize;
    let (mut str_cur, mut data_cur) = (0usize, 0usize);
    for (i, (name, kind, payload)) in entries.iter().enumerate() {
        let rec = TocRecord {
            name_offset: str_cur as u32,
            kind: *kind,
            data_offset: data_cur as u64,
            size: payload.len() as u64,
        };
        let at = (HEADER_SIZE + i as u64 * TOC_RECORD_SIZE) as usize;
        buf[at..at + TOC_RECORD_SIZE as usize].copy_from_slice(&rec.to_bytes());

        let s = string_base + str_cur;
        buf[s..s + name.len()].copy_from_slice(name.as_bytes());
        str_cur += name.len() + 1;

        let d = data_base + data_cur;
        buf[d..d + payload.len()].copy_from_slice(payload);
        data_cur += payload.len();
    }

    let header = Header::new(&layout);
    buf[..HEADER_SIZE as usize].copy_from_slice(&header.to_bytes());
    reseal(&mut buf);
    buf
}

/// Recomputes both checksums after a deliberate edit.
pub fn reseal(buf: &mut [u8]) {
    let mut header = Header::from_bytes(buf).unwrap();
    header.checksum = checksum(&buf[HEADER_SIZE as usize..]);
    header.header_checksum = checksum(&header.to_bytes()[..HEADER_CHECKED_LEN as usize]);
    buf[..HEADER_SIZE as usize].copy_from_slice(&header.to_bytes());
}

pub fn write_archive(dir: &Path, bytes: &[u8]) -> PathBuf {
    let path = dir.join("crafted.car");
    fs::write(&path, bytes).unwrap();
    path
}
