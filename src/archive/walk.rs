//! Filesystem entry enumeration feeding the builder.

#![forbid(unsafe_code)]

use std::fs;
use std::ops::Index;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::format::EntryType;
use crate::archive::report::{self, Op};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: EntryType,
    /// Payload size; symlinks reserve one extra byte for the stored terminator.
    pub size: u64,
}

/// Running totals over an entry sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileListTotals {
    /// Raw path bytes plus one terminator per entry.
    pub name_bytes: u64,
    pub data_bytes: u64,
    pub count: u64,
}

impl FileListTotals {
    fn add(&mut self, entry: &FileEntry) {
        self.name_bytes += entry.path.as_os_str().len() as u64 + 1;
        self.data_bytes += entry.size;
        self.count += 1;
    }
}

/// Append-only entry sequence, grown during the walk.
#[derive(Debug, Clone, Default)]
pub struct FileList {
    entries: Vec<FileEntry>,
    totals: FileListTotals,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates `root` in pre-order. Every directory (the root included)
    /// is recorded once, before its children.
    pub fn scan(root: &Path) -> ArchiveResult<Self> {
        let meta = fs::metadata(root).map_err(|e| ArchiveError::at(root, e))?;
        if !meta.is_dir() {
            return Err(ArchiveError::NotADirectory(root.to_path_buf()));
        }
        // The root needs read and search permission. Resolving "." inside
        // it fails without the latter.
        fs::read_dir(root).map_err(|e| ArchiveError::at(root, e))?;
        fs::metadata(root.join(".")).map_err(|e| ArchiveError::at(root, e))?;

        let mut list = FileList::new();
        for ent in WalkDir::new(root).follow_links(false) {
            let ent = ent?;
            let path = ent.path();
            report::emit(Op::Listed, &path.to_string_lossy());

            if ent.file_type().is_dir() {
                list.push(FileEntry {
                    path: path.to_path_buf(),
                    kind: EntryType::Directory,
                    size: 0,
                });
                continue;
            }

            let meta = fs::symlink_metadata(path).map_err(|e| ArchiveError::at(path, e))?;
            let ft = meta.file_type();
            if ft.is_file() {
                list.push(FileEntry {
                    path: path.to_path_buf(),
                    kind: EntryType::Regular,
                    size: meta.len(),
                });
            } else if ft.is_symlink() {
                let target = fs::read_link(path).map_err(|e| ArchiveError::at(path, e))?;
                list.push(FileEntry {
                    path: path.to_path_buf(),
                    kind: EntryType::Symlink,
                    size: target.as_os_str().as_bytes().len() as u64 + 1,
                });
            } else {
                warn!("item at '{}' is of unknown type, skipping", path.display());
            }
        }

        debug!(
            "enumerated {} entries ({} name bytes, {} data bytes) under {}",
            list.totals.count,
            list.totals.name_bytes,
            list.totals.data_bytes,
            root.display()
        );
        Ok(list)
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.totals.add(&entry);
        self.entries.push(entry);
    }

    pub fn totals(&self) -> FileListTotals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&FileEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&FileEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for FileList {
    type Item = FileEntry;
    type IntoIter = std::vec::IntoIter<FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileList {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Random-access form of a [`FileList`]. Fixed length; no ordering beyond
/// enumeration order is defined.
#[derive(Debug, Clone)]
pub struct FileArray {
    entries: Box<[FileEntry]>,
    totals: FileListTotals,
}

impl FileArray {
    pub fn totals(&self) -> FileListTotals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&FileEntry> {
        self.entries.get(i)
    }

    pub fn as_slice(&self) -> &[FileEntry] {
        &self.entries
    }
}

impl Index<usize> for FileArray {
    type Output = FileEntry;

    fn index(&self, i: usize) -> &FileEntry {
        &self.entries[i]
    }
}

// Both conversions hand over the owned entries; nothing is cloned.
impl From<FileList> for FileArray {
    fn from(list: FileList) -> Self {
        FileArray {
            entries: list.entries.into_boxed_slice(),
            totals: list.totals,
        }
    }
}

impl From<FileArray> for FileList {
    fn from(array: FileArray) -> Self {
        FileList {
            entries: array.entries.into_vec(),
            totals: array.totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: EntryType, size: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            kind,
            size,
        }
    }

    fn sample() -> FileList {
        let mut list = FileList::new();
        list.push(entry("/r", EntryType::Directory, 0));
        list.push(entry("/r/a.txt", EntryType::Regular, 13));
        list.push(entry("/r/ln", EntryType::Symlink, 6));
        list
    }

    #[test]
    fn totals_track_pushes() {
        let list = sample();
        let t = list.totals();
        assert_eq!(t.count, 3);
        assert_eq!(t.data_bytes, 19);
        assert_eq!(t.name_bytes, (2 + 1) + (8 + 1) + (5 + 1));
    }

    #[test]
    fn empty_list() {
        let list = FileList::new();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.totals(), FileListTotals::default());
        let array = FileArray::from(list);
        assert!(array.is_empty());
        assert!(FileList::from(array).is_empty());
    }

    #[test]
    fn array_conversion_preserves_order_and_bounds() {
        let list = sample();
        let totals = list.totals();
        let array = FileArray::from(list);

        assert_eq!(array.len(), 3);
        assert_eq!(array.totals(), totals);
        assert_eq!(array[0].path, PathBuf::from("/r"));
        assert_eq!(array[2].kind, EntryType::Symlink);
        assert!(array.get(3).is_none());

        let back = FileList::from(array);
        assert_eq!(back.totals(), totals);
        assert_eq!(back.first().unwrap().path, PathBuf::from("/r"));
        assert_eq!(back.last().unwrap().path, PathBuf::from("/r/ln"));
        let paths: Vec<_> = back.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/a.txt"),
                PathBuf::from("/r/ln")
            ]
        );
    }

    #[test]
    fn single_entry_conversion() {
        let mut list = FileList::new();
        list.push(entry("/only", EntryType::Directory, 0));
        let back = FileList::from(FileArray::from(list));
        assert_eq!(back.len(), 1);
        assert_eq!(back.first(), back.last());
    }
}
