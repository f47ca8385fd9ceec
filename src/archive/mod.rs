#![deny(unsafe_code)]

mod build;
mod error;
mod format;
mod io;
mod ops;
mod path;
mod read;
mod report;
mod walk;

pub use build::BuildSummary;

pub use error::{ArchiveError, ArchiveResult};
pub use format::{
    ArchiveInfo, EntryInfo, EntryType, Header, Layout, TocRecord, HEADER_CHECKED_LEN,
    HEADER_SIZE, MAGIC, TOC_RECORD_SIZE, VERSION,
};
pub use io::checksum;
pub use read::{ArchiveReader, Record, Records};
pub use report::Op;
pub use walk::{FileArray, FileEntry, FileList, FileListTotals};

pub use ops::{build, entries, extract_all, extract_item, info, list, validate, verify};
