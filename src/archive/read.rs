use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::format::{
    EntryInfo, EntryType, Header, TocRecord, HEADER_CHECKED_LEN, HEADER_SIZE, TOC_RECORD_SIZE,
};
use crate::archive::io::{checksum, cstr, slice};
use crate::archive::path::display;

/// Read-only mapping of an archive file. Dropping it unmaps the file.
pub struct ArchiveReader {
    map: Mmap,
    header: Header,
}

/// One TOC record resolved against the string table and data blob.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub name: &'a [u8],
    pub kind: EntryType,
    /// Offset of the payload inside the data blob.
    pub data_offset: u64,
    pub payload: &'a [u8],
}

impl Record<'_> {
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: display(self.name).into_owned(),
            kind: self.kind,
            data_offset: self.data_offset,
            size: self.payload.len() as u64,
        }
    }
}

impl ArchiveReader {
    /// Maps `path` and parses its header without judging it.
    pub fn map(path: &Path) -> ArchiveResult<Self> {
        let file = File::open(path).map_err(|e| ArchiveError::at(path, e))?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE {
            return Err(ArchiveError::Invalid(format!(
                "{} is {len} bytes, smaller than a header",
                path.display()
            )));
        }

        // SAFETY: read-only mapping; the archive is not modified while a
        // single operation holds it, and every access below is bounds-checked.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file)? };
        let header = Header::from_bytes(&map)?;
        debug!(
            "mapped {} ({} bytes): strings at {}, data at {}",
            path.display(),
            map.len(),
            header.string_offset,
            header.data_offset
        );

        Ok(ArchiveReader {
            map,
            header,
        })
    }

    /// Maps `path` and checks magic, version, header checksum and that the
    /// three regions fit the file.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let reader = Self::map(path)?;
        reader.header.check_identity()?;
        reader.verify_header_checksum()?;
        reader.check_layout()?;
        Ok(reader)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Size of the mapped archive file in bytes.
    pub fn file_len(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn entry_count(&self) -> ArchiveResult<u64> {
        self.header.entry_count()
    }

    pub fn computed_header_checksum(&self) -> u32 {
        checksum(&self.map[..HEADER_CHECKED_LEN as usize])
    }

    pub fn computed_body_checksum(&self) -> u32 {
        checksum(&self.map[HEADER_SIZE as usize..])
    }

    pub fn verify_header_checksum(&self) -> ArchiveResult<()> {
        let computed = self.computed_header_checksum();
        if computed != self.header.header_checksum {
            return Err(ArchiveError::HeaderChecksum {
                stored: self.header.header_checksum,
                computed,
            });
        }
        Ok(())
    }

    pub fn verify_body_checksum(&self) -> ArchiveResult<()> {
        let computed = self.computed_body_checksum();
        if computed != self.header.checksum {
            return Err(ArchiveError::BodyChecksum {
                stored: self.header.checksum,
                computed,
            });
        }
        Ok(())
    }

    fn check_layout(&self) -> ArchiveResult<()> {
        self.entry_count()?;
        let string_offset = u64::from(self.header.string_offset);
        if self.header.data_offset < string_offset {
            return Err(ArchiveError::Invalid(format!(
                "data blob at {} starts before string table at {string_offset}",
                self.header.data_offset
            )));
        }
        if self.header.data_offset > self.file_len() {
            return Err(ArchiveError::Invalid(format!(
                "data blob at {} starts past end of file ({} bytes)",
                self.header.data_offset,
                self.file_len()
            )));
        }
        Ok(())
    }

    /// TOC records in stored order.
    pub fn records(&self) -> ArchiveResult<Records<'_>> {
        Ok(Records {
            reader: self,
            next: 0,
            count: self.entry_count()?,
        })
    }

    fn record(&self, index: u64) -> ArchiveResult<Record<'_>> {
        let bytes: &[u8] = &self.map;
        let rec = TocRecord::read_at(bytes, HEADER_SIZE + index * TOC_RECORD_SIZE)?;

        // Names must terminate inside the string table.
        let strings_end = self.header.data_offset.min(self.file_len());
        let strings = slice(bytes, 0, strings_end)?;
        let name = cstr(
            strings,
            u64::from(self.header.string_offset) + u64::from(rec.name_offset),
        )?;

        let payload_at = self
            .header
            .data_offset
            .checked_add(rec.data_offset)
            .ok_or_else(|| ArchiveError::Invalid(format!("record {index}: data offset overflow")))?;
        let payload = slice(bytes, payload_at, rec.size)?;

        Ok(Record {
            name,
            kind: rec.kind,
            data_offset: rec.data_offset,
            payload,
        })
    }
}

pub struct Records<'a> {
    reader: &'a ArchiveReader,
    next: u64,
    count: u64,
}

impl<'a> Iterator for Records<'a> {
    type Item = ArchiveResult<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(self.reader.record(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.count - self.next).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}
