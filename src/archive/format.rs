#![forbid(unsafe_code)]

use std::fmt;

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::io::{read_exact, read_u16, read_u32, read_u64, read_u8};

/// CAR header magic.
pub const MAGIC: [u8; 4] = *b"CAR\0";

/// CAR format version, stored as text.
pub const VERSION: [u8; 3] = *b"4.0";

/// CAR v4 header layout (32 bytes, little-endian):
/// - [magic 4] [version 3] [reserved 1]
/// - [u16 flags] [reserved 2]
/// - [u32 string_offset]
/// - [u64 data_offset]
/// - [u32 checksum] over bytes `HEADER_SIZE..` of the file
/// - [u32 header_checksum] over bytes `..HEADER_CHECKED_LEN` of the header
pub const HEADER_SIZE: u64 = 32;

/// Bytes of the header covered by `header_checksum`.
pub const HEADER_CHECKED_LEN: u64 = 24;

/// TOC record layout (24 bytes, little-endian):
/// - [u32 name_offset] [u8 type] [reserved 3]
/// - [u64 data_offset]
/// - [u64 size]
pub const TOC_RECORD_SIZE: u64 = 24;

const OFF_MAGIC: u64 = 0;
const OFF_VERSION: u64 = 4;
const OFF_FLAGS: u64 = 8;
const OFF_STRING_OFFSET: u64 = 12;
const OFF_DATA_OFFSET: u64 = 16;
const OFF_CHECKSUM: u64 = 24;
const OFF_HEADER_CHECKSUM: u64 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Regular => "file",
            EntryType::Directory => "dir",
            EntryType::Symlink => "symlink",
        }
    }
}

impl TryFrom<u8> for EntryType {
    type Error = ArchiveError;

    fn try_from(v: u8) -> ArchiveResult<Self> {
        match v {
            0 => Ok(EntryType::Regular),
            1 => Ok(EntryType::Directory),
            2 => Ok(EntryType::Symlink),
            other => Err(ArchiveError::UnknownEntryType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: [u8; 3],
    pub flags: u16,
    pub string_offset: u32,
    pub data_offset: u64,
    pub checksum: u32,
    pub header_checksum: u32,
}

impl Header {
    /// Fresh header for the given layout, checksums left as placeholders.
    pub fn new(layout: &Layout) -> Self {
        Header {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            string_offset: layout.string_offset,
            data_offset: layout.data_offset,
            checksum: 0,
            header_checksum: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut out = [0u8; HEADER_SIZE as usize];
        out[0..4].copy_from_slice(&self.magic);
        out[4..7].copy_from_slice(&self.version);
        out[8..10].copy_from_slice(&self.flags.to_le_bytes());
        out[12..16].copy_from_slice(&self.string_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        out[24..28].copy_from_slice(&self.checksum.to_le_bytes());
        out[28..32].copy_from_slice(&self.header_checksum.to_le_bytes());
        out
    }

    /// Parses the header at the start of `bytes`. Fields are taken verbatim;
    /// see [`Header::check_identity`] for magic/version checks.
    pub fn from_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        if (bytes.len() as u64) < HEADER_SIZE {
            return Err(ArchiveError::Invalid(format!(
                "file too small for header: {} bytes",
                bytes.len()
            )));
        }
        Ok(Header {
            magic: read_exact::<4>(bytes, OFF_MAGIC)?,
            version: read_exact::<3>(bytes, OFF_VERSION)?,
            flags: read_u16(bytes, OFF_FLAGS)?,
            string_offset: read_u32(bytes, OFF_STRING_OFFSET)?,
            data_offset: read_u64(bytes, OFF_DATA_OFFSET)?,
            checksum: read_u32(bytes, OFF_CHECKSUM)?,
            header_checksum: read_u32(bytes, OFF_HEADER_CHECKSUM)?,
        })
    }

    pub fn check_identity(&self) -> ArchiveResult<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::BadMagic);
        }
        if self.version != VERSION {
            return Err(ArchiveError::BadVersion);
        }
        Ok(())
    }

    /// Number of TOC records implied by `string_offset`.
    pub fn entry_count(&self) -> ArchiveResult<u64> {
        let toc_len = u64::from(self.string_offset)
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| ArchiveError::Invalid("string table overlaps header".into()))?;
        if toc_len % TOC_RECORD_SIZE != 0 {
            return Err(ArchiveError::Invalid(format!(
                "table of contents length {toc_len} is not a multiple of {TOC_RECORD_SIZE}"
            )));
        }
        Ok(toc_len / TOC_RECORD_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocRecord {
    pub name_offset: u32,
    pub kind: EntryType,
    pub data_offset: u64,
    pub size: u64,
}

impl TocRecord {
    pub fn to_bytes(&self) -> [u8; TOC_RECORD_SIZE as usize] {
        let mut out = [0u8; TOC_RECORD_SIZE as usize];
        out[0..4].copy_from_slice(&self.name_offset.to_le_bytes());
        out[4] = self.kind as u8;
        out[8..16].copy_from_slice(&self.data_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Parses the record starting at `at` in `bytes`.
    pub fn read_at(bytes: &[u8], at: u64) -> ArchiveResult<Self> {
        let name_offset = read_u32(bytes, at)?;
        let kind = EntryType::try_from(read_u8(bytes, at + 4)?)?;
        Ok(TocRecord {
            name_offset,
            kind,
            data_offset: read_u64(bytes, at + 8)?,
            size: read_u64(bytes, at + 16)?,
        })
    }
}

/// Offsets of the three archive regions, derived from the entry set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub entry_count: u64,
    pub string_offset: u32,
    pub data_offset: u64,
    pub total_size: u64,
}

impl Layout {
    /// `names_len` is the string table length (every name plus its
    /// terminator), `data_len` the sum of all payload sizes.
    pub fn compute(entry_count: u64, names_len: u64, data_len: u64) -> ArchiveResult<Self> {
        let string_offset = entry_count
            .checked_mul(TOC_RECORD_SIZE)
            .and_then(|toc| toc.checked_add(HEADER_SIZE))
            .and_then(|off| u32::try_from(off).ok())
            .ok_or_else(|| {
                ArchiveError::TooLarge(format!("{entry_count} entries do not fit a 32-bit TOC"))
            })?;
        let data_offset = u64::from(string_offset)
            .checked_add(names_len)
            .ok_or_else(|| ArchiveError::TooLarge("string table".into()))?;
        let total_size = data_offset
            .checked_add(data_len)
            .ok_or_else(|| ArchiveError::TooLarge("data blob".into()))?;
        Ok(Layout {
            entry_count,
            string_offset,
            data_offset,
            total_size,
        })
    }
}

/// Public view of an archived entry (inspectors, `info --entries`, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub kind: EntryType,
    /// Offset of the payload inside the data blob.
    pub data_offset: u64,
    pub size: u64,
}

/// Summary of an archive header, as reported by `info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub version: String,
    pub flags: u16,
    pub entry_count: u64,
    pub string_offset: u32,
    pub data_offset: u64,
    pub size: u64,
    pub checksum: u32,
    pub checksum_ok: bool,
    pub header_checksum: u32,
    pub header_checksum_ok: bool,
}

impl fmt::Display for ArchiveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = |ok: bool| if ok { "ok" } else { "MISMATCH" };
        writeln!(f, "version         : {}", self.version)?;
        writeln!(f, "flags           : {:#06x}", self.flags)?;
        writeln!(f, "entries         : {}", self.entry_count)?;
        writeln!(f, "string offset   : {}", self.string_offset)?;
        writeln!(f, "data offset     : {}", self.data_offset)?;
        writeln!(f, "size            : {}", self.size)?;
        writeln!(
            f,
            "checksum        : {:#010x} ({})",
            self.checksum,
            verdict(self.checksum_ok)
        )?;
        write!(
            f,
            "header checksum : {:#010x} ({})",
            self.header_checksum,
            verdict(self.header_checksum_ok)
        )
    }
}
