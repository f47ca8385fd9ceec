//! Bounds-checked little-endian accessors over archive bytes.
//!
//! Every offset taken from an archive is untrusted until it has been checked
//! against the buffer it indexes, so nothing in here can read or write out of
//! bounds on a crafted file.

#![forbid(unsafe_code)]

use crate::archive::error::{ArchiveError, ArchiveResult};

/// CRC-32 (IEEE) over `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

fn range(len: usize, at: u64, n: u64) -> ArchiveResult<std::ops::Range<usize>> {
    let end = at
        .checked_add(n)
        .ok_or_else(|| ArchiveError::Invalid(format!("offset overflow at {at}")))?;
    if end > len as u64 {
        return Err(ArchiveError::Invalid(format!(
            "range {at}..{end} outside buffer of {len} bytes"
        )));
    }
    // `end <= len` so both fit in usize.
    Ok(at as usize..end as usize)
}

pub fn slice(buf: &[u8], at: u64, n: u64) -> ArchiveResult<&[u8]> {
    let r = range(buf.len(), at, n)?;
    Ok(&buf[r])
}

pub fn slice_mut(buf: &mut [u8], at: u64, n: u64) -> ArchiveResult<&mut [u8]> {
    let r = range(buf.len(), at, n)?;
    Ok(&mut buf[r])
}

pub fn read_exact<const N: usize>(buf: &[u8], at: u64) -> ArchiveResult<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(buf, at, N as u64)?);
    Ok(out)
}

pub fn read_u8(buf: &[u8], at: u64) -> ArchiveResult<u8> {
    Ok(read_exact::<1>(buf, at)?[0])
}

pub fn read_u16(buf: &[u8], at: u64) -> ArchiveResult<u16> {
    Ok(u16::from_le_bytes(read_exact::<2>(buf, at)?))
}

pub fn read_u32(buf: &[u8], at: u64) -> ArchiveResult<u32> {
    Ok(u32::from_le_bytes(read_exact::<4>(buf, at)?))
}

pub fn read_u64(buf: &[u8], at: u64) -> ArchiveResult<u64> {
    Ok(u64::from_le_bytes(read_exact::<8>(buf, at)?))
}

pub fn write_bytes(buf: &mut [u8], at: u64, bytes: &[u8]) -> ArchiveResult<()> {
    slice_mut(buf, at, bytes.len() as u64)?.copy_from_slice(bytes);
    Ok(())
}

pub fn write_u32(buf: &mut [u8], at: u64, v: u32) -> ArchiveResult<()> {
    write_bytes(buf, at, &v.to_le_bytes())
}

/// Null-terminated string starting at `at`, without its terminator.
pub fn cstr(buf: &[u8], at: u64) -> ArchiveResult<&[u8]> {
    let tail = slice(buf, at, (buf.len() as u64).saturating_sub(at))?;
    match tail.iter().position(|&b| b == 0) {
        Some(end) => Ok(&tail[..end]),
        None => Err(ArchiveError::Invalid(format!(
            "unterminated string at offset {at}"
        ))),
    }
}

/// Bytes of `payload` up to its first null byte (or all of it).
pub fn until_nul(payload: &[u8]) -> &[u8] {
    match payload.iter().position(|&b| b == 0) {
        Some(end) => &payload[..end],
        None => payload,
    }
}
