#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path};

use tracing::{debug, error, warn};

use crate::archive::build::{build as build_impl, BuildSummary};
use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::format::{ArchiveInfo, EntryInfo, EntryType};
use crate::archive::io::until_nul;
use crate::archive::path::{display, join_stored};
use crate::archive::read::{ArchiveReader, Record};
use crate::archive::report::{self, Op};

/// Packs the tree under `root` into a new archive at `archive`.
pub fn build(root: &Path, archive: &Path) -> ArchiveResult<BuildSummary> {
    build_impl(root, archive)
}

/// Checks magic, version and both checksums. Never modifies the file.
pub fn verify(archive: &Path) -> ArchiveResult<()> {
    let reader = ArchiveReader::open(archive)?;
    reader.verify_body_checksum()?;
    debug!("{} verified: {} entries", archive.display(), reader.entry_count()?);
    Ok(())
}

/// [`verify`] collapsed to a verdict; the reason for a failure is logged.
pub fn validate(archive: &Path) -> bool {
    match verify(archive) {
        Ok(()) => true,
        Err(e) => {
            error!("{} is not a valid archive: {e}", archive.display());
            false
        }
    }
}

/// Stored names in TOC order, duplicates included.
pub fn list(archive: &Path) -> ArchiveResult<Vec<String>> {
    let reader = ArchiveReader::open(archive)?;
    let mut names = Vec::with_capacity(reader.records()?.size_hint().0);
    for rec in reader.records()? {
        let name = display(rec?.name).into_owned();
        report::emit(Op::Listed, &name);
        names.push(name);
    }
    Ok(names)
}

/// Read TOC entries (without extracting payloads).
pub fn entries(archive: &Path) -> ArchiveResult<Vec<EntryInfo>> {
    let reader = ArchiveReader::open(archive)?;
    let infos = reader
        .records()?
        .map(|rec| rec.map(|r| r.info()))
        .collect::<ArchiveResult<Vec<_>>>()?;
    Ok(infos)
}

/// Header summary; checksum mismatches are reported, not raised.
pub fn info(archive: &Path) -> ArchiveResult<ArchiveInfo> {
    let reader = ArchiveReader::map(archive)?;
    let header = reader.header();
    header.check_identity()?;

    Ok(ArchiveInfo {
        version: String::from_utf8_lossy(&header.version).into_owned(),
        flags: header.flags,
        entry_count: header.entry_count()?,
        string_offset: header.string_offset,
        data_offset: header.data_offset,
        size: reader.file_len(),
        checksum: header.checksum,
        checksum_ok: reader.verify_body_checksum().is_ok(),
        header_checksum: header.header_checksum,
        header_checksum_ok: reader.verify_header_checksum().is_ok(),
    })
}

/// Recreates every entry under `out_dir`. The first failing record aborts
/// the rest.
pub fn extract_all(archive: &Path, out_dir: &Path) -> ArchiveResult<()> {
    let reader = ArchiveReader::open(archive)?;
    reader.verify_body_checksum()?;

    for rec in reader.records()? {
        let rec = rec?;
        check_stored_name(rec.name)?;
        confine(out_dir, rec.name, rec.kind)?;
        report::emit(Op::Extracted, &display(rec.name));
        materialize(&rec, &join_stored(out_dir, rec.name), true)?;
    }
    Ok(())
}

/// Applies every record named exactly `item` to `output`, in TOC order, so
/// the last matching file or directory wins. Returns the number of matches.
pub fn extract_item(archive: &Path, item: &str, output: &Path) -> ArchiveResult<usize> {
    let reader = ArchiveReader::open(archive)?;
    reader.verify_body_checksum()?;

    let mut matched = 0;
    for rec in reader.records()? {
        let rec = rec?;
        if rec.name != item.as_bytes() {
            continue;
        }
        matched += 1;
        report::emit(Op::Extracted, &display(rec.name));
        materialize(&rec, output, false)?;
    }

    if matched == 0 {
        debug!("no entry named {item} in {}", archive.display());
    }
    Ok(matched)
}

/// Stored names are '/'-rooted and may not climb out of the output directory.
fn check_stored_name(name: &[u8]) -> ArchiveResult<()> {
    if name.first() != Some(&b'/') {
        return Err(ArchiveError::Invalid(format!(
            "entry name {} is not rooted at '/'",
            display(name)
        )));
    }
    let path = Path::new(OsStr::from_bytes(name));
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(ArchiveError::Invalid(format!(
            "entry name {} escapes the output directory",
            display(name)
        )));
    }
    Ok(())
}

/// Symlinks created by earlier records must not redirect later writes out of
/// `out_dir`. Any symlink between `out_dir` and the entry is refused. A
/// symlink at the entry itself is replaced by a regular file, refused for a
/// directory and left to [`materialize`] for another symlink.
fn confine(out_dir: &Path, name: &[u8], kind: EntryType) -> ArchiveResult<()> {
    let mut at = out_dir.to_path_buf();
    let mut parts = Path::new(OsStr::from_bytes(name))
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .peekable();

    while let Some(part) = parts.next() {
        at.push(part);
        let meta = match fs::symlink_metadata(&at) {
            Ok(meta) => meta,
            // Nothing deeper can exist either.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ArchiveError::at(&at, e)),
        };
        if !meta.file_type().is_symlink() {
            continue;
        }
        if parts.peek().is_some() {
            return Err(ArchiveError::Invalid(format!(
                "entry name {} passes through symlink {}",
                display(name),
                at.display()
            )));
        }
        match kind {
            EntryType::Regular => fs::remove_file(&at).map_err(|e| ArchiveError::at(&at, e))?,
            EntryType::Directory => {
                return Err(ArchiveError::Invalid(format!(
                    "directory entry {} is shadowed by symlink {}",
                    display(name),
                    at.display()
                )))
            }
            EntryType::Symlink => {}
        }
    }
    Ok(())
}

/// Writes one record to `out`. With `no_follow`, a regular file is never
/// written through a symlink at `out`.
fn materialize(rec: &Record<'_>, out: &Path, no_follow: bool) -> ArchiveResult<()> {
    match rec.kind {
        EntryType::Regular => {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            if no_follow {
                opts.custom_flags(libc::O_NOFOLLOW);
            }
            let mut f = opts.open(out).map_err(|e| ArchiveError::at(out, e))?;
            f.write_all(rec.payload).map_err(|e| ArchiveError::at(out, e))?;
        }
        EntryType::Directory => match fs::create_dir(out) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(ArchiveError::at(out, e)),
        },
        EntryType::Symlink => {
            // symlink_metadata so a dangling link also counts as existing.
            if fs::symlink_metadata(out).is_ok() {
                warn!("file '{}' already exists, ignoring", out.display());
                return Ok(());
            }
            let target = OsStr::from_bytes(until_nul(rec.payload));
            std::os::unix::fs::symlink(target, out).map_err(|e| ArchiveError::at(out, e))?;
        }
    }
    Ok(())
}
