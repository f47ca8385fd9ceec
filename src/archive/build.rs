use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::format::{
    EntryType, Header, Layout, TocRecord, HEADER_CHECKED_LEN, HEADER_SIZE, TOC_RECORD_SIZE,
};
use crate::archive::io::{checksum, slice_mut, write_bytes};
use crate::archive::path::{archive_name, display};
use crate::archive::report::{self, Op};
use crate::archive::walk::{FileEntry, FileList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub entries: u64,
    pub total_size: u64,
}

/// CAR v4 layout:
/// - header (32 bytes, see `format`)
/// - TOC: one 24-byte record per entry, in enumeration order
/// - string table: every archive-relative name, null-terminated
/// - data blob: file contents, nothing for directories, symlink target + '\0'
///
/// Rules:
/// - all offsets are fixed before the destination is created
/// - checksums are written last, after every other byte is final
/// - on any failure the destination file is removed
pub fn build(root: &Path, archive: &Path) -> ArchiveResult<BuildSummary> {
    let list = FileList::scan(root)?;
    pack(root, &list, archive)
}

/// Writes the already enumerated `list` (paths under `root`) to `archive`.
fn pack(root: &Path, list: &FileList, archive: &Path) -> ArchiveResult<BuildSummary> {
    let names = list
        .iter()
        .map(|e| archive_name(root, &e.path))
        .collect::<ArchiveResult<Vec<_>>>()?;

    let totals = list.totals();
    let names_len: u64 = names.iter().map(|n| n.len() as u64 + 1).sum();
    let layout = Layout::compute(totals.count, names_len, totals.data_bytes)?;
    debug!(
        "layout for {}: {} entries, strings at {}, data at {}, {} bytes total",
        archive.display(),
        layout.entry_count,
        layout.string_offset,
        layout.data_offset,
        layout.total_size
    );

    let mut out = PartialArchive::create(archive, layout.total_size)?;
    write_archive(out.bytes_mut(), &layout, list, &names)?;
    out.finish()?;

    Ok(BuildSummary {
        entries: layout.entry_count,
        total_size: layout.total_size,
    })
}

/// Writes a complete archive into `buf`, which must be exactly
/// `layout.total_size` bytes and zero-filled.
pub(crate) fn write_archive(
    buf: &mut [u8],
    layout: &Layout,
    list: &FileList,
    names: &[Vec<u8>],
) -> ArchiveResult<()> {
    if buf.len() as u64 != layout.total_size {
        return Err(ArchiveError::Invalid(format!(
            "destination is {} bytes, layout needs {}",
            buf.len(),
            layout.total_size
        )));
    }

    let mut header = Header::new(layout);
    write_bytes(buf, 0, &header.to_bytes())?;

    let string_base = u64::from(layout.string_offset);
    let mut toc_cur = HEADER_SIZE;
    let mut str_cur: u64 = 0;
    let mut data_cur: u64 = 0;

    for (entry, name) in list.iter().zip(names) {
        report::emit(Op::Archived, &display(name));

        let name_offset = u32::try_from(str_cur)
            .map_err(|_| ArchiveError::TooLarge("string table exceeds 32-bit offsets".into()))?;
        let rec = TocRecord {
            name_offset,
            kind: entry.kind,
            data_offset: data_cur,
            size: entry.size,
        };
        write_bytes(buf, toc_cur, &rec.to_bytes())?;

        write_bytes(buf, string_base + str_cur, name)?;
        write_bytes(buf, string_base + str_cur + name.len() as u64, &[0])?;

        let payload = slice_mut(buf, layout.data_offset + data_cur, entry.size)?;
        match entry.kind {
            EntryType::Regular => copy_file(entry, payload)?,
            EntryType::Directory => {}
            EntryType::Symlink => copy_link(entry, payload)?,
        }

        toc_cur += TOC_RECORD_SIZE;
        str_cur += name.len() as u64 + 1;
        data_cur += entry.size;
    }

    header.checksum = checksum(&buf[HEADER_SIZE as usize..]);
    header.header_checksum = checksum(&header.to_bytes()[..HEADER_CHECKED_LEN as usize]);
    write_bytes(buf, 0, &header.to_bytes())?;
    Ok(())
}

fn copy_file(entry: &FileEntry, dst: &mut [u8]) -> ArchiveResult<()> {
    if dst.is_empty() {
        return Ok(());
    }
    let mut f = File::open(&entry.path).map_err(|e| ArchiveError::at(&entry.path, e))?;
    f.read_exact(dst).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ArchiveError::Invalid(format!(
                "{} shrank after it was enumerated",
                entry.path.display()
            ))
        } else {
            ArchiveError::at(&entry.path, e)
        }
    })?;
    Ok(())
}

fn copy_link(entry: &FileEntry, dst: &mut [u8]) -> ArchiveResult<()> {
    let target = fs::read_link(&entry.path).map_err(|e| ArchiveError::at(&entry.path, e))?;
    let bytes = target.as_os_str().as_bytes();
    if bytes.len() as u64 + 1 != dst.len() as u64 {
        return Err(ArchiveError::Invalid(format!(
            "link {} changed after it was enumerated",
            entry.path.display()
        )));
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0;
    Ok(())
}

/// Destination file mapped for writing. Removed on drop unless
/// [`PartialArchive::finish`] succeeded.
struct PartialArchive {
    path: PathBuf,
    map: Option<MmapMut>,
    done: bool,
}

impl PartialArchive {
    fn create(path: &Path, size: u64) -> ArchiveResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ArchiveError::at(path, e))?;

        let mut partial = PartialArchive {
            path: path.to_path_buf(),
            map: None,
            done: false,
        };

        file.set_len(size)?;
        // SAFETY: the file was just created/truncated by us and is sized to
        // the full archive; callers must not touch the destination path while
        // a build is in progress.
        #[allow(unsafe_code)]
        let map = unsafe { MmapMut::map_mut(&file)? };
        partial.map = Some(map);
        Ok(partial)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self.map.as_mut() {
            Some(map) => &mut map[..],
            None => &mut [],
        }
    }

    fn finish(mut self) -> ArchiveResult<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        self.done = true;
        Ok(())
    }
}

impl Drop for PartialArchive {
    fn drop(&mut self) {
        // Unmap before unlinking.
        self.map.take();
        if self.done {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "could not remove partial archive {}: {e}",
                self.path.display()
            );
        }
    }
}
