#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use crate::archive::error::{ArchiveError, ArchiveResult};

/// Archive-relative name of `file_path`: the `root` prefix is stripped and the
/// remaining components are joined with '/', always starting with '/'.
/// The root itself becomes "/".
pub fn archive_name(root: &Path, file_path: &Path) -> ArchiveResult<Vec<u8>> {
    let rel = file_path.strip_prefix(root).map_err(|_| {
        ArchiveError::Invalid(format!(
            "{} is outside {}",
            file_path.display(),
            root.display()
        ))
    })?;

    let mut out = Vec::with_capacity(rel.as_os_str().len() + 1);
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => {
                out.push(b'/');
                out.extend_from_slice(part.as_bytes());
            }
            Component::CurDir => {}
            other => {
                return Err(ArchiveError::Invalid(format!(
                    "unexpected path component {:?} in {}",
                    other.as_os_str(),
                    file_path.display()
                )))
            }
        }
    }

    if out.is_empty() {
        out.push(b'/');
    }
    Ok(out)
}

/// Output location of a stored name under `out_dir`. Names already begin
/// with '/', so the two are concatenated without inserting a separator.
pub fn join_stored(out_dir: &Path, name: &[u8]) -> PathBuf {
    let mut bytes = out_dir.as_os_str().as_bytes().to_vec();
    bytes.extend_from_slice(name);
    PathBuf::from(OsStr::from_bytes(&bytes))
}

/// Printable form of a stored name.
pub fn display(name: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(name)
}
