#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("permission denied: {}", .path.display())]
    Access { path: PathBuf },

    #[error("walk: {0}")]
    Walk(String),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("bad archive magic")]
    BadMagic,

    #[error("unsupported archive version")]
    BadVersion,

    #[error("header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    HeaderChecksum { stored: u32, computed: u32 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    BodyChecksum { stored: u32, computed: u32 },

    #[error("invalid archive: {0}")]
    Invalid(String),

    #[error("unknown entry type {0:#04x}")]
    UnknownEntryType(u8),

    #[error("archive too large: {0}")]
    TooLarge(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

impl ArchiveError {
    /// Wraps an I/O error raised while touching `path`, keeping permission
    /// failures distinguishable from other I/O failures.
    pub(crate) fn at(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            ArchiveError::Access {
                path: path.to_path_buf(),
            }
        } else {
            ArchiveError::Io(err)
        }
    }
}

impl From<walkdir::Error> for ArchiveError {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(|p| p.to_path_buf());
        let msg = e.to_string();
        match (e.into_io_error(), path) {
            (Some(io), Some(path)) => ArchiveError::at(&path, io),
            (Some(io), None) => ArchiveError::Io(io),
            (None, _) => ArchiveError::Walk(msg),
        }
    }
}
