//! CAR v4: a single-file container archive built on memory-mapped I/O.
//!
//! An archive is a fixed 32-byte header, a table of contents of 24-byte
//! records, a packed table of null-terminated names and a packed data blob.
//! All offsets are computed once when the archive is built and are trusted on
//! read only after the header and body CRC-32 checksums verify.
//!
//! ```no_run
//! use std::path::Path;
//!
//! # fn main() -> car::archive::ArchiveResult<()> {
//! car::archive::build(Path::new("assets"), Path::new("assets.car"))?;
//! assert!(car::archive::validate(Path::new("assets.car")));
//! for name in car::archive::list(Path::new("assets.car"))? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("car stores symlinks and raw OS path bytes and only supports Unix targets");

pub mod archive;
