//! A streaming engine for reading and writing TAR archives
//!
//! This library reads and writes POSIX/GNU style tar archives [1] as a
//! sequence of discrete entries: regular files, directories, symlinks, device
//! nodes and FIFOs. Archives live in plain files or in gzip or bzip2
//! compressed files, and are never required to be resident in memory. Entries
//! are visited one at a time, with the payload of an entry skipped lazily if
//! the caller moves on without reading it.
//!
//! The central type is [`Archive`], a handle opened either for reading or for
//! writing:
//!
//! ```no_run
//! use std::path::Path;
//! use tarstream::{Archive, Mode, Options};
//!
//! # fn main() -> tarstream::Result<()> {
//! let mut ar = Archive::open("foo.tar", Mode::Write, Options::GNU)?;
//! ar.append_tree_with_name("src", "foo/src")?;
//! ar.close()?;
//!
//! let mut ar = Archive::open("foo.tar", Mode::Read, Options::GNU)?;
//! ar.extract_glob("foo/src/*.rs", Some(Path::new("out")))?;
//! ar.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! GNU long name and long link extension entries are folded into the entry
//! they describe and never surface as entries of their own.
//!
//! [1]: http://en.wikipedia.org/wiki/Tar_%28computing%29

#![deny(missing_docs)]

use std::io;

pub use crate::archive::{Archive, Entries, DEFAULT_PERMISSIONS};
pub use crate::backend::{Backend, Compression, Mode};
pub use crate::cancel::CancelToken;
pub use crate::entry_type::EntryType;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::glob::matches as glob_matches;
pub use crate::header::{EntryHeader, Header};
pub use crate::list::{print_header, print_long_ls};
pub use crate::options::Options;

mod archive;
mod backend;
mod builder;
mod cancel;
mod entry;
mod entry_type;
mod error;
mod glob;
mod gnu;
mod header;
mod list;
mod options;

/// Size of a single header or payload block in an archive.
pub const BLOCK_SIZE: u64 = 512;

fn other(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg)
}

fn bad_archive() -> io::Error {
    other("invalid tar archive")
}
