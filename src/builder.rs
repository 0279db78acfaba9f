#[cfg(unix)]
use std::os::unix::prelude::*;
use std::borrow::Cow;
use std::collections::hash_map;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::header::{bytes2path, path2bytes};
use crate::{gnu, list, other};
use crate::{Archive, EntryHeader, EntryType, Options};

impl Archive {
    /// Adds a file on the local filesystem to this archive under its own
    /// path.
    ///
    /// See [`append_file_with_name`](Archive::append_file_with_name).
    pub fn append_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let (real, save) = names(path.as_ref(), None)?;
        self.append_fs(&real, &save)
    }

    /// Adds a file on the local filesystem to this archive, recording it
    /// under `name`.
    ///
    /// The file is not followed if it is a symlink: the link itself is
    /// stored. Directories are stored without their contents, and a file
    /// already appended through another hard link is stored as a hard link
    /// to the name it was first saved under. One trailing separator is
    /// stripped from both `path` and `name`.
    ///
    /// Names longer than 100 bytes are written as a GNU long name entry if
    /// `Options::GNU` is set, or split into the ustar prefix otherwise.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tarstream::{Archive, Mode, Options};
    ///
    /// # fn main() -> tarstream::Result<()> {
    /// let mut ar = Archive::open("foo.tar", Mode::Write, Options::GNU)?;
    ///
    /// // Read the file at one location, but insert it into the archive with
    /// // a different name.
    /// ar.append_file_with_name("foo/bar/baz.txt", "bar/baz.txt")?;
    /// ar.close()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn append_file_with_name<P, Q>(&mut self, path: P, name: Q) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (real, save) = names(path.as_ref(), Some(name.as_ref()))?;
        self.append_fs(&real, &save)
    }

    /// Adds a directory and all of its contents (recursively) to this
    /// archive under its own path.
    ///
    /// See [`append_tree_with_name`](Archive::append_tree_with_name).
    pub fn append_tree<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let (real, save) = names(path.as_ref(), None)?;
        self.append_dir_all(&real, &save)
    }

    /// Adds a directory and all of its contents (recursively) to this
    /// archive, recording it under `name`.
    ///
    /// The directory itself is appended first, then each child in the order
    /// the platform lists them, which is not sorted. Subdirectories are
    /// recursed into. A symlink to a directory passed as `path` is stored as
    /// a symlink followed by the contents of its target; symlinks found
    /// inside the tree are not followed. If `path` is not a directory this is
    /// the same as
    /// [`append_file_with_name`](Archive::append_file_with_name).
    ///
    /// The cancellation token is polled before each child. Entries appended
    /// before an error stay in the archive.
    pub fn append_tree_with_name<P, Q>(&mut self, path: P, name: Q) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (real, save) = names(path.as_ref(), Some(name.as_ref()))?;
        self.append_dir_all(&real, &save)
    }

    fn append_dir_all(&mut self, real: &Path, save: &[u8]) -> Result<()> {
        self.append_fs(real, save)?;

        // Listing follows a symlink given as the root; children are only
        // ever lstat'ed.
        let dir = match read_dir(real) {
            Ok(dir) => dir,
            Err(Error::NotADirectory(path)) => {
                log::debug!("`{}` is not a directory, appended as a file", path.display());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for entry in dir {
            self.cancel.check()?;
            let entry = entry.map_err(|e| Error::io_at("read directory", real, e))?;
            let file_name = entry.file_name();
            let child = real.join(&file_name);
            let mut child_save = save.to_vec();
            child_save.push(b'/');
            child_save.extend_from_slice(&path_bytes(Path::new(&file_name))?);

            let file_type = entry
                .file_type()
                .map_err(|e| Error::io_at("stat", &child, e))?;
            if file_type.is_dir() {
                self.append_dir_all(&child, &child_save)?;
            } else {
                self.append_fs(&child, &child_save)?;
            }
        }
        Ok(())
    }

    fn append_fs(&mut self, real: &Path, save: &[u8]) -> Result<()> {
        self.writer()?;
        let stat = fs::symlink_metadata(real).map_err(|e| Error::io_at("stat", real, e))?;

        let link_name = if stat.file_type().is_symlink() {
            Some(fs::read_link(real).map_err(|e| Error::io_at("read link", real, e))?)
        } else {
            None
        };
        let mut header = EntryHeader::from_metadata(save, &stat, link_name.as_deref())
            .map_err(|e| Error::format(format!("cannot describe `{}`: {}", real.display(), e)))?;
        if let EntryType::Other(_) = header.entry_type() {
            return Err(Error::io_at("archive", real, other("path has unknown file type")));
        }

        // Nothing may reach the archive before the data is known to be
        // readable, or a failed open leaves a header without its payload.
        let mut file = if header.entry_type().has_payload() {
            Some(fs::File::open(real).map_err(|e| Error::io_at("open", real, e))?)
        } else {
            None
        };
        if let Some(first) = self.check_for_hard_link(save, &stat) {
            header.set_entry_type(EntryType::hard_link());
            header.set_link_name(&first);
            file = None;
        }

        let options = self.options;
        let w = self.writer()?;
        gnu::write_header(w, &header, options)?;
        if let Some(mut file) = file {
            let size = header.size();
            let n = io::copy(&mut (&mut file).take(size), w)
                .map_err(|e| Error::io_at("archive contents of", real, e))?;
            if n != size {
                return Err(Error::io_at(
                    "archive contents of",
                    real,
                    other("file shrank while being archived"),
                ));
            }
            gnu::pad(w, size).map_err(|e| Error::io("failed to write archive padding", e))?;
        }

        log::debug!(
            "appended `{}` as `{}` ({:?}, {} bytes)",
            real.display(),
            String::from_utf8_lossy(save),
            header.entry_type(),
            header.size()
        );
        if options.contains(Options::VERBOSE) {
            let stdout = io::stdout();
            list::print_long_ls(&mut stdout.lock(), &header)
                .map_err(|e| Error::io("failed to print listing", e))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn check_for_hard_link(&mut self, save: &[u8], meta: &fs::Metadata) -> Option<Vec<u8>> {
        if meta.file_type().is_dir() || meta.nlink() <= 1 {
            return None;
        }
        match self.inodes.entry((meta.dev(), meta.ino())) {
            // The file has been written before. Set the current file as hard
            // link.
            hash_map::Entry::Occupied(o) => Some(o.get().clone()),
            hash_map::Entry::Vacant(v) => {
                v.insert(save.to_vec());
                None
            }
        }
    }

    #[cfg(windows)]
    fn check_for_hard_link(&mut self, _save: &[u8], _meta: &fs::Metadata) -> Option<Vec<u8>> {
        None
    }
}

// Resolves the on-disk path and the recorded name, each with one trailing
// separator removed.
fn names(real: &Path, save: Option<&Path>) -> Result<(PathBuf, Vec<u8>)> {
    let real_bytes = path_bytes(real)?;
    let real_bytes = strip_sep(&real_bytes);
    let save = match save {
        Some(save) => strip_sep(&path_bytes(save)?).to_vec(),
        None => real_bytes.to_vec(),
    };
    let real = bytes2path(Cow::Borrowed(real_bytes))
        .map_err(|e| Error::format(format!("invalid path: {}", e)))?
        .into_owned();
    Ok((real, save))
}

fn path_bytes(path: &Path) -> Result<Cow<[u8]>> {
    path2bytes(path).map_err(|e| Error::format(format!("invalid path: {}", e)))
}

fn strip_sep(bytes: &[u8]) -> &[u8] {
    match bytes.split_last() {
        Some((b'/', rest)) | Some((b'\\', rest)) if !rest.is_empty() => rest,
        _ => bytes,
    }
}

fn read_dir(path: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(path).map_err(|e| {
        if is_not_a_directory(&e) {
            Error::NotADirectory(path.to_path_buf())
        } else {
            Error::io_at("read directory", path, e)
        }
    })
}

#[cfg(unix)]
fn is_not_a_directory(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(windows)]
fn is_not_a_directory(e: &io::Error) -> bool {
    // ERROR_DIRECTORY
    e.raw_os_error() == Some(267)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_trailing_separator_is_stripped() {
        assert_eq!(strip_sep(b"dir/"), b"dir");
        assert_eq!(strip_sep(b"dir\\"), b"dir");
        assert_eq!(strip_sep(b"dir//"), b"dir/");
        assert_eq!(strip_sep(b"dir"), b"dir");
        assert_eq!(strip_sep(b"/"), b"/");
        assert_eq!(strip_sep(b""), b"");
    }

    #[test]
    fn saved_name_defaults_to_path() {
        let (real, save) = names(Path::new("a/b/"), None).unwrap();
        assert_eq!(real, Path::new("a/b"));
        assert_eq!(save, b"a/b");

        let (_, save) = names(Path::new("a/b"), Some(Path::new("c/"))).unwrap();
        assert_eq!(save, b"c");
    }
}
