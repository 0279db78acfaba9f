use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::header::{bytes2path, path2bytes};
use crate::{gnu, glob, list};
use crate::{Backend, CancelToken, Compression, EntryHeader, EntryType, Mode, Options};

macro_rules! try_iter {
    ($me:expr, $e:expr) => {
        match $e {
            Ok(e) => e,
            Err(e) => {
                $me.done = true;
                return Some(Err(e));
            }
        }
    };
}

/// Permission bits given to archives created by [`Archive::open`] and
/// friends.
pub const DEFAULT_PERMISSIONS: u32 = 0o644;

/// A handle to one archive, opened either for reading or for writing.
///
/// In read mode the handle walks the archive one entry at a time; the entry
/// most recently returned by [`next_entry`](Archive::next_entry) is the
/// *current* entry, which can be inspected, extracted or skipped. Payload
/// the caller never asked for is skipped automatically before the next
/// header is read.
///
/// In write mode entries are appended with
/// [`append_file`](Archive::append_file) and
/// [`append_tree`](Archive::append_tree); [`close`](Archive::close) writes
/// the end of archive marker.
pub struct Archive {
    pub(crate) path: PathBuf,
    pub(crate) mode: Mode,
    pub(crate) options: Options,
    pub(crate) backend: Option<Backend>,
    pub(crate) cancel: CancelToken,

    // Iteration state. `consumed` is true when the payload of `current`
    // (if any) no longer sits in front of the stream.
    pub(crate) current: Option<EntryHeader>,
    pub(crate) consumed: bool,
    pub(crate) done: bool,

    // archive path -> location on disk, for hard links between extracted
    // entries
    pub(crate) extracted: HashMap<Vec<u8>, PathBuf>,
    // (device, inode) -> saved name, for hard links between appended files
    pub(crate) inodes: HashMap<(u64, u64), Vec<u8>>,
}

/// An iterator over the entries of an archive.
///
/// Created by [`Archive::entries`]. Each step skips whatever payload of the
/// previous entry was not consumed, and iteration stops for good after the
/// end of the archive or the first error.
pub struct Entries<'a> {
    archive: &'a mut Archive,
    done: bool,
}

impl Archive {
    /// Opens a plain, uncompressed archive.
    ///
    /// Archives created in [`Mode::Write`] get permission bits `0o644`.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode, options: Options) -> Result<Archive> {
        Archive::open_with(path, mode, Compression::None, DEFAULT_PERMISSIONS, options)
    }

    /// Opens a gzip compressed archive.
    pub fn gzopen<P: AsRef<Path>>(path: P, mode: Mode, options: Options) -> Result<Archive> {
        Archive::open_with(path, mode, Compression::Gzip, DEFAULT_PERMISSIONS, options)
    }

    /// Opens a bzip2 compressed archive.
    pub fn bzopen<P: AsRef<Path>>(path: P, mode: Mode, options: Options) -> Result<Archive> {
        Archive::open_with(path, mode, Compression::Bzip2, DEFAULT_PERMISSIONS, options)
    }

    /// Opens an archive with every parameter spelled out.
    ///
    /// `perms` are the permission bits of the file created in
    /// [`Mode::Write`]; they are ignored when reading.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tarstream::{Archive, Compression, Mode, Options};
    ///
    /// let path = "backup.tgz";
    /// let ar = Archive::open_with(path, Mode::Write, Compression::from_path(path),
    ///                             0o600, Options::GNU).unwrap();
    /// ```
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: Mode,
        compression: Compression,
        perms: u32,
        options: Options,
    ) -> Result<Archive> {
        let path = path.as_ref();
        let backend = Backend::open(path, compression, mode, perms)?;
        Ok(Archive {
            path: path.to_path_buf(),
            mode: mode,
            options: options,
            backend: Some(backend),
            cancel: CancelToken::new(),
            current: None,
            consumed: true,
            done: false,
            extracted: HashMap::new(),
            inodes: HashMap::new(),
        })
    }

    /// Finishes the archive and releases the underlying file.
    ///
    /// For archives opened for writing this appends the two zero blocks
    /// marking the end of the archive and flushes any compressed stream.
    /// Every later operation on this handle, including a second `close`,
    /// fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let mut backend = self.backend.take().ok_or(Error::Closed)?;
        self.current = None;
        self.consumed = true;
        self.done = true;
        let res = (|| {
            if self.mode == Mode::Write {
                backend.write_all(&[0; 1024])?;
            }
            backend.close()
        })();
        log::debug!("closed archive `{}`", self.path.display());
        res.map_err(|e| Error::io_at("finish archive", &self.path, e))
    }

    /// Returns the path this archive was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the direction this archive was opened in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the options this archive was opened with.
    pub fn options(&self) -> Options {
        self.options
    }

    /// Returns whether [`close`](Archive::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Returns the cancellation token polled by long running operations on
    /// this handle. Clone it and hand it to whoever should be able to
    /// interrupt them.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Replaces the cancellation token polled by this handle, for example to
    /// share one token between several archives.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub(crate) fn reader(&mut self) -> Result<&mut Backend> {
        match self.backend {
            None => Err(Error::Closed),
            Some(_) if self.mode != Mode::Read => Err(Error::WrongMode(Mode::Read)),
            Some(ref mut backend) => Ok(backend),
        }
    }

    pub(crate) fn writer(&mut self) -> Result<&mut Backend> {
        match self.backend {
            None => Err(Error::Closed),
            Some(_) if self.mode != Mode::Write => Err(Error::WrongMode(Mode::Write)),
            Some(ref mut backend) => Ok(backend),
        }
    }

    /// Advances to the next entry and returns its header, or `None` at the
    /// end of the archive.
    ///
    /// If the payload of the previous entry was neither extracted nor
    /// skipped it is skipped now. Once the end of the archive has been seen,
    /// or an error left the stream in an unknown position, every further
    /// call returns `Ok(None)`.
    ///
    /// Fails with [`Error::Interrupted`] without touching the stream if the
    /// cancellation token was set.
    pub fn next_entry(&mut self) -> Result<Option<&EntryHeader>> {
        self.reader()?;
        if self.done {
            return Ok(None);
        }
        self.cancel.check()?;

        let res = self.advance();
        match res {
            Ok(Some(header)) => {
                self.current = Some(header);
                self.consumed = false;
                Ok(self.current.as_ref())
            }
            Ok(None) => {
                log::debug!("end of archive `{}`", self.path.display());
                self.current = None;
                self.consumed = true;
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<EntryHeader>> {
        if !self.consumed {
            let size = self.current.as_ref().map(|h| h.size()).unwrap_or(0);
            log::trace!("skipping {} unread bytes", size);
            gnu::skip(self.reader()?, size + gnu::padding(size))?;
            self.consumed = true;
        }
        let options = self.options;
        gnu::read_header(self.reader()?, options)
    }

    /// Returns an iterator over the remaining entries of this archive.
    ///
    /// The iterator yields copies of each header; use
    /// [`for_each_entry`](Archive::for_each_entry) to extract entries while
    /// walking the archive.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries {
            archive: self,
            done: false,
        }
    }

    /// Calls `f` once for each remaining entry, with the entry current.
    ///
    /// The callback may extract, skip or inspect the current entry through
    /// the handle it is given. The walk stops at the end of the archive or
    /// at the first error, returned either by the callback or by iteration.
    ///
    /// ```no_run
    /// use tarstream::{Archive, Mode, Options};
    ///
    /// # fn main() -> tarstream::Result<()> {
    /// let mut ar = Archive::open("foo.tar", Mode::Read, Options::empty())?;
    /// let mut total = 0;
    /// ar.for_each_entry(|ar| {
    ///     total += ar.header()?.size();
    ///     Ok(())
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn for_each_entry<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Archive) -> Result<()>,
    {
        while self.next_entry()?.is_some() {
            f(self)?;
        }
        Ok(())
    }

    /// Returns the header of the current entry.
    pub fn header(&self) -> Result<&EntryHeader> {
        if self.backend.is_none() {
            return Err(Error::Closed);
        }
        self.current.as_ref().ok_or(Error::NoCurrentEntry)
    }

    /// Returns the pathname of the current entry.
    pub fn entry_path(&self) -> Result<Cow<Path>> {
        let header = self.header()?;
        header
            .path()
            .map_err(|e| Error::format(format!("invalid path in entry header: {}", e)))
    }

    /// Returns the link target of the current entry, if it has one.
    pub fn link_name(&self) -> Result<Option<Cow<Path>>> {
        let header = self.header()?;
        header
            .link_name()
            .map_err(|e| Error::format(format!("invalid link name in entry header: {}", e)))
    }

    /// Returns the type of the current entry.
    pub fn entry_type(&self) -> Result<EntryType> {
        Ok(self.header()?.entry_type())
    }

    /// Returns the payload size of the current entry.
    pub fn size(&self) -> Result<u64> {
        Ok(self.header()?.size())
    }

    /// Returns the permission bits of the current entry.
    pub fn entry_mode(&self) -> Result<u32> {
        Ok(self.header()?.mode())
    }

    /// Returns the owner's user id of the current entry.
    pub fn uid(&self) -> Result<u64> {
        Ok(self.header()?.uid())
    }

    /// Returns the owner's group id of the current entry.
    pub fn gid(&self) -> Result<u64> {
        Ok(self.header()?.gid())
    }

    /// Returns the modification time of the current entry, in seconds since
    /// the Unix epoch.
    pub fn mtime(&self) -> Result<u64> {
        Ok(self.header()?.mtime())
    }

    /// Returns the device major number of the current entry.
    pub fn device_major(&self) -> Result<u32> {
        Ok(self.header()?.device_major())
    }

    /// Returns the device minor number of the current entry.
    pub fn device_minor(&self) -> Result<u32> {
        Ok(self.header()?.device_minor())
    }

    /// Returns the header checksum recorded for the current entry.
    pub fn cksum(&self) -> Result<u32> {
        Ok(self.header()?.cksum())
    }

    /// Returns whether the current entry is a regular file.
    pub fn is_file(&self) -> Result<bool> {
        Ok(self.header()?.is_file())
    }

    /// Returns whether the current entry is a hard link.
    pub fn is_hard_link(&self) -> Result<bool> {
        Ok(self.header()?.is_hard_link())
    }

    /// Returns whether the current entry is a symlink.
    pub fn is_symlink(&self) -> Result<bool> {
        Ok(self.header()?.is_symlink())
    }

    /// Returns whether the current entry is a character device.
    pub fn is_character_special(&self) -> Result<bool> {
        Ok(self.header()?.is_character_special())
    }

    /// Returns whether the current entry is a block device.
    pub fn is_block_special(&self) -> Result<bool> {
        Ok(self.header()?.is_block_special())
    }

    /// Returns whether the current entry is a directory.
    pub fn is_dir(&self) -> Result<bool> {
        Ok(self.header()?.is_dir())
    }

    /// Returns whether the current entry is a FIFO.
    pub fn is_fifo(&self) -> Result<bool> {
        Ok(self.header()?.is_fifo())
    }

    /// Writes the `ls -l` style listing line of the current entry to `w`.
    pub fn print_long_ls<W: Write>(&self, w: &mut W) -> Result<()> {
        list::print_long_ls(w, self.header()?).map_err(|e| Error::io("failed to print listing", e))
    }

    /// Writes every field of the current entry's header to `w`.
    pub fn print<W: Write>(&self, w: &mut W) -> Result<()> {
        list::print_header(w, self.header()?).map_err(|e| Error::io("failed to print header", e))
    }

    /// Extracts every remaining entry of the archive.
    ///
    /// Each entry is written to `prefix/pathname`, or to its pathname
    /// relative to the working directory if no prefix is given. The prefix
    /// is joined with a `/` as is, so a pathname starting with `/` still
    /// ends up below the prefix. Stops at the first error, leaving entries
    /// already extracted in place.
    pub fn extract_all(&mut self, prefix: Option<&Path>) -> Result<()> {
        self.extract_matching(None, prefix)
    }

    /// Extracts the remaining entries whose pathname matches `pattern`.
    ///
    /// `pattern` is a shell wildcard pattern in which wildcards do not match
    /// `/` and a leading `.` of a path component must be matched explicitly.
    /// Entries that do not match are skipped. Destinations are composed as in
    /// [`extract_all`](Archive::extract_all).
    pub fn extract_glob(&mut self, pattern: &str, prefix: Option<&Path>) -> Result<()> {
        self.extract_matching(Some(pattern), prefix)
    }

    fn extract_matching(&mut self, pattern: Option<&str>, prefix: Option<&Path>) -> Result<()> {
        while self.next_entry()?.is_some() {
            let header = self.header()?.clone();
            if let Some(pattern) = pattern {
                if !glob::matches(pattern, header.path_bytes()) {
                    if header.entry_type().has_payload() {
                        self.skip_current()?;
                    }
                    continue;
                }
            }

            if self.options.contains(Options::VERBOSE) {
                let stdout = io::stdout();
                list::print_long_ls(&mut stdout.lock(), &header)
                    .map_err(|e| Error::io("failed to print listing", e))?;
            }

            let dst = destination(prefix, header.path_bytes())?;
            self.extract_current(&dst)?;
        }
        Ok(())
    }
}

fn destination(prefix: Option<&Path>, name: &[u8]) -> Result<PathBuf> {
    let bytes = match prefix {
        Some(prefix) => {
            let mut bytes = path2bytes(prefix)
                .map_err(|e| Error::format(format!("invalid extraction prefix: {}", e)))?
                .into_owned();
            bytes.push(b'/');
            bytes.extend_from_slice(name);
            bytes
        }
        None => name.to_vec(),
    };
    bytes2path(Cow::Owned(bytes))
        .map(|p| p.into_owned())
        .map_err(|e| Error::format(format!("invalid path in entry header: {}", e)))
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.mode == Mode::Write && self.backend.is_some() {
            let _ = self.close();
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<EntryHeader>;

    fn next(&mut self) -> Option<Result<EntryHeader>> {
        if self.done {
            return None;
        }
        match try_iter!(self, self.archive.next_entry()) {
            Some(header) => Some(Ok(header.clone())),
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_joined_verbatim() {
        let p = destination(Some(Path::new("out")), b"/etc/passwd").unwrap();
        assert_eq!(p, Path::new("out//etc/passwd"));
        let p = destination(Some(Path::new("out")), b"").unwrap();
        assert_eq!(p, Path::new("out/"));
        let p = destination(None, b"a/b").unwrap();
        assert_eq!(p, Path::new("a/b"));
    }
}
