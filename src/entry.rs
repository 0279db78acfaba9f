use std::borrow::Cow;
use std::cmp;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use filetime::{self, FileTime};

use crate::error::{Error, Result};
use crate::{gnu, other};
use crate::{Archive, Backend, EntryHeader, Options};

impl Archive {
    /// Writes the current entry to `dst`.
    ///
    /// Regular files (and entries of unknown type, which are treated as
    /// regular files) are created with their payload copied in. Directories,
    /// links, symlinks, devices and FIFOs are recreated as the corresponding
    /// filesystem object. Missing parent directories of `dst` are created.
    ///
    /// Permissions, modification time and, when running as root, ownership
    /// are restored on a best-effort basis: failures are logged and
    /// otherwise ignored.
    ///
    /// Fails with [`Error::OverwriteRefused`] if `Options::NO_OVERWRITE` is
    /// set and something already exists at `dst`. A cancelled or failed
    /// extraction may leave a partially written file behind.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tarstream::{Archive, Mode, Options};
    ///
    /// # fn main() -> tarstream::Result<()> {
    /// let mut ar = Archive::open("foo.tar", Mode::Read, Options::empty())?;
    /// let mut i = 0;
    /// while ar.next_entry()?.is_some() {
    ///     if ar.is_file()? {
    ///         ar.extract_current(format!("file-{}", i))?;
    ///         i += 1;
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn extract_current<P: AsRef<Path>>(&mut self, dst: P) -> Result<()> {
        self.extract_current_to_path(dst.as_ref())
    }

    fn extract_current_to_path(&mut self, dst: &Path) -> Result<()> {
        let header = self.header()?.clone();
        self.reader()?;
        if header.entry_type().has_payload() && self.consumed {
            return Err(Error::PayloadConsumed);
        }

        if self.options.contains(Options::NO_OVERWRITE) && fs::symlink_metadata(dst).is_ok() {
            return Err(Error::OverwriteRefused(dst.to_path_buf()));
        }

        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::io_at("create", parent, e))?;
            }
        }

        log::debug!(
            "extracting `{}` to `{}`",
            String::from_utf8_lossy(header.path_bytes()),
            dst.display()
        );
        let kind = header.entry_type();
        let file = if kind.is_dir() {
            // If the directory already exists just let it slide
            fs::create_dir_all(dst).map_err(|e| Error::io_at("create directory", dst, e))?;
            None
        } else if kind.is_hard_link() || kind.is_symlink() {
            let src = match self.extracted.get(header.link_name_bytes()) {
                Some(path) if kind.is_hard_link() => Cow::Owned(path.clone()),
                _ => link_target(&header)?,
            };
            remove_existing(dst)?;
            let res = if kind.is_hard_link() {
                fs::hard_link(&src, dst)
            } else {
                symlink(&src, dst)
            };
            res.map_err(|e| {
                Error::io(
                    format!("failed to link `{}` to `{}`", dst.display(), src.display()),
                    e,
                )
            })?;
            None
        } else if kind.is_character_special() || kind.is_block_special() || kind.is_fifo() {
            remove_existing(dst)?;
            make_special(dst, &header).map_err(|e| Error::io_at("create node", dst, e))?;
            None
        } else {
            // Note the lack of a type check here: a POSIX-compliant
            // implementation must treat any unrecognized typeflag value as a
            // regular file.
            remove_existing(dst)?;
            let mut file = fs::File::create(dst).map_err(|e| Error::io_at("create", dst, e))?;
            self.copy_payload(&mut file)?;
            Some(file)
        };
        self.consumed = true;

        self.extracted
            .insert(header.path_bytes().to_vec(), dst.to_path_buf());
        if !kind.is_hard_link() && !kind.is_symlink() {
            restore_metadata(dst, file.as_ref(), &header);
        }
        Ok(())
    }

    /// Copies the payload of the current entry into `sink`.
    ///
    /// Returns the number of bytes written, or `None` if the current entry
    /// carries no payload (directories, links, devices, FIFOs).
    pub fn extract_current_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<Option<u64>> {
        let header = self.header()?;
        if !header.entry_type().has_payload() {
            self.reader()?;
            self.consumed = true;
            return Ok(None);
        }
        if self.consumed {
            self.reader()?;
            return Err(Error::PayloadConsumed);
        }
        self.copy_payload(sink).map(Some)
    }

    /// Reads the payload of the current entry into memory.
    ///
    /// Returns `None` if the current entry carries no payload.
    pub fn extract_current_to_buffer(&mut self) -> Result<Option<Vec<u8>>> {
        // Preallocate some data but don't let ourselves get too crazy now.
        let cap = cmp::min(self.header()?.size(), 128 * 1024);
        let mut v = Vec::with_capacity(cap as usize);
        Ok(self.extract_current_to(&mut v)?.map(|_| v))
    }

    /// Discards the payload of the current entry.
    ///
    /// Does nothing if the payload was already consumed or the entry has
    /// none.
    pub fn skip_current(&mut self) -> Result<()> {
        let size = self.header()?.size();
        if self.consumed {
            self.reader()?;
            return Ok(());
        }
        log::trace!("skipping {} bytes of entry data", size);
        let res = gnu::skip(self.reader()?, size + gnu::padding(size));
        self.settle(res)
    }

    fn copy_payload<W: Write + ?Sized>(&mut self, dst: &mut W) -> Result<u64> {
        let size = self.header()?.size();
        let res = copy_exact(self.reader()?, dst, size);
        self.settle(res).map(|()| size)
    }

    // After touching the payload the stream is either aligned on the next
    // header or in an unknown position.
    fn settle(&mut self, res: Result<()>) -> Result<()> {
        match res {
            Ok(()) => {
                self.consumed = true;
                Ok(())
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}

fn copy_exact<W: Write + ?Sized>(src: &mut Backend, dst: &mut W, size: u64) -> Result<()> {
    let n = io::copy(&mut Read::by_ref(src).take(size), dst)
        .map_err(|e| Error::io("failed to copy entry data", e))?;
    if n != size {
        return Err(Error::format("unexpected EOF in entry data"));
    }
    gnu::skip(src, gnu::padding(size))
}

fn link_target(header: &EntryHeader) -> Result<Cow<'_, Path>> {
    match header.link_name() {
        Ok(Some(name)) => Ok(name),
        Ok(None) => Err(Error::format(format!(
            "link `{}` listed but no link name found",
            String::from_utf8_lossy(header.path_bytes())
        ))),
        Err(e) => Err(Error::format(format!("invalid link name in entry header: {}", e))),
    }
}

fn remove_existing(dst: &Path) -> Result<()> {
    match fs::symlink_metadata(dst) {
        Ok(ref m) if !m.is_dir() => {
            fs::remove_file(dst).map_err(|e| Error::io_at("remove existing", dst, e))
        }
        _ => Ok(()),
    }
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    ::std::os::windows::fs::symlink_file(src, dst)
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    ::std::os::unix::fs::symlink(src, dst)
}

#[cfg(unix)]
fn make_special(dst: &Path, header: &EntryHeader) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::prelude::*;

    let path = CString::new(dst.as_os_str().as_bytes())
        .map_err(|_| other("path contains a nul byte"))?;
    let perm = header.mode() as libc::mode_t & 0o7777;
    let ret = if header.is_fifo() {
        unsafe { libc::mkfifo(path.as_ptr(), perm) }
    } else {
        let kind = if header.is_block_special() {
            libc::S_IFBLK
        } else {
            libc::S_IFCHR
        };
        let dev = libc::makedev(header.device_major() as _, header.device_minor() as _);
        unsafe { libc::mknod(path.as_ptr(), kind | perm, dev) }
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn make_special(_dst: &Path, header: &EntryHeader) -> io::Result<()> {
    Err(other(&format!(
        "cannot create {:?} entries on this platform",
        header.entry_type()
    )))
}

// Ownership, mtime and permissions; none of these failing aborts extraction.
//
// Times of anything but regular files are set without opening the path: an
// open on a FIFO blocks until a writer shows up and an open on a device may
// talk to the driver.
fn restore_metadata(dst: &Path, file: Option<&fs::File>, header: &EntryHeader) {
    set_ownership(dst, header);

    let mtime = FileTime::from_unix_time(header.mtime() as i64, 0);
    let res = match file {
        Some(file) => filetime::set_file_handle_times(file, Some(mtime), Some(mtime)),
        None => filetime::set_symlink_file_times(dst, mtime, mtime),
    };
    if let Err(e) = res {
        log::warn!("failed to set mtime for `{}`: {}", dst.display(), e);
    }

    let mode = header.mode();
    if let Err(e) = set_perms(dst, mode) {
        log::warn!(
            "failed to set permissions to {:o} for `{}`: {}",
            mode,
            dst.display(),
            e
        );
    }
}

#[cfg(unix)]
fn set_ownership(dst: &Path, header: &EntryHeader) {
    use std::ffi::CString;
    use std::os::unix::prelude::*;

    if unsafe { libc::geteuid() } != 0 {
        return;
    }
    let path = match CString::new(dst.as_os_str().as_bytes()) {
        Ok(path) => path,
        Err(_) => return,
    };
    let ret = unsafe {
        libc::lchown(
            path.as_ptr(),
            header.uid() as libc::uid_t,
            header.gid() as libc::gid_t,
        )
    };
    if ret != 0 {
        log::warn!(
            "failed to set ownership of `{}`: {}",
            dst.display(),
            io::Error::last_os_error()
        );
    }
}

#[cfg(windows)]
fn set_ownership(_dst: &Path, _header: &EntryHeader) {}

#[cfg(unix)]
fn set_perms(dst: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::prelude::*;

    let perm = fs::Permissions::from_mode(mode & 0o7777);
    fs::set_permissions(dst, perm)
}

#[cfg(windows)]
fn set_perms(dst: &Path, mode: u32) -> io::Result<()> {
    let mut perm = fs::metadata(dst)?.permissions();
    perm.set_readonly(mode & 0o200 != 0o200);
    fs::set_permissions(dst, perm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryType;

    #[test]
    fn link_without_target_is_rejected() {
        let header = EntryHeader::new(b"a", EntryType::symlink());
        assert!(link_target(&header).is_err());
    }
}
