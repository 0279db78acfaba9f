#[cfg(unix)]
use std::os::unix::prelude::*;
#[cfg(windows)]
use std::os::windows::prelude::*;

use std::borrow::Cow;
use std::cmp;
use std::fmt;
use std::fs;
use std::io;
use std::iter::repeat;
use std::mem;
use std::path::{Path, PathBuf};
use std::str;

use crate::EntryType;
use crate::{bad_archive, other};

/// Representation of the header block of an entry in an archive
///
/// This is the raw 512-byte ustar layout. Numeric fields are stored as
/// NUL-terminated octal strings, or in GNU base-256 form when the value does
/// not fit.
#[repr(C)]
#[allow(missing_docs)]
pub struct Header {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub owner_id: [u8; 8],
    pub group_id: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub cksum: [u8; 8],
    pub link: [u8; 1],
    pub linkname: [u8; 100],

    // UStar format
    pub ustar: [u8; 6],
    pub ustar_version: [u8; 2],
    pub owner_name: [u8; 32],
    pub group_name: [u8; 32],
    pub dev_major: [u8; 8],
    pub dev_minor: [u8; 8],
    pub prefix: [u8; 155],
    _rest: [u8; 12],
}

/// Name recorded in the header of GNU long name and long link entries.
pub const GNU_LONGLINK_NAME: &[u8] = b"././@LongLink";

impl Header {
    /// Creates a new blank ustar header ready to be filled in
    pub fn new() -> Header {
        // SAFETY: every field is a byte array, for which all zeroes is valid.
        let mut header: Header = unsafe { mem::zeroed() };
        // Flag this header as a UStar archive
        header.ustar = *b"ustar\0";
        header.ustar_version = *b"00";
        header
    }

    /// Creates a header from a raw block read off an archive.
    pub fn from_bytes(bytes: &[u8; 512]) -> Header {
        let mut header = Header::new();
        header.as_mut_bytes().copy_from_slice(bytes);
        header
    }

    fn is_ustar(&self) -> bool {
        &self.ustar[..5] == b"ustar"
    }

    /// Returns a view into this header as a byte array.
    pub fn as_bytes(&self) -> &[u8; 512] {
        debug_assert_eq!(512, mem::size_of_val(self));
        // SAFETY: `Header` is `repr(C)`, 512 bytes long and made of byte
        // arrays only, so it has no padding.
        unsafe { &*(self as *const _ as *const [u8; 512]) }
    }

    /// Returns a mutable view into this header as a byte array.
    pub fn as_mut_bytes(&mut self) -> &mut [u8; 512] {
        debug_assert_eq!(512, mem::size_of_val(self));
        // SAFETY: see `as_bytes`.
        unsafe { &mut *(self as *mut _ as *mut [u8; 512]) }
    }

    /// Returns whether every byte of this block is zero, as in the blocks
    /// marking the end of an archive.
    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|b| *b == 0)
    }

    /// Returns the file size this header represents.
    ///
    /// May return an error if the field is corrupted.
    pub fn size(&self) -> io::Result<u64> {
        num_field_from(&self.size)
    }

    /// Encodes the `size` argument into the size field of this header.
    pub fn set_size(&mut self, size: u64) {
        num_field_into(&mut self.size, size)
    }

    /// Returns the pathname stored in this header as a byte array.
    ///
    /// When the ustar prefix field is in use the result is
    /// `prefix + "/" + name`. Any `\` characters are converted to `/`.
    pub fn path_bytes(&self) -> Cow<[u8]> {
        if (!self.is_ustar() || self.prefix[0] == 0) && !self.name.contains(&b'\\') {
            Cow::Borrowed(truncate(&self.name))
        } else {
            let mut bytes = Vec::new();
            let prefix = truncate(&self.prefix);
            if self.is_ustar() && !prefix.is_empty() {
                bytes.extend(prefix.iter().map(noslash));
                bytes.push(b'/');
            }
            bytes.extend(truncate(&self.name).iter().map(noslash));
            Cow::Owned(bytes)
        }
    }

    /// Sets the path name for this header.
    ///
    /// Names longer than the `name` field are split at a `/` into the ustar
    /// `prefix` and `name` fields. Fails if no such split exists or if the
    /// name contains a nul byte.
    pub fn set_path_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let (namelen, prefixlen) = (self.name.len(), self.prefix.len());
        if bytes.len() <= namelen {
            copy_into(&mut self.name, bytes, true)?;
        } else {
            let prefix = &bytes[..cmp::min(bytes.len(), prefixlen + 1)];
            let pos = match prefix.iter().rposition(|&b| b == b'/' || b == b'\\') {
                Some(i) if bytes.len() - i - 1 <= namelen && i <= prefixlen => i,
                _ => return Err(other("path cannot be split to be inserted into archive")),
            };
            copy_into(&mut self.name, &bytes[pos + 1..], true)?;
            copy_into(&mut self.prefix, &bytes[..pos], true)?;
        }
        Ok(())
    }

    /// Returns the link name stored in this header as a byte array, if any.
    pub fn link_name_bytes(&self) -> Option<Cow<[u8]>> {
        if self.linkname[0] == 0 {
            None
        } else {
            Some(deslash(&self.linkname))
        }
    }

    /// Sets the link name for this header.
    ///
    /// Fails if the name does not fit the field or contains a nul byte.
    pub fn set_link_name_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        copy_into(&mut self.linkname, bytes, true)
    }

    /// Returns the mode bits for this file
    ///
    /// May return an error if the field is corrupted.
    pub fn mode(&self) -> io::Result<u32> {
        num_field_from(&self.mode).map(|u| u as u32)
    }

    /// Encodes the `mode` provided into this header.
    pub fn set_mode(&mut self, mode: u32) {
        num_field_into(&mut self.mode, mode & 0o7777);
    }

    /// Returns the value of the owner's user ID field
    ///
    /// May return an error if the field is corrupted.
    pub fn uid(&self) -> io::Result<u64> {
        num_field_from(&self.owner_id)
    }

    /// Encodes the `uid` provided into this header.
    pub fn set_uid(&mut self, uid: u64) {
        num_field_into(&mut self.owner_id, uid);
    }

    /// Returns the value of the group's user ID field
    pub fn gid(&self) -> io::Result<u64> {
        num_field_from(&self.group_id)
    }

    /// Encodes the `gid` provided into this header.
    pub fn set_gid(&mut self, gid: u64) {
        num_field_into(&mut self.group_id, gid);
    }

    /// Returns the last modification time in Unix time format
    pub fn mtime(&self) -> io::Result<u64> {
        num_field_from(&self.mtime)
    }

    /// Encodes the `mtime` provided into this header.
    ///
    /// Note that this time is typically a number of seconds passed since
    /// January 1, 1970.
    pub fn set_mtime(&mut self, mtime: u64) {
        num_field_into(&mut self.mtime, mtime);
    }

    /// Returns the username of the owner of this file, if present
    pub fn username_bytes(&self) -> Option<&[u8]> {
        if self.is_ustar() {
            Some(truncate(&self.owner_name))
        } else {
            None
        }
    }

    /// Sets the username inside this header.
    ///
    /// May return an error if the name provided is too long.
    pub fn set_username(&mut self, name: &[u8]) -> io::Result<()> {
        copy_into(&mut self.owner_name, name, false)
    }

    /// Returns the group name of the owner of this file, if present
    pub fn groupname_bytes(&self) -> Option<&[u8]> {
        if self.is_ustar() {
            Some(truncate(&self.group_name))
        } else {
            None
        }
    }

    /// Sets the group name inside this header.
    ///
    /// May return an error if the name provided is too long.
    pub fn set_groupname(&mut self, name: &[u8]) -> io::Result<()> {
        copy_into(&mut self.group_name, name, false)
    }

    /// Returns the device major number, if present.
    ///
    /// This field is only present in UStar archives. A value of `None` means
    /// that this archive is not a UStar archive, while a value of `Some`
    /// represents the attempt to decode the field in the header.
    pub fn device_major(&self) -> Option<io::Result<u32>> {
        if self.is_ustar() {
            Some(num_field_from(&self.dev_major).map(|u| u as u32))
        } else {
            None
        }
    }

    /// Encodes the value `major` into the dev_major field of this header.
    pub fn set_device_major(&mut self, major: u32) {
        num_field_into(&mut self.dev_major, major);
    }

    /// Returns the device minor number, if present.
    ///
    /// See `device_major` for the meaning of `None`.
    pub fn device_minor(&self) -> Option<io::Result<u32>> {
        if self.is_ustar() {
            Some(num_field_from(&self.dev_minor).map(|u| u as u32))
        } else {
            None
        }
    }

    /// Encodes the value `minor` into the dev_minor field of this header.
    pub fn set_device_minor(&mut self, minor: u32) {
        num_field_into(&mut self.dev_minor, minor);
    }

    /// Returns the type of file described by this header.
    pub fn entry_type(&self) -> EntryType {
        EntryType::new(self.link[0])
    }

    /// Sets the type of file that will be described by this header.
    pub fn set_entry_type(&mut self, ty: EntryType) {
        self.link = [ty.as_byte()];
    }

    /// Returns the checksum field of this header.
    ///
    /// May return an error if the field is corrupted.
    pub fn cksum(&self) -> io::Result<u32> {
        num_field_from(&self.cksum).map(|u| u as u32)
    }

    /// Sets the checksum field of this header based on the current fields in
    /// this header.
    pub fn set_cksum(&mut self) {
        let cksum = self.calculate_cksum();
        // Historically the checksum is six octal digits, a NUL and a space.
        let o = format!("{:06o}", cksum);
        let digits = o.as_bytes();
        let start = digits.len().saturating_sub(6);
        self.cksum[..6].copy_from_slice(&digits[start..]);
        self.cksum[6] = 0;
        self.cksum[7] = b' ';
    }

    /// Computes the checksum of this block, summing every byte as unsigned
    /// with the checksum field itself counted as spaces.
    pub fn calculate_cksum(&self) -> u32 {
        let bytes = self.as_bytes();
        bytes[..148]
            .iter()
            .chain(&bytes[156..])
            .fold(0, |a, b| a + (*b as u32))
            + 8 * 32
    }

    // Some historic implementations summed the bytes as signed chars.
    fn calculate_signed_cksum(&self) -> i64 {
        let bytes = self.as_bytes();
        bytes[..148]
            .iter()
            .chain(&bytes[156..])
            .fold(0, |a, b| a + (*b as i8 as i64))
            + 8 * 32
    }

    /// Returns whether the stored checksum matches the block, accepting both
    /// the unsigned and the signed summation.
    pub fn cksum_ok(&self) -> bool {
        match self.cksum() {
            Ok(sum) => {
                sum == self.calculate_cksum() || sum as i64 == self.calculate_signed_cksum()
            }
            Err(_) => false,
        }
    }

    /// Returns whether the magic field begins with `ustar`.
    pub fn magic_ok(&self) -> bool {
        self.is_ustar()
    }

    /// Returns whether the version field is `00`.
    pub fn version_ok(&self) -> bool {
        &self.ustar_version == b"00"
    }

    /// Blanket sets the metadata in this header from the metadata argument
    /// provided.
    ///
    /// Type, mode, ownership, modification time, size (zero for everything
    /// but regular files) and device numbers are filled in. The metadata is
    /// expected not to follow symlinks.
    pub fn set_metadata(&mut self, meta: &fs::Metadata) {
        self.fill_from(meta);
        self.set_size(if meta.is_file() { meta.len() } else { 0 });
    }

    #[cfg(unix)]
    fn fill_from(&mut self, meta: &fs::Metadata) {
        self.set_mode(meta.mode() & 0o7777);
        self.set_mtime(cmp::max(meta.mtime(), 0) as u64);
        self.set_uid(meta.uid() as u64);
        self.set_gid(meta.gid() as u64);

        let ty = match meta.mode() & libc::S_IFMT as u32 {
            m if m == libc::S_IFREG as u32 => EntryType::file(),
            m if m == libc::S_IFLNK as u32 => EntryType::symlink(),
            m if m == libc::S_IFCHR as u32 => EntryType::character_special(),
            m if m == libc::S_IFBLK as u32 => EntryType::block_special(),
            m if m == libc::S_IFDIR as u32 => EntryType::dir(),
            m if m == libc::S_IFIFO as u32 => EntryType::fifo(),
            _ => EntryType::new(b' '),
        };
        self.set_entry_type(ty);

        if ty.is_character_special() || ty.is_block_special() {
            let dev = meta.rdev();
            self.set_device_major(dev_major(dev));
            self.set_device_minor(dev_minor(dev));
        } else {
            self.set_device_major(0);
            self.set_device_minor(0);
        }
    }

    #[cfg(windows)]
    fn fill_from(&mut self, meta: &fs::Metadata) {
        let readonly = meta.file_attributes() & 0x1;

        // There's no concept of a mode on windows, so do a best approximation
        // here.
        let mode = match (meta.is_dir(), readonly != 0) {
            (true, false) => 0o755,
            (true, true) => 0o555,
            (false, false) => 0o644,
            (false, true) => 0o444,
        };
        self.set_mode(mode);
        self.set_uid(0);
        self.set_gid(0);
        self.set_device_major(0);
        self.set_device_minor(0);

        let ft = meta.file_type();
        self.set_entry_type(if ft.is_dir() {
            EntryType::dir()
        } else if ft.is_file() {
            EntryType::file()
        } else if ft.is_symlink() {
            EntryType::symlink()
        } else {
            EntryType::new(b' ')
        });

        // The dates listed in tarballs are always seconds relative to
        // January 1, 1970. On Windows, however, the timestamps are returned as
        // dates relative to January 1, 1601 (in 100ns intervals), so we need to
        // add in some offset for those dates.
        let mtime = (meta.last_write_time() / (1_000_000_000 / 100)).saturating_sub(11644473600);
        self.set_mtime(mtime);
    }
}

impl Default for Header {
    fn default() -> Header {
        Header::new()
    }
}

impl Clone for Header {
    fn clone(&self) -> Header {
        Header::from_bytes(self.as_bytes())
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Header")
            .field("path", &String::from_utf8_lossy(&self.path_bytes()))
            .field("entry_type", &self.entry_type())
            .field("size", &self.size().ok())
            .field("cksum", &self.cksum().ok())
            .finish()
    }
}

/// The logical header of one archive entry.
///
/// This is what iteration hands out: the block's fields decoded, with any
/// GNU long name or long link extension already folded into the path and
/// link name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    path: Vec<u8>,
    link_name: Vec<u8>,
    entry_type: EntryType,
    size: u64,
    mode: u32,
    uid: u64,
    gid: u64,
    mtime: u64,
    username: Vec<u8>,
    groupname: Vec<u8>,
    dev_major: u32,
    dev_minor: u32,
    cksum: u32,
}

impl EntryHeader {
    /// Creates a header for an entry named `path` of the given type, with
    /// every other field zero.
    pub fn new(path: &[u8], entry_type: EntryType) -> EntryHeader {
        EntryHeader {
            path: path.to_vec(),
            link_name: Vec::new(),
            entry_type: entry_type,
            size: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            username: Vec::new(),
            groupname: Vec::new(),
            dev_major: 0,
            dev_minor: 0,
            cksum: 0,
        }
    }

    /// Decodes a header block, substituting the long name and long link
    /// gathered from preceding GNU extension entries.
    pub fn parse(
        header: &Header,
        long_name: Option<Vec<u8>>,
        long_link: Option<Vec<u8>>,
    ) -> io::Result<EntryHeader> {
        let entry_type = header.entry_type();
        let size = if entry_type.has_payload() {
            header.size()?
        } else {
            0
        };
        let path = match long_name {
            Some(name) => deslash(&name).into_owned(),
            None => header.path_bytes().into_owned(),
        };
        let link_name = match long_link {
            Some(name) => deslash(&name).into_owned(),
            None => header
                .link_name_bytes()
                .map(|l| l.into_owned())
                .unwrap_or_default(),
        };
        let dev_major = match header.device_major() {
            Some(major) if entry_type.is_character_special() || entry_type.is_block_special() => {
                major?
            }
            _ => 0,
        };
        let dev_minor = match header.device_minor() {
            Some(minor) if entry_type.is_character_special() || entry_type.is_block_special() => {
                minor?
            }
            _ => 0,
        };
        Ok(EntryHeader {
            path: path,
            link_name: link_name,
            entry_type: entry_type,
            size: size,
            mode: header.mode()?,
            uid: header.uid()?,
            gid: header.gid()?,
            mtime: header.mtime()?,
            username: header.username_bytes().unwrap_or_default().to_vec(),
            groupname: header.groupname_bytes().unwrap_or_default().to_vec(),
            dev_major: dev_major,
            dev_minor: dev_minor,
            cksum: header.cksum().unwrap_or(0),
        })
    }

    /// Builds the header of an entry named `path` from filesystem metadata.
    ///
    /// The metadata is expected not to follow symlinks; `link_name` is the
    /// symlink target, if any. On Unix the owner's user and group names are
    /// looked up and recorded when they fit the header fields.
    pub fn from_metadata(path: &[u8], meta: &fs::Metadata, link_name: Option<&Path>) -> io::Result<EntryHeader> {
        let mut block = Header::new();
        block.set_metadata(meta);
        let mut header = EntryHeader::parse(&block, Some(path.to_vec()), None)?;
        if let Some(link) = link_name {
            header.link_name = path2bytes(link)?.into_owned();
        }
        header.set_owner_names();
        Ok(header)
    }

    #[cfg(unix)]
    fn set_owner_names(&mut self) {
        use nix::unistd::{Gid, Group, Uid, User};

        match User::from_uid(Uid::from_raw(self.uid as libc::uid_t)) {
            Ok(Some(user)) if user.name.len() <= 32 => self.username = user.name.into_bytes(),
            Ok(_) => {}
            Err(e) => log::debug!("failed to look up user {}: {}", self.uid, e),
        }
        match Group::from_gid(Gid::from_raw(self.gid as libc::gid_t)) {
            Ok(Some(group)) if group.name.len() <= 32 => self.groupname = group.name.into_bytes(),
            Ok(_) => {}
            Err(e) => log::debug!("failed to look up group {}: {}", self.gid, e),
        }
    }

    #[cfg(windows)]
    fn set_owner_names(&mut self) {}

    /// Returns the pathname stored for this entry, as raw bytes.
    pub fn path_bytes(&self) -> &[u8] {
        &self.path
    }

    /// Returns the pathname stored for this entry.
    ///
    /// This method may fail if the pathname is not valid unicode and this is
    /// called on a Windows platform.
    pub fn path(&self) -> io::Result<Cow<Path>> {
        bytes2path(Cow::Borrowed(&self.path))
    }

    /// Returns the link target as raw bytes; empty unless this entry is a
    /// link or symlink.
    pub fn link_name_bytes(&self) -> &[u8] {
        &self.link_name
    }

    /// Returns the link target, or `None` if the entry carries none.
    pub fn link_name(&self) -> io::Result<Option<Cow<Path>>> {
        if self.link_name.is_empty() {
            Ok(None)
        } else {
            bytes2path(Cow::Borrowed(&self.link_name)).map(Some)
        }
    }

    /// Sets the link target of this entry.
    pub fn set_link_name(&mut self, name: &[u8]) {
        self.link_name = name.to_vec();
    }

    /// Returns the type of this entry.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Changes the type of this entry. The size is reset to zero if the new
    /// type carries no payload.
    pub fn set_entry_type(&mut self, entry_type: EntryType) {
        self.entry_type = entry_type;
        if !entry_type.has_payload() {
            self.size = 0;
        }
    }

    /// Returns the payload size in bytes. Always zero for entries which
    /// carry no payload.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Sets the payload size. Ignored for entry types without payload.
    pub fn set_size(&mut self, size: u64) {
        if self.entry_type.has_payload() {
            self.size = size;
        }
    }

    /// Returns the permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Sets the permission bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode & 0o7777;
    }

    /// Returns the owner's user id.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Sets the owner's user id.
    pub fn set_uid(&mut self, uid: u64) {
        self.uid = uid;
    }

    /// Returns the owner's group id.
    pub fn gid(&self) -> u64 {
        self.gid
    }

    /// Sets the owner's group id.
    pub fn set_gid(&mut self, gid: u64) {
        self.gid = gid;
    }

    /// Returns the modification time in seconds since the Unix epoch.
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Sets the modification time in seconds since the Unix epoch.
    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    /// Returns the owner's user name, if the archive recorded one.
    pub fn username(&self) -> Option<&str> {
        str::from_utf8(&self.username).ok().filter(|s| !s.is_empty())
    }

    /// Returns the owner's group name, if the archive recorded one.
    pub fn groupname(&self) -> Option<&str> {
        str::from_utf8(&self.groupname).ok().filter(|s| !s.is_empty())
    }

    /// Returns the device major number; zero unless this is a device entry.
    pub fn device_major(&self) -> u32 {
        self.dev_major
    }

    /// Returns the device minor number; zero unless this is a device entry.
    pub fn device_minor(&self) -> u32 {
        self.dev_minor
    }

    /// Sets the device numbers.
    pub fn set_device(&mut self, major: u32, minor: u32) {
        self.dev_major = major;
        self.dev_minor = minor;
    }

    /// Returns the checksum recorded in the header block.
    pub fn cksum(&self) -> u32 {
        self.cksum
    }

    /// Returns whether this is a regular file.
    pub fn is_file(&self) -> bool {
        self.entry_type.is_file()
    }

    /// Returns whether this is a hard link.
    pub fn is_hard_link(&self) -> bool {
        self.entry_type.is_hard_link()
    }

    /// Returns whether this is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.entry_type.is_symlink()
    }

    /// Returns whether this is a character device.
    pub fn is_character_special(&self) -> bool {
        self.entry_type.is_character_special()
    }

    /// Returns whether this is a block device.
    pub fn is_block_special(&self) -> bool {
        self.entry_type.is_block_special()
    }

    /// Returns whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    /// Returns whether this is a FIFO.
    pub fn is_fifo(&self) -> bool {
        self.entry_type.is_fifo()
    }

    /// Fills a raw header block with every field of this entry except the
    /// path and link name, which need the long name handling in `gnu`.
    pub(crate) fn fill_block(&self, block: &mut Header) -> io::Result<()> {
        block.set_entry_type(self.entry_type);
        block.set_size(self.size);
        block.set_mode(self.mode);
        block.set_uid(self.uid);
        block.set_gid(self.gid);
        block.set_mtime(self.mtime);
        block.set_username(&self.username)?;
        block.set_groupname(&self.groupname)?;
        block.set_device_major(self.dev_major);
        block.set_device_minor(self.dev_minor);
        Ok(())
    }
}

#[cfg(unix)]
fn dev_major(dev: u64) -> u32 {
    (((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff)) as u32
}

#[cfg(unix)]
fn dev_minor(dev: u64) -> u32 {
    (((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff)) as u32
}

fn noslash(b: &u8) -> u8 {
    if *b == b'\\' {
        b'/'
    } else {
        *b
    }
}

pub(crate) fn deslash(bytes: &[u8]) -> Cow<[u8]> {
    if !bytes.contains(&b'\\') {
        Cow::Borrowed(truncate(bytes))
    } else {
        Cow::Owned(truncate(bytes).iter().map(noslash).collect())
    }
}

fn num_field_from(slice: &[u8]) -> io::Result<u64> {
    // GNU base-256: high bit of the first byte set, big endian remainder.
    if slice[0] & 0x80 != 0 {
        let mut n = (slice[0] & 0x7f) as u64;
        for b in &slice[1..] {
            if n > (u64::MAX >> 8) {
                return Err(bad_archive());
            }
            n = (n << 8) | *b as u64;
        }
        return Ok(n);
    }
    octal_from(slice)
}

fn octal_from(slice: &[u8]) -> io::Result<u64> {
    let num = match str::from_utf8(truncate(slice)) {
        Ok(n) => n,
        Err(_) => return Err(bad_archive()),
    };
    let num = num.trim_matches(|c: char| c == ' ' || c == '\0');
    if num.is_empty() {
        return Ok(0);
    }
    match u64::from_str_radix(num, 8) {
        Ok(n) => Ok(n),
        Err(_) => Err(bad_archive()),
    }
}

fn num_field_into<T: Into<u64>>(dst: &mut [u8], val: T) {
    let val = val.into();
    let digits = dst.len() - 1;
    if digits * 3 >= 64 || val < (1u64 << (digits * 3)) {
        octal_into(dst, val);
    } else {
        for (slot, b) in dst.iter_mut().rev().zip(val.to_be_bytes().iter().rev().chain(repeat(&0u8))) {
            *slot = *b;
        }
        dst[0] |= 0x80;
    }
}

fn octal_into<T: fmt::Octal>(dst: &mut [u8], val: T) {
    let o = format!("{:o}", val);
    let value = o.bytes().rev().chain(repeat(b'0'));
    for (slot, value) in dst.iter_mut().rev().skip(1).zip(value) {
        *slot = value;
    }
    if let Some(last) = dst.last_mut() {
        *last = 0;
    }
}

fn truncate(slice: &[u8]) -> &[u8] {
    match slice.iter().position(|i| *i == 0) {
        Some(i) => &slice[..i],
        None => slice,
    }
}

/// Copies `bytes` into the `slot` provided, returning an error if the `bytes`
/// array is too long or if it contains any nul bytes.
///
/// Also provides the option to map '\' characters to '/' characters for the
/// names of paths in archives. The `tar` utility doesn't seem to like windows
/// backslashes when unpacking on Unix.
fn copy_into(slot: &mut [u8], bytes: &[u8], map_slashes: bool) -> io::Result<()> {
    if bytes.len() > slot.len() {
        Err(other("provided value is too long"))
    } else if bytes.iter().any(|b| *b == 0) {
        Err(other("provided value contains a nul byte"))
    } else {
        for (slot, val) in slot.iter_mut().zip(bytes) {
            if map_slashes && *val == b'\\' {
                *slot = b'/';
            } else {
                *slot = *val;
            }
        }
        for slot in slot.iter_mut().skip(bytes.len()) {
            *slot = 0;
        }
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn path2bytes(p: &Path) -> io::Result<Cow<[u8]>> {
    Ok(Cow::Borrowed(p.as_os_str().as_bytes()))
}

#[cfg(windows)]
pub(crate) fn path2bytes(p: &Path) -> io::Result<Cow<[u8]>> {
    p.as_os_str()
        .to_str()
        .map(|s| s.as_bytes())
        .ok_or_else(|| other(&format!("path {} was not valid unicode", p.display())))
        .map(|bytes| {
            if bytes.contains(&b'\\') {
                Cow::Owned(bytes.iter().map(noslash).collect())
            } else {
                Cow::Borrowed(bytes)
            }
        })
}

#[cfg(unix)]
pub(crate) fn bytes2path(bytes: Cow<[u8]>) -> io::Result<Cow<Path>> {
    use std::ffi::{OsStr, OsString};

    Ok(match bytes {
        Cow::Borrowed(bytes) => Cow::Borrowed(Path::new(OsStr::from_bytes(bytes))),
        Cow::Owned(bytes) => Cow::Owned(PathBuf::from(OsString::from_vec(bytes))),
    })
}

#[cfg(windows)]
pub(crate) fn bytes2path(bytes: Cow<[u8]>) -> io::Result<Cow<Path>> {
    return match bytes {
        Cow::Borrowed(bytes) => {
            let s = str::from_utf8(bytes).map_err(|_| not_unicode(bytes))?;
            Ok(Cow::Borrowed(Path::new(s)))
        }
        Cow::Owned(bytes) => {
            let s = String::from_utf8(bytes).map_err(|uerr| not_unicode(&uerr.into_bytes()))?;
            Ok(Cow::Owned(PathBuf::from(s)))
        }
    };

    fn not_unicode(v: &[u8]) -> io::Error {
        other(&format!(
            "only unicode paths are supported on windows: {}",
            String::from_utf8_lossy(v)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_fields() {
        let mut h = Header::new();
        h.set_size(0o1234);
        assert_eq!(&h.size, b"00000001234\0");
        assert_eq!(h.size().unwrap(), 0o1234);

        h.size = *b"     1234  \0";
        assert_eq!(h.size().unwrap(), 0o1234);
    }

    #[test]
    fn base256_sizes() {
        let mut h = Header::new();
        let big = 20 * 1024 * 1024 * 1024u64;
        h.set_size(big);
        assert_eq!(h.size[0] & 0x80, 0x80);
        assert_eq!(h.size().unwrap(), big);
    }

    #[test]
    fn checksum_round_trips() {
        let mut h = Header::new();
        h.set_path_bytes(b"foo").unwrap();
        h.set_entry_type(EntryType::file());
        h.set_cksum();
        assert!(h.cksum_ok());
        assert_eq!(h.cksum().unwrap(), h.calculate_cksum());

        h.name[0] = b'g';
        assert!(!h.cksum_ok());
    }

    #[test]
    fn prefix_split() {
        let mut h = Header::new();
        let long = format!("{}/{}", "a".repeat(120), "b".repeat(50));
        h.set_path_bytes(long.as_bytes()).unwrap();
        assert_eq!(&*h.path_bytes(), long.as_bytes());

        let unsplittable = "c".repeat(130);
        assert!(h.set_path_bytes(unsplittable.as_bytes()).is_err());
    }
}
