//! Reading and writing of logical entry headers.
//!
//! A logical header may span several physical entries: GNU tar stores names
//! which do not fit the 100 byte `name`/`linkname` fields in `././@LongLink`
//! entries of type `L` (path) or `K` (link target) placed directly before the
//! entry they describe. Reading folds those into the following real entry;
//! writing emits them when `Options::GNU` is set.

use std::cmp;
use std::io::prelude::*;
use std::io;

use crate::error::{Error, Result};
use crate::header::GNU_LONGLINK_NAME;
use crate::{EntryHeader, EntryType, Header, Options, BLOCK_SIZE};

// Longest extension payload accepted; protects against absurd size fields.
const MAX_EXTENSION_SIZE: u64 = 1024 * 1024;

/// Reads the next logical header.
///
/// Returns `Ok(None)` at the end of the archive: either the second of two
/// consecutive zero blocks (unless `IGNORE_EOT` is set) or a clean end of the
/// underlying stream at a block boundary.
pub(crate) fn read_header<R: Read>(r: &mut R, options: Options) -> Result<Option<EntryHeader>> {
    let mut long_name = None;
    let mut long_link = None;
    loop {
        let header = match read_block(r, options)? {
            Some(header) => header,
            None if long_name.is_some() || long_link.is_some() => {
                return Err(Error::format("long name entry not followed by another"))
            }
            None => return Ok(None),
        };

        let kind = header.entry_type();
        if kind.is_gnu_longname() || kind.is_gnu_longlink() {
            let data = read_extension(r, &header)?;
            log::trace!(
                "folding GNU {} of {} bytes",
                if kind.is_gnu_longname() { "long name" } else { "long link" },
                data.len()
            );
            if kind.is_gnu_longname() {
                long_name = Some(data);
            } else {
                long_link = Some(data);
            }
            continue;
        }

        let entry = EntryHeader::parse(&header, long_name, long_link)
            .map_err(|e| Error::format(format!("corrupt header field: {}", e)))?;
        log::debug!(
            "read header `{}` ({:?}, {} bytes)",
            String::from_utf8_lossy(entry.path_bytes()),
            entry.entry_type(),
            entry.size()
        );
        return Ok(Some(entry));
    }
}

// Reads one validated, non-zero header block.
fn read_block<R: Read>(r: &mut R, options: Options) -> Result<Option<Header>> {
    let mut zero_blocks = 0;
    loop {
        let mut header = Header::new();
        if !read_all(r, header.as_mut_bytes())? {
            return Ok(None);
        }

        // A block of 0s is never valid as a header (because of the
        // checksum), so it must be one of the end of archive blocks.
        if header.is_zero() {
            zero_blocks += 1;
            if !options.contains(Options::IGNORE_EOT) && zero_blocks >= 2 {
                return Ok(None);
            }
            continue;
        }

        if options.contains(Options::CHECK_MAGIC) && !header.magic_ok() {
            return Err(Error::format("bad magic in archive header"));
        }
        if options.contains(Options::CHECK_VERSION) && !header.version_ok() {
            return Err(Error::format("bad version in archive header"));
        }
        if !options.contains(Options::IGNORE_CRC) && !header.cksum_ok() {
            return Err(Error::format("archive header checksum mismatch"));
        }
        return Ok(Some(header));
    }
}

fn read_extension<R: Read>(r: &mut R, header: &Header) -> Result<Vec<u8>> {
    let size = header
        .size()
        .map_err(|e| Error::format(format!("corrupt long name size: {}", e)))?;
    if size > MAX_EXTENSION_SIZE {
        return Err(Error::format(format!("long name entry of {} bytes is too large", size)));
    }
    let mut data = Vec::with_capacity(size as usize);
    let n = r
        .take(size)
        .read_to_end(&mut data)
        .map_err(|e| Error::io("failed to read long name entry", e))?;
    if (n as u64) < size {
        return Err(Error::format("unexpected EOF in long name entry"));
    }
    skip(r, padding(size))?;
    Ok(data)
}

/// Writes the header block(s) for `entry`.
///
/// With `Options::GNU`, a link target longer than the `linkname` field is
/// written as a preceding `K` entry and a path longer than the `name` field
/// as a preceding `L` entry. Without it, long paths are split across the
/// ustar `prefix` and `name` fields and long link targets are an error.
pub(crate) fn write_header<W: Write>(w: &mut W, entry: &EntryHeader, options: Options) -> Result<()> {
    let mut block = Header::new();
    entry
        .fill_block(&mut block)
        .map_err(|e| Error::format(format!("cannot encode header: {}", e)))?;
    let gnu = options.contains(Options::GNU);

    let link = entry.link_name_bytes();
    let max = block.linkname.len();
    if link.len() > max {
        if !gnu {
            return Err(Error::format(format!(
                "link name of `{}` is too long without GNU extensions",
                String::from_utf8_lossy(entry.path_bytes())
            )));
        }
        write_extension(w, EntryType::GNULongLink, link)?;
        set_field(block.set_link_name_bytes(&link[..max]), entry)?;
    } else {
        set_field(block.set_link_name_bytes(link), entry)?;
    }

    let path = entry.path_bytes();
    let max = block.name.len();
    if path.len() > max && gnu {
        write_extension(w, EntryType::GNULongName, path)?;
        // Truncate the path to store in the header we're about to emit to
        // ensure we've got something at least mentioned.
        set_field(block.set_path_bytes(&path[..max]), entry)?;
    } else {
        set_field(block.set_path_bytes(path), entry)?;
    }

    block.set_cksum();
    w.write_all(block.as_bytes())
        .map_err(|e| Error::io("failed to write archive header", e))
}

fn set_field(res: io::Result<()>, entry: &EntryHeader) -> Result<()> {
    res.map_err(|e| {
        Error::format(format!(
            "cannot store `{}` in archive: {}",
            String::from_utf8_lossy(entry.path_bytes()),
            e
        ))
    })
}

fn write_extension<W: Write>(w: &mut W, kind: EntryType, name: &[u8]) -> Result<()> {
    let mut header = Header::new();
    header.name[..GNU_LONGLINK_NAME.len()].copy_from_slice(GNU_LONGLINK_NAME);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    // The name is stored with its trailing NUL.
    header.set_size((name.len() + 1) as u64);
    header.set_entry_type(kind);
    header.set_cksum();

    let mut data = name.to_vec();
    data.push(0);
    (|| {
        w.write_all(header.as_bytes())?;
        w.write_all(&data)?;
        pad(w, data.len() as u64)
    })()
    .map_err(|e| Error::io("failed to write long name entry", e))
}

/// Number of zero bytes following a payload of `len` bytes.
pub(crate) fn padding(len: u64) -> u64 {
    let rem = len % BLOCK_SIZE;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

/// Pads with zeros after a payload of `len` bytes.
pub(crate) fn pad<W: Write + ?Sized>(w: &mut W, len: u64) -> io::Result<()> {
    let buf = [0; BLOCK_SIZE as usize];
    w.write_all(&buf[..padding(len) as usize])
}

/// Discards exactly `amt` bytes of input.
pub(crate) fn skip<R: Read + ?Sized>(r: &mut R, mut amt: u64) -> Result<()> {
    let mut buf = [0u8; 4096 * 8];
    while amt > 0 {
        let n = cmp::min(amt, buf.len() as u64);
        let n = match r.read(&mut buf[..n as usize]) {
            Ok(0) => return Err(Error::format("unexpected EOF during skip")),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("failed to skip entry data", e)),
        };
        amt -= n as u64;
    }
    Ok(())
}

// Fills `buf` completely. `Ok(false)` means the stream ended before any byte
// was read; ending part way through is an error.
fn read_all<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => return Err(Error::format("failed to read entire block")),
            Ok(n) => read += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::io("failed to read archive header", e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> EntryHeader {
        let mut e = EntryHeader::new(path.as_bytes(), EntryType::file());
        e.set_mode(0o644);
        e
    }

    #[test]
    fn long_names_fold_into_next_entry() {
        let name = "x".repeat(300);
        let mut e = EntryHeader::new(name.as_bytes(), EntryType::symlink());
        e.set_link_name("y".repeat(200).as_bytes());
        let mut buf = Vec::new();
        write_header(&mut buf, &e, Options::GNU).unwrap();
        assert_eq!(buf.len() % 512, 0);

        let mut rdr = &buf[..];
        let back = read_header(&mut rdr, Options::empty()).unwrap().unwrap();
        assert_eq!(back.path_bytes(), name.as_bytes());
        assert_eq!(back.link_name_bytes(), "y".repeat(200).as_bytes());
        assert!(back.is_symlink());
        assert!(rdr.is_empty());
    }

    #[test]
    fn long_link_needs_gnu() {
        let mut e = entry("a");
        e.set_link_name("z".repeat(101).as_bytes());
        assert!(write_header(&mut Vec::new(), &e, Options::empty()).is_err());
    }

    #[test]
    fn zero_blocks_end_archive() {
        let mut buf = Vec::new();
        write_header(&mut buf, &entry("a"), Options::empty()).unwrap();
        buf.extend_from_slice(&[0; 1024]);
        write_header(&mut buf, &entry("b"), Options::empty()).unwrap();

        let mut rdr = &buf[..];
        assert!(read_header(&mut rdr, Options::empty()).unwrap().is_some());
        assert!(read_header(&mut rdr, Options::empty()).unwrap().is_none());

        let mut rdr = &buf[..];
        let opts = Options::IGNORE_EOT;
        assert!(read_header(&mut rdr, opts).unwrap().is_some());
        let b = read_header(&mut rdr, opts).unwrap().unwrap();
        assert_eq!(b.path_bytes(), b"b");
        assert!(read_header(&mut rdr, opts).unwrap().is_none());
    }

    #[test]
    fn truncated_block_is_an_error() {
        let mut buf = Vec::new();
        write_header(&mut buf, &entry("a"), Options::empty()).unwrap();
        let mut rdr = &buf[..100];
        assert!(read_header(&mut rdr, Options::empty()).is_err());
    }

    #[test]
    fn padding_math() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 511);
        assert_eq!(padding(512), 0);
        assert_eq!(padding(513), 511);
    }
}
