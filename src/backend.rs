use std::fmt;
use std::fs::{self, File};
use std::io::prelude::*;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};
use crate::other;

/// Direction an archive is opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Iterate over and extract entries of an existing archive.
    Read,
    /// Create a new archive, truncating any existing file.
    Write,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Mode::Read => f.write_str("reading"),
            Mode::Write => f.write_str("writing"),
        }
    }
}

/// Storage format of the byte stream an archive lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Compression {
    /// A plain, uncompressed file.
    #[default]
    None,
    /// A gzip compressed file.
    Gzip,
    /// A bzip2 compressed file.
    Bzip2,
}

impl Compression {
    /// Guesses the compression of an archive from its file name.
    ///
    /// `.tar.gz`/`.tgz` map to gzip, `.tar.bz2`/`.tbz2`/`.tbz` map to bzip2,
    /// everything else is treated as a plain archive.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Compression {
        let name = match path.as_ref().file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_ascii_lowercase(),
            None => return Compression::None,
        };
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Compression::Gzip
        } else if name.ends_with(".bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

enum Stream {
    PlainReader(BufReader<File>),
    PlainWriter(BufWriter<File>),
    GzReader(MultiGzDecoder<BufReader<File>>),
    GzWriter(GzEncoder<BufWriter<File>>),
    BzReader(MultiBzDecoder<BufReader<File>>),
    BzWriter(BzEncoder<BufWriter<File>>),
}

/// The byte stream underneath an archive.
///
/// A backend is opened once for a single direction and bound to one archive
/// for its whole lifetime. Reading from a write backend or writing to a read
/// backend fails.
pub struct Backend {
    compression: Compression,
    stream: Stream,
}

impl Backend {
    /// Opens `path` for the given direction.
    ///
    /// In [`Mode::Write`] the file is created (or truncated) and its
    /// permission bits set to `perms`. `perms` is ignored in [`Mode::Read`].
    pub fn open(path: &Path, compression: Compression, mode: Mode, perms: u32) -> Result<Backend> {
        let wrap = |source| Error::Open {
            path: path.to_path_buf(),
            source,
        };
        let stream = match mode {
            Mode::Read => {
                let file = BufReader::new(File::open(path).map_err(wrap)?);
                match compression {
                    Compression::None => Stream::PlainReader(file),
                    // Parallel compressors and plain concatenation produce
                    // several members; all of them belong to the archive.
                    Compression::Gzip => Stream::GzReader(MultiGzDecoder::new(file)),
                    Compression::Bzip2 => Stream::BzReader(MultiBzDecoder::new(file)),
                }
            }
            Mode::Write => {
                let file = create(path, perms).map_err(wrap)?;
                let file = BufWriter::new(file);
                match compression {
                    Compression::None => Stream::PlainWriter(file),
                    Compression::Gzip => {
                        Stream::GzWriter(GzEncoder::new(file, flate2::Compression::default()))
                    }
                    Compression::Bzip2 => {
                        Stream::BzWriter(BzEncoder::new(file, bzip2::Compression::default()))
                    }
                }
            }
        };
        log::debug!(
            "opened {:?} backend for {} on `{}`",
            compression,
            mode,
            path.display()
        );
        Ok(Backend {
            compression: compression,
            stream: stream,
        })
    }

    /// Returns the compression this backend was opened with.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns the direction this backend was opened in.
    pub fn mode(&self) -> Mode {
        match self.stream {
            Stream::PlainReader(_) | Stream::GzReader(_) | Stream::BzReader(_) => Mode::Read,
            Stream::PlainWriter(_) | Stream::GzWriter(_) | Stream::BzWriter(_) => Mode::Write,
        }
    }

    /// Flushes any buffered and compressed data and releases the file.
    pub fn close(self) -> io::Result<()> {
        match self.stream {
            Stream::PlainReader(_) | Stream::GzReader(_) | Stream::BzReader(_) => Ok(()),
            Stream::PlainWriter(mut w) => w.flush(),
            Stream::GzWriter(w) => w.finish()?.flush(),
            Stream::BzWriter(w) => w.finish()?.flush(),
        }
    }
}

impl Read for Backend {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        match self.stream {
            Stream::PlainReader(ref mut r) => r.read(into),
            Stream::GzReader(ref mut r) => r.read(into),
            Stream::BzReader(ref mut r) => r.read(into),
            _ => Err(other("backend is not opened for reading")),
        }
    }
}

impl Write for Backend {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream {
            Stream::PlainWriter(ref mut w) => w.write(buf),
            Stream::GzWriter(ref mut w) => w.write(buf),
            Stream::BzWriter(ref mut w) => w.write(buf),
            _ => Err(other("backend is not opened for writing")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream {
            Stream::PlainWriter(ref mut w) => w.flush(),
            Stream::GzWriter(ref mut w) => w.flush(),
            Stream::BzWriter(ref mut w) => w.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn create(path: &Path, perms: u32) -> io::Result<File> {
    use std::os::unix::prelude::*;

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(perms)
        .open(path)?;
    // The requested bits apply as given, not filtered through the umask.
    file.set_permissions(fs::Permissions::from_mode(perms))?;
    Ok(file)
}

#[cfg(windows)]
fn create(path: &Path, perms: u32) -> io::Result<File> {
    let file = File::create(path)?;
    let mut perm = file.metadata()?.permissions();
    perm.set_readonly(perms & 0o200 != 0o200);
    file.set_permissions(perm)?;
    Ok(file)
}
