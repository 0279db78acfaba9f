use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Mode;

/// Result type returned by every archive operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while opening, reading, writing or extracting an archive.
///
/// Where the failure happened at the operating system boundary the
/// underlying `io::Error` is preserved as the error's source.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend for an archive could not be created or opened.
    #[error("failed to open archive `{}`", path.display())]
    Open {
        /// Path of the archive that was being opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A header failed checksum, magic or version validation, or the archive
    /// structure is otherwise malformed.
    #[error("invalid tar archive: {0}")]
    Format(String),

    /// A read, write or stat failed.
    #[error("{desc}")]
    Io {
        /// What was being attempted.
        desc: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The operation observed a cancellation request.
    #[error("operation interrupted")]
    Interrupted,

    /// A tree walk was pointed at something that is not a directory.
    #[error("`{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// `NO_OVERWRITE` is active and the extraction target already exists.
    #[error("refusing to overwrite existing `{}`", .0.display())]
    OverwriteRefused(PathBuf),

    /// The archive handle has already been closed.
    #[error("archive is closed")]
    Closed,

    /// An entry accessor was called while no entry is current.
    #[error("no current entry")]
    NoCurrentEntry,

    /// The data of the current entry has already been read or skipped.
    #[error("data of the current entry has already been consumed")]
    PayloadConsumed,

    /// The operation requires the archive to be opened in the other mode.
    #[error("archive is not opened for {0}")]
    WrongMode(Mode),
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Open`].
    OpenFailure,
    /// See [`Error::Format`].
    Format,
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Interrupted`].
    Interrupted,
    /// See [`Error::NotADirectory`].
    NotADirectory,
    /// See [`Error::OverwriteRefused`].
    OverwriteRefused,
    /// The handle was misused, for example used after being closed.
    Usage,
}

impl Error {
    pub(crate) fn io(desc: impl Into<String>, source: io::Error) -> Error {
        Error::Io {
            desc: desc.into(),
            source,
        }
    }

    pub(crate) fn io_at(what: &str, path: &Path, source: io::Error) -> Error {
        Error::io(format!("failed to {} `{}`", what, path.display()), source)
    }

    pub(crate) fn format(msg: impl Into<String>) -> Error {
        Error::Format(msg.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Open { .. } => ErrorKind::OpenFailure,
            Error::Format(_) => ErrorKind::Format,
            Error::Io { .. } => ErrorKind::Io,
            Error::Interrupted => ErrorKind::Interrupted,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::OverwriteRefused(_) => ErrorKind::OverwriteRefused,
            Error::Closed
            | Error::NoCurrentEntry
            | Error::PayloadConsumed
            | Error::WrongMode(_) => ErrorKind::Usage,
        }
    }

    /// Returns whether this error was caused by a cancellation request.
    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }
}

impl From<Error> for io::Error {
    fn from(t: Error) -> io::Error {
        let kind = match t {
            Error::Open { ref source, .. } | Error::Io { ref source, .. } => source.kind(),
            Error::Format(_) => io::ErrorKind::InvalidData,
            Error::Interrupted => io::ErrorKind::Interrupted,
            Error::OverwriteRefused(_) => io::ErrorKind::AlreadyExists,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, t)
    }
}
