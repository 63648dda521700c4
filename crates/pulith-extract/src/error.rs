use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::format::ArchiveFormat;

/// Filesystem capability that failed, carried by [`Error::Fs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsOp {
    MkdirAll,
    OpenFile,
    Write,
    Chmod,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MkdirAll => "create directory",
            Self::OpenFile => "open file",
            Self::Write => "write file",
            Self::Chmod => "set permissions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a supported archive: {kind}")]
    UnsupportedFormat { kind: String },

    #[error("failed to read archive stream: {0}")]
    Read(#[source] io::Error),

    #[error("failed to decode {format} stream: {source}")]
    Decode {
        format: ArchiveFormat,
        #[source]
        source: io::Error,
    },

    #[error("malformed {format} archive: {source}")]
    MalformedContainer {
        format: ArchiveFormat,
        #[source]
        source: io::Error,
    },

    #[error("unsafe path join: '{root}' with '{candidate}'")]
    UnsafePath { root: PathBuf, candidate: String },

    #[error("failed to create link '{path}' -> '{target}': {source}")]
    LinkResolution {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("interrupted")]
    Interrupted,

    #[error("failed to {op} '{path}': {source}")]
    Fs {
        op: FsOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn fs(op: FsOp, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Fs { op, path, source }
    }

    /// Whether the extraction stopped because its [`CancelToken`](crate::CancelToken) fired.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
