use std::path::PathBuf;

/// An archive member after renaming and path validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name as stored in the archive.
    pub raw_name: String,
    /// Output location, inside the extraction root.
    pub path: PathBuf,
    /// Permission bits, masked to `0o7777`.
    pub mode: u32,
    pub kind: EntryKind,
}

/// Link targets are carried exactly as stored and validated, if at all, later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    HardLink { target: String },
    Symlink { target: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Hard,
    Symbolic,
}

/// A link whose creation is deferred until every file and directory exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingLink {
    pub path: PathBuf,
    /// Hard links: a validated path inside the root. Symlinks: the raw link text.
    pub target: PathBuf,
    pub kind: LinkKind,
}

impl PendingLink {
    pub fn hard(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            kind: LinkKind::Hard,
        }
    }

    pub fn symbolic(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            kind: LinkKind::Symbolic,
        }
    }
}
