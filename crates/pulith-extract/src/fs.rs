//! Filesystem capabilities used by the extractor.
//!
//! Every side effect of an extraction goes through [`Filesystem`], so callers can
//! redirect output ([`ChrootFs`]), record it, or fake it entirely in tests.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// How [`Filesystem::open_file`] opens its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFlags {
    pub create: bool,
    pub truncate: bool,
    pub write: bool,
}

impl OpenFlags {
    /// Create or truncate, write only.
    pub const OVERWRITE: Self = Self {
        create: true,
        truncate: true,
        write: true,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub is_dir: bool,
    /// Permission bits, `0o7777` at most.
    pub mode: u32,
}

pub trait Filesystem {
    type File: Write;

    /// Create `path` and any missing parents. An existing directory is not an error.
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<Self::File>;

    /// Create `link` as a hard link to `original`.
    fn link(&self, original: &Path, link: &Path) -> io::Result<()>;

    /// Create `link` as a symbolic link whose content is `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Remove a file, a link or an empty directory.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Metadata of `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
}

impl<F: Filesystem + ?Sized> Filesystem for &F {
    type File = F::File;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        (**self).mkdir_all(path, mode)
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<Self::File> {
        (**self).open_file(path, flags, mode)
    }

    fn link(&self, original: &Path, link: &Path) -> io::Result<()> {
        (**self).link(original, link)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        (**self).symlink(target, link)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        (**self).remove(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        (**self).stat(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        (**self).chmod(path, mode)
    }
}

/// The real filesystem.
///
/// On Windows modes collapse to the read-only attribute, set when the owner write
/// bit is absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFs;

impl Filesystem for OsFs {
    type File = fs::File;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode & 0o7777);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<fs::File> {
        let mut options = fs::OpenOptions::new();
        options
            .create(flags.create)
            .truncate(flags.truncate)
            .write(flags.write);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode & 0o7777);
        }
        let file = options.open(path)?;
        #[cfg(windows)]
        if mode & 0o200 == 0 {
            set_readonly(path, true)?;
        }
        #[cfg(not(any(unix, windows)))]
        let _ = mode;
        Ok(file)
    }

    fn link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }

        #[cfg(windows)]
        {
            let resolved = match link.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target.to_path_buf(),
            };
            if resolved.is_dir() {
                std::os::windows::fs::symlink_dir(target, link)
            } else {
                std::os::windows::fs::symlink_file(target, link)
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (target, link);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinks are not supported on this platform",
            ))
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let metadata = fs::metadata(path)?;
        Ok(FileInfo {
            is_dir: metadata.is_dir(),
            mode: mode_of(&metadata),
        })
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        }

        #[cfg(windows)]
        {
            set_readonly(path, mode & 0o200 == 0)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (path, mode);
            Ok(())
        }
    }
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, true) => 0o555,
        (true, false) => 0o777,
        (false, true) => 0o444,
        (false, false) => 0o666,
    }
}

#[cfg(windows)]
fn set_readonly(path: &Path, readonly: bool) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(readonly);
    fs::set_permissions(path, permissions)
}

/// Confines another [`Filesystem`] below `base`.
///
/// Every path, absolute or relative, is reinterpreted relative to `base`, so an
/// archive extracted to `/` lands inside it. Absolute symlink targets are re-rooted
/// the same way; relative targets are kept as written.
#[derive(Clone, Debug)]
pub struct ChrootFs<F> {
    base: PathBuf,
    inner: F,
}

impl<F: Filesystem> ChrootFs<F> {
    pub fn new(base: impl Into<PathBuf>, inner: F) -> Self {
        Self {
            base: base.into(),
            inner,
        }
    }

    /// Location of `path` on the wrapped filesystem.
    ///
    /// `..` collapses lexically and stops at `base`, like `..` at the root of an
    /// absolute path.
    pub fn map(&self, path: &Path) -> PathBuf {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => {
                    parts.pop();
                }
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            }
        }
        let mut mapped = self.base.clone();
        mapped.extend(parts);
        mapped
    }
}

impl ChrootFs<OsFs> {
    pub fn os(base: impl Into<PathBuf>) -> Self {
        Self::new(base, OsFs)
    }
}

impl<F: Filesystem> Filesystem for ChrootFs<F> {
    type File = F::File;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.inner.mkdir_all(&self.map(path), mode)
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<Self::File> {
        self.inner.open_file(&self.map(path), flags, mode)
    }

    fn link(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.inner.link(&self.map(original), &self.map(link))
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let target = if target.has_root() {
            self.map(target)
        } else {
            target.to_path_buf()
        };
        self.inner.symlink(&target, &self.map(link))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(&self.map(path))
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        self.inner.stat(&self.map(path))
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.inner.chmod(&self.map(path), mode)
    }
}
