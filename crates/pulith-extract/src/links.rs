//! Deferred creation of hard links and symlinks.
//!
//! Links are only created once every regular file and directory of the archive is
//! on disk. Before any symlink is made, each symlink path is first claimed by an
//! empty placeholder file. A later entry that tries to reach through an earlier
//! symlink (`aaa -> /elsewhere`, then `aaa/sym`) then hits a regular file instead
//! of a directory and fails, so no link is ever created outside the root.

use tracing::trace;

use crate::cancel::CancelToken;
use crate::entry::{LinkKind, PendingLink};
use crate::error::{Error, Result};
use crate::fs::{Filesystem, OpenFlags};

const PLACEHOLDER_MODE: u32 = 0o666;

#[derive(Debug, Default)]
pub struct LinkResolver {
    hard: Vec<PendingLink>,
    symbolic: Vec<PendingLink>,
}

impl LinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, link: PendingLink) {
        trace!(
            path = %link.path.display(),
            target = %link.target.display(),
            kind = ?link.kind,
            "queued link"
        );
        match link.kind {
            LinkKind::Hard => self.hard.push(link),
            LinkKind::Symbolic => self.symbolic.push(link),
        }
    }

    pub fn len(&self) -> usize {
        self.hard.len() + self.symbolic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create every queued link: hard links first, then symlink placeholders, then symlinks.
    ///
    /// Any failure aborts the whole pass; links already created are left in place.
    pub fn resolve<F: Filesystem + ?Sized>(self, fs: &F, cancel: &CancelToken) -> Result<()> {
        for link in &self.hard {
            check(cancel)?;
            let _ = fs.remove(&link.path);
            fs.link(&link.target, &link.path)
                .map_err(|source| link_error(link, source))?;
        }

        for link in &self.symbolic {
            check(cancel)?;
            let _ = fs.remove(&link.path);
            fs.open_file(&link.path, OpenFlags::OVERWRITE, PLACEHOLDER_MODE)
                .map_err(|source| link_error(link, source))?;
        }

        for link in &self.symbolic {
            check(cancel)?;
            let _ = fs.remove(&link.path);
            fs.symlink(&link.target, &link.path)
                .map_err(|source| link_error(link, source))?;
            trace!(path = %link.path.display(), target = %link.target.display(), "created symlink");
        }

        Ok(())
    }
}

fn check(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

fn link_error(link: &PendingLink, source: std::io::Error) -> Error {
    Error::LinkResolution {
        path: link.path.clone(),
        target: link.target.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileInfo, OsFs};
    use std::cell::RefCell;
    use std::io;
    use std::path::Path;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl Filesystem for Recorder {
        type File = io::Sink;

        fn mkdir_all(&self, path: &Path, _: u32) -> io::Result<()> {
            self.record(format!("mkdir {}", path.display()));
            Ok(())
        }

        fn open_file(&self, path: &Path, _: OpenFlags, mode: u32) -> io::Result<io::Sink> {
            self.record(format!("open {} {mode:o}", path.display()));
            Ok(io::sink())
        }

        fn link(&self, original: &Path, link: &Path) -> io::Result<()> {
            self.record(format!("link {} {}", original.display(), link.display()));
            Ok(())
        }

        fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
            self.record(format!("symlink {} {}", target.display(), link.display()));
            Ok(())
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.record(format!("remove {}", path.display()));
            Err(io::Error::from(io::ErrorKind::NotFound))
        }

        fn stat(&self, _: &Path) -> io::Result<FileInfo> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }

        fn chmod(&self, _: &Path, _: u32) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolves_in_phases() {
        let mut resolver = LinkResolver::new();
        resolver.push(PendingLink::symbolic("/out/s1", "a"));
        resolver.push(PendingLink::hard("/out/h", "/out/a"));
        resolver.push(PendingLink::symbolic("/out/s2", "../b"));
        assert_eq!(resolver.len(), 3);

        let fs = Recorder::default();
        resolver.resolve(&fs, &CancelToken::new()).unwrap();

        assert_eq!(
            fs.calls.into_inner(),
            [
                "remove /out/h",
                "link /out/a /out/h",
                "remove /out/s1",
                "open /out/s1 666",
                "remove /out/s2",
                "open /out/s2 666",
                "remove /out/s1",
                "symlink a /out/s1",
                "remove /out/s2",
                "symlink ../b /out/s2",
            ]
        );
    }

    #[test]
    fn cancellation_stops_before_any_link() {
        let mut resolver = LinkResolver::new();
        resolver.push(PendingLink::hard("/out/h", "/out/a"));
        let token = CancelToken::new();
        token.cancel();

        let fs = Recorder::default();
        let result = resolver.resolve(&fs, &token);
        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(fs.calls.into_inner().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn placeholder_blocks_links_through_earlier_symlink() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();

        let mut resolver = LinkResolver::new();
        resolver.push(PendingLink::symbolic(root.path().join("aaa"), outside.path()));
        resolver.push(PendingLink::symbolic(root.path().join("aaa/sym"), "something"));

        let err = resolver.resolve(&OsFs, &CancelToken::new()).unwrap_err();
        match err {
            Error::LinkResolution { path, .. } => assert_eq!(path, root.path().join("aaa/sym")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!outside.path().join("sym").exists());
        assert!(std::fs::symlink_metadata(root.path().join("aaa")).unwrap().is_file());
    }

    #[cfg(unix)]
    #[test]
    fn creates_real_links() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a"), b"content").unwrap();

        let mut resolver = LinkResolver::new();
        resolver.push(PendingLink::hard(root.path().join("b"), root.path().join("a")));
        resolver.push(PendingLink::symbolic(root.path().join("c"), "a"));
        resolver.resolve(&OsFs, &CancelToken::new()).unwrap();

        assert_eq!(std::fs::read(root.path().join("b")).unwrap(), b"content");
        assert_eq!(std::fs::read_link(root.path().join("c")).unwrap(), Path::new("a"));
    }
}
