//! Format dispatch and the entry pass shared by the tar and zip readers.
//!
//! Regular files and directories are written as soon as they are read. Links are
//! queued and only created by [`LinkResolver`] once the whole archive has been
//! consumed. Entries whose name would land outside the destination are skipped,
//! not reported as errors.

use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::cancel::{CancelToken, CopyError, copy_cancelable};
use crate::entry::{ArchiveEntry, EntryKind, PendingLink};
use crate::error::{Error, FsOp, Result};
use crate::format::{self, ArchiveFormat, Compression};
use crate::fs::{Filesystem, OpenFlags, OsFs};
use crate::links::LinkResolver;
use crate::options::ExtractOptions;
use crate::sanitize::safe_join;

mod tar;
mod zip;

/// Mode of the file written when a compressed stream does not hold a tar archive.
pub const SINGLE_FILE_MODE: u32 = 0o666;

/// Runs extractions against a [`Filesystem`].
///
/// The filesystem is only borrowed for the duration of each call; nothing is kept
/// between calls.
#[derive(Clone, Debug, Default)]
pub struct Extractor<F = OsFs> {
    fs: F,
}

impl Extractor<OsFs> {
    pub fn os() -> Self {
        Self { fs: OsFs }
    }
}

impl<F: Filesystem> Extractor<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Extract `reader` into `dest`, detecting the format when `format` is `None`.
    pub fn extract<R: Read>(
        &self,
        format: Option<ArchiveFormat>,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        match format {
            None => self.archive(reader, dest, options),
            Some(format) => self.dispatch(format, reader, dest.as_ref(), options),
        }
    }

    /// Like [`extract`](Self::extract), reading zip archives in place instead of buffering them.
    pub fn extract_seekable<R: Read + Seek>(
        &self,
        format: Option<ArchiveFormat>,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        match format {
            None => self.archive_seekable(reader, dest, options),
            Some(ArchiveFormat::Zip) => self.zip_seekable(reader, dest, options),
            Some(format) => self.dispatch(format, reader, dest.as_ref(), options),
        }
    }

    /// Detect the format of a forward-only stream and extract it.
    pub fn archive<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        let sniffed = format::sniff(reader).map_err(Error::Read)?;
        debug!(kind = sniffed.kind(), "detected archive format");
        match sniffed.format {
            Some(format) => self.dispatch(format, sniffed.reader, dest.as_ref(), options),
            None => Err(sniffed.unsupported()),
        }
    }

    /// Detect the format of a seekable stream and extract it.
    pub fn archive_seekable<R: Read + Seek>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        let sniffed = format::sniff_seekable(reader).map_err(Error::Read)?;
        debug!(kind = sniffed.kind(), "detected archive format");
        match sniffed.format {
            Some(ArchiveFormat::Zip) => self.zip_seekable(sniffed.reader, dest, options),
            Some(format) => self.dispatch(format, sniffed.reader, dest.as_ref(), options),
            None => Err(sniffed.unsupported()),
        }
    }

    pub fn tar<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        let mut session = Session::new(&self.fs, dest.as_ref(), options, ArchiveFormat::Tar);
        tar::unpack(&mut session, reader)?;
        session.finish()
    }

    /// Extract a zip archive from a forward-only stream.
    ///
    /// Zip needs random access to its central directory, so the whole stream is
    /// read into memory first.
    pub fn zip<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        warn!("zip stream is not seekable, buffering it in memory");
        let mut buffer = Vec::new();
        copy_cancelable(reader, &mut buffer, &options.cancel).map_err(|e| match e {
            CopyError::Interrupted => Error::Interrupted,
            CopyError::Read(source) | CopyError::Write(source) => Error::Read(source),
        })?;
        self.zip_seekable(Cursor::new(buffer), dest, options)
    }

    pub fn zip_seekable<R: Read + Seek>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        let mut session = Session::new(&self.fs, dest.as_ref(), options, ArchiveFormat::Zip);
        zip::unpack(&mut session, reader)?;
        session.finish()
    }

    /// Decompress a gzip stream holding either a tar archive or a single file.
    pub fn gz<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        self.decompress(Compression::Gzip, reader, dest.as_ref(), options)
    }

    pub fn bz2<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        self.decompress(Compression::Bzip2, reader, dest.as_ref(), options)
    }

    pub fn xz<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        self.decompress(Compression::Xz, reader, dest.as_ref(), options)
    }

    pub fn zstd<R: Read>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<()> {
        self.decompress(Compression::Zstd, reader, dest.as_ref(), options)
    }

    fn dispatch<R: Read>(
        &self,
        format: ArchiveFormat,
        reader: R,
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<()> {
        match format {
            ArchiveFormat::Tar => self.tar(reader, dest, options),
            ArchiveFormat::Zip => self.zip(reader, dest, options),
            ArchiveFormat::Compressed(codec) => self.decompress(codec, reader, dest, options),
        }
    }

    /// A decompressed tar is extracted below `dest`; anything else is written to `dest` itself.
    fn decompress<R: Read>(
        &self,
        codec: Compression,
        reader: R,
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<()> {
        let format = ArchiveFormat::Compressed(codec);
        let decoder = codec.decoder(reader)?;
        let inner = format::sniff(decoder).map_err(|source| Error::Decode { format, source })?;
        debug!(%format, inner = inner.kind(), "decompressed stream");

        if inner.format == Some(ArchiveFormat::Tar) {
            return self.tar(inner.reader, dest, options);
        }

        check_cancel(&options.cancel)?;
        let written = write_file(
            &self.fs,
            dest,
            SINGLE_FILE_MODE,
            inner.reader,
            &options.cancel,
            |source| Error::Decode { format, source },
        )?;
        options.report(written, dest.to_path_buf());
        Ok(())
    }
}

/// State of a single tar or zip extraction.
pub(crate) struct Session<'a, F: ?Sized> {
    fs: &'a F,
    root: &'a Path,
    options: &'a ExtractOptions,
    format: ArchiveFormat,
    links: LinkResolver,
    bytes_written: u64,
}

impl<'a, F: Filesystem + ?Sized> Session<'a, F> {
    fn new(fs: &'a F, root: &'a Path, options: &'a ExtractOptions, format: ArchiveFormat) -> Self {
        Self {
            fs,
            root,
            options,
            format,
            links: LinkResolver::new(),
            bytes_written: 0,
        }
    }

    pub(crate) fn check_cancel(&self) -> Result<()> {
        check_cancel(&self.options.cancel)
    }

    pub(crate) fn malformed(&self, source: io::Error) -> Error {
        Error::MalformedContainer {
            format: self.format,
            source,
        }
    }

    /// Resolve where `raw_name` goes, or `None` when the entry must be skipped.
    pub(crate) fn prepare(
        &self,
        raw_name: &str,
        kind: EntryKind,
        mode: u32,
    ) -> Option<ArchiveEntry> {
        let path = self.resolve(raw_name)?;
        Some(ArchiveEntry {
            raw_name: raw_name.to_string(),
            path,
            mode: mode & 0o7777,
            kind,
        })
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let Some(renamed) = self.options.rename(name) else {
            debug!(name, "skipping entry renamed to nothing");
            return None;
        };
        match safe_join(self.root, &renamed) {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(name, %err, "skipping entry outside destination");
                None
            }
        }
    }

    /// Write a directory or file now, or queue a link for [`finish`](Self::finish).
    pub(crate) fn materialize<R: Read>(&mut self, entry: ArchiveEntry, content: R) -> Result<()> {
        trace!(?entry, "extracting entry");
        match entry.kind {
            EntryKind::Directory => self.directory(&entry.path, entry.mode),
            EntryKind::File => {
                let format = self.format;
                let written = write_file(
                    self.fs,
                    &entry.path,
                    entry.mode,
                    content,
                    &self.options.cancel,
                    |source| Error::MalformedContainer { format, source },
                )?;
                self.bytes_written += written;
                self.options.report(self.bytes_written, entry.path);
                Ok(())
            }
            EntryKind::HardLink { target } => {
                if let Some(target) = self.resolve(&target) {
                    self.links.push(PendingLink::hard(entry.path, target));
                }
                Ok(())
            }
            EntryKind::Symlink { target } => {
                self.links.push(PendingLink::symbolic(entry.path, target));
                Ok(())
            }
        }
    }

    fn directory(&self, path: &Path, mode: u32) -> Result<()> {
        let mode = mode | 0o100;
        if self.fs.stat(path).is_ok() {
            self.fs.chmod(path, mode).map_err(Error::fs(FsOp::Chmod, path))
        } else {
            self.fs.mkdir_all(path, mode).map_err(Error::fs(FsOp::MkdirAll, path))
        }
    }

    /// Create the queued links once every entry has been written.
    fn finish(self) -> Result<()> {
        if !self.links.is_empty() {
            debug!(count = self.links.len(), "resolving deferred links");
        }
        self.links.resolve(self.fs, &self.options.cancel)
    }
}

fn check_cancel(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// Replace `path` with the content of `reader`, creating missing parents.
fn write_file<F, R>(
    fs: &F,
    path: &Path,
    mode: u32,
    reader: R,
    cancel: &CancelToken,
    read_error: impl FnOnce(io::Error) -> Error,
) -> Result<u64>
where
    F: Filesystem + ?Sized,
    R: Read,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.mkdir_all(parent, mode | 0o100)
            .map_err(Error::fs(FsOp::MkdirAll, parent))?;
    }
    let _ = fs.remove(path);
    let mut file = fs
        .open_file(path, OpenFlags::OVERWRITE, mode)
        .map_err(Error::fs(FsOp::OpenFile, path))?;

    copy_cancelable(reader, &mut file, cancel).map_err(|e| match e {
        CopyError::Interrupted => Error::Interrupted,
        CopyError::Read(source) => read_error(source),
        CopyError::Write(source) => Error::fs(FsOp::Write, path)(source),
    })
}
